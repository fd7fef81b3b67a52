use super::exit_codes;
use crate::cli::args::RedactArgs;
use fairprobe_core::purge::redact_file;
use fairprobe_core::redaction::{PatternKind, PiiGuard};

pub fn run(args: RedactArgs) -> anyhow::Result<i32> {
    let mut kinds = Vec::new();
    for k in &args.kinds {
        match PatternKind::parse(k.trim()) {
            Some(kind) => kinds.push(kind),
            None => {
                let known: Vec<&str> = PatternKind::ALL.iter().map(|k| k.as_str()).collect();
                eprintln!("unknown pattern kind '{}' (known: {})", k, known.join(", "));
                return Ok(exit_codes::CONFIG_ERROR);
            }
        }
    }
    if kinds.is_empty() {
        kinds = PatternKind::ALL.to_vec();
    }

    let out = redact_file(&PiiGuard::new(&kinds), &args.path, &kinds)?;
    if out.changed {
        eprintln!("Redacted {} matches in {}", out.findings, args.path.display());
    } else {
        eprintln!("Nothing to redact in {}", args.path.display());
    }
    Ok(exit_codes::OK)
}
