use super::exit_codes;
use crate::cli::args::GenerateArgs;
use fairprobe_core::config::load_config;
use fairprobe_core::generator::ProbeGenerator;
use std::io::Write;

pub fn run(args: GenerateArgs) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config, args.strict) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let pairs = match ProbeGenerator::new(cfg.template.clone(), cfg.seed).generate(cfg.pairs, &cfg.groups) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("generation failed: {}", e);
            return Ok(exit_codes::for_audit_error(&e));
        }
    };

    let mut lines = String::new();
    for pair in &pairs {
        lines.push_str(&serde_json::to_string(pair)?);
        lines.push('\n');
    }
    match &args.out {
        Some(path) => {
            std::fs::write(path, lines)?;
            eprintln!("Wrote {} pairs to {}", pairs.len(), path.display());
        }
        None => std::io::stdout().write_all(lines.as_bytes())?,
    }
    Ok(exit_codes::OK)
}
