use super::{exit_codes, open_store};
use crate::cli::args::RunsArgs;

pub fn run(args: RunsArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let runs = store.list_runs(args.limit)?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(exit_codes::OK);
    }

    if runs.is_empty() {
        eprintln!("No runs in {}", args.db.display());
        return Ok(exit_codes::OK);
    }
    for r in &runs {
        println!(
            "{:<44} {:<10} {}  {} pairs",
            r.id,
            r.status.as_str(),
            r.started_at.format("%Y-%m-%d %H:%M:%S"),
            r.pair_ids.len()
        );
        if let Some(err) = &r.error {
            println!("    error: {}", err);
        }
    }
    Ok(exit_codes::OK)
}
