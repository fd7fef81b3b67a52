use super::{exit_codes, open_store};
use crate::cli::args::PurgeArgs;
use fairprobe_core::purge::Purger;

pub fn run(args: PurgeArgs) -> anyhow::Result<i32> {
    let purger = Purger::new(open_store(&args.db)?);

    if let Some(run_id) = &args.run_id {
        let counts = purger.purge_run(run_id)?;
        if counts.runs == 0 {
            eprintln!("No run {} in {}", run_id, args.db.display());
        } else {
            eprintln!(
                "Purged run {}: {} probes, {} responses, {} failures, {} metrics, {} reports",
                run_id,
                counts.probes,
                counts.responses,
                counts.failures,
                counts.metrics,
                counts.reports
            );
        }
    }
    if args.expire {
        let n = purger.expire_configured_raw_text()?;
        eprintln!("Cleared raw text of {} responses past their run's retention window", n);
    }
    if let Some(days) = args.expire_days {
        let n = purger.expire_raw_text(chrono::Duration::days(days as i64))?;
        eprintln!("Cleared raw text of {} responses older than {} days", n, days);
    }
    Ok(exit_codes::OK)
}
