use super::{exit_codes, open_store};
use crate::cli::args::AnalyzeArgs;
use fairprobe_core::analysis::{BiasAnalyzer, Thresholds};
use fairprobe_core::config::AnalysisConfig;
use fairprobe_core::model::GroupLabel;
use fairprobe_core::report::{console, json, markdown, AuditReport};
use fairprobe_core::storage::Store;
use std::path::Path;

pub fn run(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let Some(run) = store.get_run(&args.run_id)? else {
        eprintln!("unknown run: {}", args.run_id);
        return Ok(exit_codes::CONFIG_ERROR);
    };

    let groups: Vec<GroupLabel> = serde_json::from_value(run.config_snapshot["groups"].clone())
        .map_err(|e| anyhow::anyhow!("run {} has no usable group list: {}", run.id, e))?;
    let analysis: AnalysisConfig =
        serde_json::from_value(run.config_snapshot["analysis"].clone()).unwrap_or_default();
    let mut thresholds = Thresholds::from(&analysis);
    if let Some(a) = args.alpha {
        thresholds.alpha = a;
    }
    if let Some(e) = args.min_effect_size {
        thresholds.min_effect_size = e;
    }

    let report = match analyze_run(&store, &run.id, &groups, thresholds) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("analysis failed: {}", e);
            return Ok(exit_codes::for_error(&e));
        }
    };
    emit(&report, args.out.as_deref(), &args.format)?;
    Ok(if report.bias_detected() {
        exit_codes::BIAS_DETECTED
    } else {
        exit_codes::OK
    })
}

/// Compares the run's latest metrics and appends the report to the store.
pub(crate) fn analyze_run(
    store: &Store,
    run_id: &str,
    groups: &[GroupLabel],
    thresholds: Thresholds,
) -> anyhow::Result<AuditReport> {
    let metrics = store.metrics_by_group(run_id)?;
    let responses = store.fetch_responses(run_id)?.len();
    let failures = store.fetch_failures(run_id)?.len();

    let outcomes = BiasAnalyzer::new(thresholds).compare(groups, &metrics)?;
    let report =
        AuditReport::new(run_id, groups.to_vec(), thresholds, outcomes).with_counts(responses, failures);
    store.insert_report(run_id, &report.to_value()?)?;
    Ok(report)
}

pub(crate) fn emit(report: &AuditReport, out: Option<&Path>, format: &str) -> anyhow::Result<()> {
    console::print_summary(report);
    if let Some(path) = out {
        match format {
            "md" | "markdown" => markdown::write_markdown(report, path)?,
            _ => json::write_json(report, path)?,
        }
        eprintln!("Report written to {}", path.display());
    }
    Ok(())
}
