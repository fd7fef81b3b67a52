use super::{exit_codes, open_store};
use crate::cli::args::ExtractArgs;
use fairprobe_core::config::ExtractionConfig;
use fairprobe_core::metrics_api::{ExtractionContext, MetricExtractor};
use fairprobe_metrics::default_registry;

pub fn run(args: ExtractArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let Some(run) = store.get_run(&args.run_id)? else {
        eprintln!("unknown run: {}", args.run_id);
        return Ok(exit_codes::CONFIG_ERROR);
    };

    let extraction: ExtractionConfig =
        serde_json::from_value(run.config_snapshot["extraction"].clone()).unwrap_or_default();
    let ctx = ExtractionContext::from_config(&extraction)?;
    let extractor = MetricExtractor::new(default_registry(), ctx);

    let responses = store.fetch_responses(&run.id)?;
    let (records, skipped) = extractor.extract_all(&responses);
    store.insert_metrics(&records)?;

    eprintln!(
        "Extracted {} metrics for {} responses ({} without stored text)",
        extractor.names().len(),
        records.len(),
        skipped.len()
    );
    Ok(exit_codes::OK)
}
