use super::{analyze, exit_codes, open_store};
use crate::cli::args::RunArgs;
use fairprobe_core::analysis::Thresholds;
use fairprobe_core::config::load_config;
use fairprobe_core::engine::{AuditRunner, DispatchPolicy, RetentionPolicy};
use fairprobe_core::fingerprint::{config_fingerprint, config_snapshot};
use fairprobe_core::generator::ProbeGenerator;
use fairprobe_core::metrics_api::{ExtractionContext, MetricExtractor};
use fairprobe_core::model::{AuditRun, RunStatus};
use fairprobe_core::providers::{build_responder, Responder};
use fairprobe_core::ratelimit::RateLimiter;
use fairprobe_core::report::console;
use fairprobe_metrics::default_registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    // 1. config, backend and probes; nothing is stored if any of these fail
    let cfg = match load_config(&args.config, args.strict) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let workers = DispatchPolicy::from(&cfg.settings).workers;
    let responders = match (0..workers)
        .map(|_| build_responder(&cfg.backend))
        .collect::<Result<Vec<Arc<dyn Responder>>, _>>()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("backend error: {}", e);
            return Ok(exit_codes::for_audit_error(&e));
        }
    };
    let ctx = match ExtractionContext::from_config(&cfg.extraction) {
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

    // 2. dispatch
    let store = open_store(&args.db)?;
    let fingerprint = config_fingerprint(&cfg);
    let mut run = AuditRun::new(&cfg.name, config_snapshot(&cfg), &fingerprint.hex);
    let runner = AuditRunner::new(
        store.clone(),
        Arc::new(RateLimiter::from_config(&cfg.rate_limit)),
        DispatchPolicy::from(&cfg.settings),
    )
    .with_retention(RetentionPolicy::from_config(&cfg.retention))
    .with_extractor(Arc::new(MetricExtractor::new(default_registry(), ctx)));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(event = "fairprobe.run.interrupted", "stopping after in-flight calls");
            on_signal.cancel();
        }
    });

    eprintln!(
        "Run {} ({} pairs, backend {} {})",
        run.id,
        cfg.pairs,
        responders[0].provider_name(),
        responders[0].model()
    );
    let summary = match runner.run(&mut run, pairs, responders, &cancel).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("run {} failed: {}", run.id, e);
            return Ok(exit_codes::for_audit_error(&e));
        }
    };
    console::print_run_summary(&summary);
    println!("{}", run.id);

    if args.no_analyze {
        return Ok(exit_code(summary.status, false));
    }

    // 3. analysis
    let report = analyze::analyze_run(
        &store,
        &run.id,
        &cfg.groups,
        Thresholds::from(&cfg.analysis),
    )?;
    analyze::emit(&report, args.out.as_deref(), &args.format)?;
    if summary.status == RunStatus::Cancelled {
        eprintln!(
            "Run was cancelled: report covers {} of {} pairs",
            summary.tally.pairs_completed, summary.pairs
        );
    }
    Ok(exit_code(summary.status, report.bias_detected()))
}

/// Bias found in a partial run is still reported as bias.
fn exit_code(status: RunStatus, bias_detected: bool) -> i32 {
    match (status, bias_detected) {
        (_, true) => exit_codes::BIAS_DETECTED,
        (RunStatus::Cancelled, false) => exit_codes::PARTIAL,
        _ => exit_codes::OK,
    }
}
