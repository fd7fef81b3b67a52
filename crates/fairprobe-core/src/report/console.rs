use super::AuditReport;
use crate::engine::RunSummary;
use crate::model::ComparisonOutcome;

pub fn print_run_summary(summary: &RunSummary) {
    let t = &summary.tally;
    eprintln!(
        "\nRun {} {}: {} pairs, {} probes",
        summary.run_id,
        summary.status.as_str(),
        summary.pairs,
        summary.probes
    );
    eprintln!(
        "  {} responses ({} empty), {} failed, {} deferrals, {:.1}s",
        t.responses,
        t.empty_responses,
        t.failures,
        t.deferrals,
        summary.duration_ms as f64 / 1000.0
    );
}

pub fn print_summary(report: &AuditReport) {
    let mut flagged = 0;
    let mut clean = 0;
    let mut insufficient = 0;

    eprintln!(
        "\nAnalysing {} comparisons for run {}...",
        report.outcomes.len(),
        report.run_id
    );

    for o in &report.outcomes {
        match o {
            ComparisonOutcome::Computed(c) => {
                let pair = c
                    .groups
                    .iter()
                    .map(|g| g.group.as_str())
                    .collect::<Vec<_>>()
                    .join(" vs ");
                let line = format!(
                    "{:<14} {:<24} p={:.4}  effect={:.3}",
                    c.metric, pair, c.p_value, c.effect_size
                );
                if c.bias_detected {
                    flagged += 1;
                    eprintln!("❌ {}  BIAS", line);
                    if let Some(d) = c.difference {
                        eprintln!("      → difference of means {:+.3}", d);
                    }
                } else {
                    clean += 1;
                    eprintln!("✅ {}", line);
                }
            }
            ComparisonOutcome::Insufficient {
                metric,
                group,
                count,
                required,
            } => {
                insufficient += 1;
                eprintln!(
                    "⏭️  {:<14} {:<24} insufficient sample ({} of {})",
                    metric, group, count, required
                );
            }
        }
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Summary: {} flagged, {} clean, {} insufficient (alpha {}, min effect {})",
        flagged,
        clean,
        insufficient,
        report.thresholds.alpha,
        report.thresholds.min_effect_size
    );
}
