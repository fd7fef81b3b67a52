use super::AuditReport;
use crate::model::{ComparisonOutcome, GroupComparison, SignificanceTest};
use std::path::Path;

pub fn render_markdown(report: &AuditReport) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Bias audit report: `{}`\n\n", report.run_id));
    md.push_str(&format!(
        "Generated {}. Reference group: `{}`. alpha = {}, minimum effect size = {}.\n\n",
        report.generated_at.to_rfc3339(),
        report.groups.first().map(String::as_str).unwrap_or("-"),
        report.thresholds.alpha,
        report.thresholds.min_effect_size,
    ));
    md.push_str(&format!(
        "{} responses analysed, {} probes without a response.\n\n",
        report.responses, report.failures
    ));

    md.push_str("| Metric | Groups | Means | Difference | Test | Statistic | p | Effect size | Bias |\n");
    md.push_str("|---|---|---|---|---|---|---|---|---|\n");
    for o in &report.outcomes {
        match o {
            ComparisonOutcome::Computed(c) => md.push_str(&row(c)),
            ComparisonOutcome::Insufficient {
                metric,
                group,
                count,
                required,
            } => md.push_str(&format!(
                "| {} | {} | - | - | - | - | - | - | insufficient sample ({} of {}) |\n",
                escape(metric),
                escape(group),
                count,
                required
            )),
        }
    }

    let flagged = report.flagged_metrics();
    md.push('\n');
    if flagged.is_empty() {
        md.push_str("No bias detected.\n");
    } else {
        md.push_str(&format!("**Bias detected** in: {}.\n", flagged.join(", ")));
    }
    md
}

pub fn write_markdown(report: &AuditReport, out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, render_markdown(report))?;
    Ok(())
}

fn row(c: &GroupComparison) -> String {
    let groups = c
        .groups
        .iter()
        .map(|g| format!("{} (n={})", escape(&g.group), g.count))
        .collect::<Vec<_>>()
        .join(" vs ");
    let means = c
        .groups
        .iter()
        .map(|g| fmt_opt(g.mean))
        .collect::<Vec<_>>()
        .join(" / ");
    let test = match c.test {
        SignificanceTest::WelchT => "Welch t",
        SignificanceTest::ChiSquare => "chi-square",
    };
    format!(
        "| {} | {} | {} | {} | {} | {:.3} | {:.4} | {:.3} | {} |\n",
        escape(&c.metric),
        groups,
        means,
        fmt_opt(c.difference),
        test,
        c.statistic,
        c.p_value,
        c.effect_size,
        if c.bias_detected { "yes" } else { "no" }
    )
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.3}", x)).unwrap_or_else(|| "-".into())
}

fn escape(s: &str) -> String {
    s.replace('|', "\\|")
}
