use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DB: &str = ".fairprobe/fairprobe.db";

#[derive(Parser)]
#[command(
    name = "fairprobe",
    version,
    about = "Matched-pair bias audits for AI backends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample audit config
    Init(InitArgs),
    /// Print the matched pairs a config would send, without sending them
    Generate(GenerateArgs),
    /// Send every pair to the backend, store replies, then analyse
    Run(RunArgs),
    /// Recompute metrics for a stored run
    Extract(ExtractArgs),
    /// Compare groups for a stored run and write a report
    Analyze(AnalyzeArgs),
    /// List stored runs
    Runs(RunsArgs),
    /// Delete a run or expire old raw text
    Purge(PurgeArgs),
    /// Redact PII from a file in place
    Redact(RedactArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "fairprobe.yaml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long, default_value = "fairprobe.yaml")]
    pub config: PathBuf,

    /// JSONL output; stdout when absent
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Reject unknown config keys
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "fairprobe.yaml")]
    pub config: PathBuf,

    #[arg(long, env = "FAIRPROBE_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    #[arg(long)]
    pub strict: bool,

    /// Stop after dispatch; analyse later with `fairprobe analyze`
    #[arg(long)]
    pub no_analyze: bool,

    /// Report output path
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Report format: json | md
    #[arg(long, default_value = "json")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, env = "FAIRPROBE_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    #[arg(long)]
    pub run_id: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, env = "FAIRPROBE_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    #[arg(long)]
    pub run_id: String,

    /// Overrides the significance level stored with the run
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Overrides the minimum effect size stored with the run
    #[arg(long)]
    pub min_effect_size: Option<f64>,

    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Report format: json | md
    #[arg(long, default_value = "json")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsArgs {
    #[arg(long, env = "FAIRPROBE_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PurgeArgs {
    #[arg(long, env = "FAIRPROBE_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    /// Delete every record of this run
    #[arg(
        long,
        conflicts_with_all = ["expire", "expire_days"],
        required_unless_present_any = ["expire", "expire_days"]
    )]
    pub run_id: Option<String>,

    /// Null raw reply text older than each run's `retention.raw_text_days`
    #[arg(long, conflicts_with = "expire_days")]
    pub expire: bool,

    /// Null raw reply text older than this many days, in every run
    #[arg(long)]
    pub expire_days: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RedactArgs {
    pub path: PathBuf,

    /// Pattern kinds to redact (comma separated); all when absent
    #[arg(long, value_delimiter = ',')]
    pub kinds: Vec<String>,
}
