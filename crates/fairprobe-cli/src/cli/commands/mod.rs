use crate::cli::args::{Cli, Command};
use fairprobe_core::storage::Store;
use std::path::Path;

pub mod analyze;
pub mod extract;
pub mod generate;
pub mod init;
pub mod purge;
pub mod redact;
pub mod run;
pub mod runs;

pub mod exit_codes {
    use fairprobe_core::errors::AuditError;

    pub const OK: i32 = 0;
    pub const BIAS_DETECTED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const RUN_FAILED: i32 = 3;
    /// Cancelled before every pair was dispatched; no bias in what was collected.
    pub const PARTIAL: i32 = 4;

    pub fn for_audit_error(e: &AuditError) -> i32 {
        match e {
            AuditError::Configuration(_)
            | AuditError::InvalidGroupSet { .. }
            | AuditError::SyntheticPiiDetected { .. } => CONFIG_ERROR,
            _ => RUN_FAILED,
        }
    }

    pub fn for_error(e: &anyhow::Error) -> i32 {
        e.downcast_ref::<AuditError>()
            .map(for_audit_error)
            .unwrap_or(RUN_FAILED)
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(a) => init::run(a),
        Command::Generate(a) => generate::run(a),
        Command::Run(a) => run::run(a).await,
        Command::Extract(a) => extract::run(a),
        Command::Analyze(a) => analyze::run(a),
        Command::Runs(a) => runs::run(a),
        Command::Purge(a) => purge::run(a),
        Command::Redact(a) => redact::run(a),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

pub(crate) fn open_store(db: &Path) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Store::open(db)?;
    store.init_schema()?;
    Ok(store)
}
