pub mod runner;

pub use runner::{AuditRunner, DispatchPolicy, RetentionPolicy, RunSummary, RunTally};
