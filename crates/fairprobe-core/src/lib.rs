pub mod analysis;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod generator;
pub mod metrics_api;
pub mod model;
pub mod providers;
pub mod purge;
pub mod ratelimit;
pub mod redaction;
pub mod report;
pub mod storage;

pub use errors::AuditError;
