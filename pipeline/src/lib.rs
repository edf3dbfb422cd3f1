pub mod filter;
pub mod processor;
pub mod runner;
pub mod summary;
mod tests;

pub use filter::{scan_eligible, EligibilityCriteria, ScanOutcome};
pub use processor::{is_duplicate, PostOutcome, PostProcessor};
pub use runner::{run, run_with};
pub use summary::{FailureRecord, RunCounts, RunStatus, RunSummary};
