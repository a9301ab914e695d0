//! Background execution: the run worker and the daily snapshot job.

pub mod run_worker;
pub mod snapshot_job;

pub use run_worker::{CycleResult, RunWorker};
pub use snapshot_job::{run_daily_snapshot, SnapshotResult};
