// crates/server-jobs/src/lib.rs
//! Job lifecycle core: the job registry and the admission gate.

pub mod gate;
pub mod store;
pub mod types;

pub use gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use store::{JobStore, StoreConfig, DEFAULT_JOB_TTL, DEFAULT_SWEEP_INTERVAL};
pub use types::{Job, JobId, JobResult, JobStatus, JobUpdate};
