//! The worker pool.
//!
//! Workers pull job ids from the queue and drive each job through the
//! transform engine: claim (`Queued -> Processing`), invoke the engine
//! under a bounded timeout while publishing estimated progress, then
//! record the terminal state -- vaulting key material and setting output
//! locators before `Completed`, or freezing progress behind a descriptive
//! error on `Failed`.

pub mod pool;
pub mod processor;

pub use pool::{WorkerConfig, WorkerContext, WorkerPool};
pub use processor::process_job;
