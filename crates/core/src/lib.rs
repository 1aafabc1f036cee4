//! Domain types and contracts for the image-shield job lifecycle service.
//!
//! This crate owns everything the other crates agree on:
//!
//! - [`job`] -- the [`Job`](job::Job) record, its kind-specific parameters,
//!   and the status state machine.
//! - [`store`] / [`vault`] -- the contracts a job store and key vault must
//!   satisfy, plus the pure transition-application logic both
//!   implementations share.
//! - [`keywrap`] -- AES-256-GCM wrapping of vault key material under a
//!   versioned master secret and per-record salt.
//! - [`queue`] -- the FIFO hand-off of pending job ids to workers.

pub mod error;
pub mod job;
pub mod keywrap;
pub mod queue;
pub mod store;
pub mod types;
pub mod vault;
