//! Transform engine adapter.
//!
//! The engine performs the actual cryptographic image transform and runs
//! out of process. This crate defines the capability interface
//! ([`TransformEngine`]) the worker pool drives, and the one production
//! implementation ([`CliEngine`]) that shells out to the engine CLI with
//! a bounded timeout. Swapping in an in-process or RPC engine later means
//! implementing the trait, not touching the workers.

pub mod cli;
pub mod engine;

pub use cli::CliEngine;
pub use engine::{EngineError, TransformEngine, TransformOutcome, TransformRequest};
