//! Progress event infrastructure.
//!
//! [`ProgressBus`] is the fire-and-forget publish hub for job lifecycle
//! notifications. Delivery is best-effort by design: a dropped or
//! reordered event is only ever a hint, and every consumer reconciles by
//! reading current state from the job store.

pub mod bus;

pub use bus::{ProgressBus, ProgressEvent};
