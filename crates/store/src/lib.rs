//! Job store and key vault implementations.
//!
//! Two backends satisfy the contracts in `shield_core::{store, vault}`:
//!
//! - [`memory`] -- `tokio::sync::RwLock` over hash maps. Backs every
//!   hermetic test and the dev-mode server (no `DATABASE_URL`).
//! - [`postgres`] -- sqlx-backed, with transition atomicity enforced via
//!   `SELECT ... FOR UPDATE` transactions. Used whenever `DATABASE_URL`
//!   is configured; migrations live under `migrations/`.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryJobStore, MemoryKeyVault};
pub use postgres::{create_pool, run_migrations, DbPool, PgJobStore, PgKeyVault};
