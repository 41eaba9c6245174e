//! Embedded ordered event store for the backlog buffer.
//!
//! Events live in a single SQLite table keyed by their textual [`EventId`],
//! which sorts lexicographically in creation-time order. The table is the
//! ordered map; everything else in this crate is access discipline around it:
//!
//! - [`create_pool`] builds the WAL-mode connection pool.
//! - [`Store`] wraps the pool with closure-scoped write and read
//!   transactions, a bidirectional [`Cursor`], and a coalescing change
//!   notification ([`Store::subscribe`]) that fires after any commit which
//!   inserted events.
//! - [`EventIdGenerator`] mints strictly increasing identifiers whose
//!   creation timestamp is recoverable, which is what makes time-based
//!   retention possible without a secondary index.

mod error;
mod id;
mod migrations;
mod pool;
mod store;

pub use error::StoreError;
pub use id::{EventId, EventIdGenerator, IdError, ParseEventIdError};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use store::{Cursor, ReadTx, Store, WriteTx};
