//! Persistence boundary of the stock ledger.
//!
//! `LedgerStore` is the only way workflows touch storage. Implementations must make
//! one `ChangeSet` atomic and version-checked; the in-memory store is used for tests
//! and embedding, the Postgres store for deployments.
//! `ConfiguredStore` picks between them from `LedgerConfig`.

pub mod configured;
pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use configured::ConfiguredStore;
pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::MovementQuery;
pub use r#trait::{AggregateWrite, BalanceWrite, ChangeSet, Committed, LedgerStore, StoreError};
