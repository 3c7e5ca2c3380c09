//! Infrastructure layer of the stock ledger: persistence, workflows, read side.
//!
//! Every balance-changing workflow follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Validate against the catalog (products, locations, formulations)
//!   ↓
//! 2. Stage reads and writes in a UnitOfWork (versions observed at read time)
//!   ↓
//! 3. Commit the ChangeSet atomically (compare-and-swap on every touched row)
//!   ↓  conflict → retry the whole unit, up to `max_conflict_retries`
//! 4. Publish committed movements to the EventBus
//! ```

pub mod adjustment;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod production;
pub mod projections;
pub mod reconciliation;
pub mod store;
pub mod transfer;
pub mod unit_of_work;
pub mod workers;


pub use adjustment::AdminAdjustmentWorkflow;
pub use catalog::{CachedCatalog, Catalog, InMemoryCatalog};
pub use config::LedgerConfig;
pub use context::{LedgerContext, MovementEnvelope, publish_committed};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{FactoryIssue, StockLedger};
pub use production::{ProductionRequest, ProductionWorkflow};
pub use reconciliation::ReconciliationWorkflow;
pub use store::{
    ChangeSet, Committed, ConfiguredStore, InMemoryLedgerStore, LedgerStore, MovementQuery, PostgresLedgerStore,
    StoreError,
};
pub use transfer::TransferWorkflow;
pub use unit_of_work::{UnitOfWork, run_atomic};
