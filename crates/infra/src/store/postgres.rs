//! Postgres-backed ledger store.
//!
//! Balances, movements and adjustments are rows keyed for lookup; the full record of
//! each is kept as a JSONB document so the schema does not chase every domain field.
//! Transfers, counts and production orders are stored as versioned documents.
//!
//! ## Atomicity
//!
//! `commit()` runs in one SQL transaction. Every guarded row is locked with
//! `SELECT … FOR UPDATE` and its version compared before any write. A row that does
//! not exist yet cannot be locked; two transactions racing to create it collide on the
//! primary key, which maps to `StoreError::Concurrency`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (serialization failure) | `40001` | `Concurrency` |
//! | Database (deadlock detected) | `40P01` | `Concurrency` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / network / other | n/a | `Backend` |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, instrument};

use resinstock_core::{ExpectedVersion, InventoryCountId, LocationCode, ProductionOrderId, TransferId};
use resinstock_inventory::{
    BalanceKey, InventoryCount, LoggedMovement, Movement, ProductionOrder, StockAdjustment,
    StockBalance, Transfer, TransferStatus,
};

use super::query::MovementQuery;
use super::r#trait::{ChangeSet, Committed, LedgerStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_balances (
        product_id  UUID        NOT NULL,
        location    TEXT        NOT NULL,
        total_kg    NUMERIC     NOT NULL CHECK (total_kg >= 0),
        version     BIGINT      NOT NULL CHECK (version > 0),
        document    JSONB       NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (product_id, location)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        sequence_number BIGSERIAL   PRIMARY KEY,
        movement_id     UUID        NOT NULL UNIQUE,
        product_id      UUID        NOT NULL,
        location        TEXT        NOT NULL,
        movement_type   TEXT        NOT NULL,
        reference_kind  TEXT        NOT NULL,
        reference_id    UUID        NOT NULL,
        total_kg        NUMERIC     NOT NULL,
        document        JSONB       NOT NULL,
        occurred_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_adjustments (
        position      BIGSERIAL   PRIMARY KEY,
        adjustment_id UUID        NOT NULL UNIQUE,
        product_id    UUID        NOT NULL,
        location      TEXT        NOT NULL,
        document      JSONB       NOT NULL,
        occurred_at   TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transfers (
        transfer_id  UUID        PRIMARY KEY,
        status       TEXT        NOT NULL,
        version      BIGINT      NOT NULL,
        requested_at TIMESTAMPTZ NOT NULL,
        document     JSONB       NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_counts (
        count_id UUID   PRIMARY KEY,
        version  BIGINT NOT NULL,
        document JSONB  NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS production_orders (
        order_id UUID  PRIMARY KEY,
        document JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS stock_movements_key_idx ON stock_movements (product_id, location)",
    "CREATE INDEX IF NOT EXISTS stock_movements_reference_idx ON stock_movements (reference_kind, reference_id)",
];

/// Postgres-backed `LedgerStore`.
///
/// The `LedgerStore` trait is synchronous; calls are bridged onto the current tokio
/// runtime, which must be multi-threaded. Any other context yields `StoreError::Backend`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create missing tables and indexes.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Backend("PostgresLedgerStore called outside a tokio runtime".to_string())
        })?;
        // block_in_place panics on a current-thread runtime.
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(StoreError::Backend(format!(
                "PostgresLedgerStore requires a multi-threaded tokio runtime, found {:?}",
                handle.runtime_flavor()
            )));
        }
        tokio::task::block_in_place(|| handle.block_on(fut))
    }

    #[instrument(skip(self), err)]
    pub async fn read_balance_async(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError> {
        let row = sqlx::query(
            "SELECT document FROM stock_balances WHERE product_id = $1 AND location = $2",
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_balance", e))?;

        row.map(|r| decode_column(&r, "document")).transpose()
    }

    pub async fn balances_async(
        &self,
        location: Option<&LocationCode>,
    ) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM stock_balances
            WHERE ($1::text IS NULL OR location = $1)
            ORDER BY location, product_id
            "#,
        )
        .bind(location.map(|l| l.as_str().to_string()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("balances", e))?;

        rows.iter().map(|r| decode_column(r, "document")).collect()
    }

    /// Apply a change set in one transaction.
    #[instrument(
        skip(self, changes),
        fields(
            balances = changes.balances.len(),
            movements = changes.movements.len(),
        ),
        err
    )]
    pub async fn commit_async(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed = Committed::default();

        // Guards and writes are interleaved per row, but every row is locked first and
        // any failure rolls the transaction back, so nothing partial is ever visible.
        for write in changes.balances {
            let current = lock_version(
                &mut tx,
                "SELECT version FROM stock_balances WHERE product_id = $1 AND location = $2 FOR UPDATE",
                write.key.product_id.as_uuid(),
                Some(write.key.location.as_str()),
            )
            .await?;
            ensure_version(&format!("balance {}", write.key), write.expected_version, current)?;

            let balance = StockBalance {
                key: write.key,
                level: write.level,
                version: current + 1,
                updated_by: Some(write.updated_by),
                updated_at: Some(write.updated_at),
            };
            upsert_balance(&mut tx, &balance, current).await?;
            committed.balances.push(balance);
        }

        for movement in changes.movements {
            let sequence_number = insert_movement(&mut tx, &movement).await?;
            committed.movements.push(LoggedMovement {
                sequence_number,
                movement,
            });
        }

        for adjustment in &changes.adjustments {
            sqlx::query(
                r#"
                INSERT INTO stock_adjustments (adjustment_id, product_id, location, document, occurred_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(adjustment.id.as_uuid())
            .bind(adjustment.product_id.as_uuid())
            .bind(adjustment.location.as_str())
            .bind(encode(adjustment)?)
            .bind(adjustment.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_adjustment", e))?;
        }

        for write in changes.transfers {
            let mut transfer = write.aggregate;
            let current = lock_version(
                &mut tx,
                "SELECT version FROM transfers WHERE transfer_id = $1 FOR UPDATE",
                transfer.id.as_uuid(),
                None,
            )
            .await?;
            ensure_version(&format!("transfer {}", transfer.id), write.expected_version, current)?;
            transfer.version = current + 1;

            sqlx::query(
                r#"
                INSERT INTO transfers (transfer_id, status, version, requested_at, document)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (transfer_id) DO UPDATE
                SET status = EXCLUDED.status, version = EXCLUDED.version, document = EXCLUDED.document
                "#,
            )
            .bind(transfer.id.as_uuid())
            .bind(status_name(transfer.status))
            .bind(transfer.version as i64)
            .bind(transfer.requested_at)
            .bind(encode(&transfer)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_transfer", e))?;
            committed.transfers.push(transfer);
        }

        for write in changes.counts {
            let mut count = write.aggregate;
            let current = lock_version(
                &mut tx,
                "SELECT version FROM inventory_counts WHERE count_id = $1 FOR UPDATE",
                count.id.as_uuid(),
                None,
            )
            .await?;
            ensure_version(&format!("inventory count {}", count.id), write.expected_version, current)?;
            count.version = current + 1;

            sqlx::query(
                r#"
                INSERT INTO inventory_counts (count_id, version, document)
                VALUES ($1, $2, $3)
                ON CONFLICT (count_id) DO UPDATE
                SET version = EXCLUDED.version, document = EXCLUDED.document
                "#,
            )
            .bind(count.id.as_uuid())
            .bind(count.version as i64)
            .bind(encode(&count)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_count", e))?;
            committed.counts.push(count);
        }

        for order in &changes.production_orders {
            sqlx::query("INSERT INTO production_orders (order_id, document) VALUES ($1, $2)")
                .bind(order.id.as_uuid())
                .bind(encode(order)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_production_order", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(
            balances = committed.balances.len(),
            movements = committed.movements.len(),
            "ledger change set committed"
        );
        Ok(committed)
    }

    async fn load_document<T: DeserializeOwned>(
        &self,
        sql: &str,
        id: &uuid::Uuid,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_document", e))?;
        row.map(|r| decode_column(&r, "document")).transpose()
    }

    pub async fn list_transfers_async(
        &self,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM transfers
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY requested_at, transfer_id
            "#,
        )
        .bind(status.map(status_name))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transfers", e))?;

        rows.iter().map(|r| decode_column(r, "document")).collect()
    }

    pub async fn movements_async(
        &self,
        query: &MovementQuery,
    ) -> Result<Vec<LoggedMovement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence_number, document FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR location = $2)
              AND ($3::text IS NULL OR movement_type = $3)
              AND ($4::text IS NULL OR reference_kind = $4)
              AND ($5::uuid IS NULL OR reference_id = $5)
              AND sequence_number > $6
            ORDER BY sequence_number ASC
            LIMIT $7
            "#,
        )
        .bind(query.product_id.map(|p| *p.as_uuid()))
        .bind(query.location.as_ref().map(|l| l.as_str().to_string()))
        .bind(query.movement_type.map(|t| t.as_str()))
        .bind(query.reference.map(|r| r.kind.as_str()))
        .bind(query.reference.map(|r| r.id))
        .bind(query.after_sequence.unwrap_or(0) as i64)
        .bind(query.limit.map_or(i64::MAX, |l| l as i64))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements", e))?;

        rows.iter()
            .map(|row| {
                let sequence_number: i64 = row
                    .try_get("sequence_number")
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(LoggedMovement {
                    sequence_number: sequence_number as u64,
                    movement: decode_column(row, "document")?,
                })
            })
            .collect()
    }

    pub async fn adjustments_async(
        &self,
        key: Option<&BalanceKey>,
    ) -> Result<Vec<StockAdjustment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM stock_adjustments
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR location = $2)
            ORDER BY position ASC
            "#,
        )
        .bind(key.map(|k| *k.product_id.as_uuid()))
        .bind(key.map(|k| k.location.as_str().to_string()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("adjustments", e))?;

        rows.iter().map(|r| decode_column(r, "document")).collect()
    }
}

async fn lock_version(
    tx: &mut Transaction<'_, Postgres>,
    sql: &str,
    id: &uuid::Uuid,
    location: Option<&str>,
) -> Result<u64, StoreError> {
    let mut query = sqlx::query(sql).bind(id);
    if let Some(location) = location {
        query = query.bind(location);
    }
    let row = query
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_version", e))?;

    match row {
        Some(row) => {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| StoreError::Serialization(format!("failed to read version: {e}")))?;
            Ok(version as u64)
        }
        None => Ok(0),
    }
}

fn ensure_version(what: &str, expected: ExpectedVersion, current: u64) -> Result<(), StoreError> {
    if expected.matches(current) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{what}: expected {expected:?}, found {current}"
        )))
    }
}

async fn upsert_balance(
    tx: &mut Transaction<'_, Postgres>,
    balance: &StockBalance,
    previous_version: u64,
) -> Result<(), StoreError> {
    let updated_at: DateTime<Utc> = balance.updated_at.unwrap_or_else(Utc::now);
    let total_kg: Decimal = balance.level.total_kg;
    let document = encode(balance)?;

    let sql = if previous_version == 0 {
        r#"
        INSERT INTO stock_balances (product_id, location, total_kg, version, document, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#
    } else {
        r#"
        UPDATE stock_balances
        SET total_kg = $3, version = $4, document = $5, updated_at = $6
        WHERE product_id = $1 AND location = $2
        "#
    };

    sqlx::query(sql)
        .bind(balance.key.product_id.as_uuid())
        .bind(balance.key.location.as_str())
        .bind(total_kg)
        .bind(balance.version as i64)
        .bind(document)
        .bind(updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_balance", e))?;
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &Movement,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO stock_movements (
            movement_id, product_id, location, movement_type,
            reference_kind, reference_id, total_kg, document, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING sequence_number
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.product_id.as_uuid())
    .bind(movement.location.as_str())
    .bind(movement.movement_type.as_str())
    .bind(movement.reference.kind.as_str())
    .bind(movement.reference.id)
    .bind(movement.total_kg)
    .bind(encode(movement)?)
    .bind(movement.occurred_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|e| StoreError::Serialization(format!("failed to read sequence_number: {e}")))?;
    Ok(sequence_number as u64)
}

fn status_name(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::Pending => "pending",
        TransferStatus::Completed => "completed",
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_column<T: DeserializeOwned>(
    row: &sqlx::postgres::PgRow,
    column: &str,
) -> Result<T, StoreError> {
    let value: serde_json::Value = row
        .try_get(column)
        .map_err(|e| StoreError::Serialization(format!("failed to read {column}: {e}")))?;
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Map SQLx errors to `StoreError`.
/// SQLSTATEs after which retrying the whole unit of work can succeed.
fn is_conflict_state(code: &str) -> bool {
    matches!(code, "23505" | "40001" | "40P01")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code() {
                Some(code) if is_conflict_state(&code) => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn read_balance(&self, key: &BalanceKey) -> Result<Option<StockBalance>, StoreError> {
        self.block_on(self.read_balance_async(key))
    }

    fn balances_at(&self, location: &LocationCode) -> Result<Vec<StockBalance>, StoreError> {
        self.block_on(self.balances_async(Some(location)))
    }

    fn snapshot(&self) -> Result<Vec<StockBalance>, StoreError> {
        self.block_on(self.balances_async(None))
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        self.block_on(self.commit_async(changes))
    }

    fn load_transfer(&self, id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        self.block_on(
            self.load_document("SELECT document FROM transfers WHERE transfer_id = $1", id.as_uuid()),
        )
    }

    fn list_transfers(
        &self,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, StoreError> {
        self.block_on(self.list_transfers_async(status))
    }

    fn load_production_order(
        &self,
        id: &ProductionOrderId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        self.block_on(self.load_document(
            "SELECT document FROM production_orders WHERE order_id = $1",
            id.as_uuid(),
        ))
    }

    fn load_count(&self, id: &InventoryCountId) -> Result<Option<InventoryCount>, StoreError> {
        self.block_on(
            self.load_document("SELECT document FROM inventory_counts WHERE count_id = $1", id.as_uuid()),
        )
    }

    fn movements(&self, query: &MovementQuery) -> Result<Vec<LoggedMovement>, StoreError> {
        self.block_on(self.movements_async(query))
    }

    fn adjustments(&self, key: Option<&BalanceKey>) -> Result<Vec<StockAdjustment>, StoreError> {
        self.block_on(self.adjustments_async(key))
    }
}
