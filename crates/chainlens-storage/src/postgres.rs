//! PostgreSQL storage backend.
//!
//! Persists blocks, operations, checkpoints, snapshots, rights, token rows,
//! and fee statistics. Uses `sqlx` with connection pooling.
//!
//! # Schema
//! Tables are created on first connect by [`PostgresStore::init_schema`].
//! Key constraints carry the pipeline's idempotence: block identity is the
//! hash, a level can only ever hold one hash, and dependent rows use
//! `ON CONFLICT DO NOTHING` so replaying a committed page changes nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use chainlens_core::types::{
    AccountCheckpoint, AccountSnapshot, BakerCheckpoint, BakerSnapshot, Block, FeeStats,
    OperationKind, ResetEvent, RightsKind, RightsRow,
};

use crate::error::StoreError;
use crate::store::{
    AccountStore, BakerStore, BlockStore, BlockWrite, CheckpointStore, FeeStore, ResetStore,
    RightsStore,
};

// ─── Connection options ──────────────────────────────────────────────────────

/// Connection options for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresStore ───────────────────────────────────────────────────────────

/// PostgreSQL-backed store.
///
/// Thread-safe and cheaply cloneable — wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("postgres connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("PostgresStore connected and schema initialized");
        Ok(store)
    }

    /// Create tables and indexes if they don't already exist.
    async fn init_schema(&self) -> Result<(), StoreError> {
        let ddl = [
            "CREATE TABLE IF NOT EXISTS blocks (
                hash        TEXT        PRIMARY KEY,
                level       BIGINT      NOT NULL UNIQUE,
                predecessor TEXT        NOT NULL,
                timestamp   TIMESTAMPTZ NOT NULL,
                protocol    TEXT        NOT NULL,
                baker       TEXT,
                metadata    JSONB       NOT NULL DEFAULT '{}'::JSONB
            )",
            "CREATE TABLE IF NOT EXISTS operations (
                block_hash  TEXT    NOT NULL REFERENCES blocks(hash),
                block_level BIGINT  NOT NULL,
                op_index    INTEGER NOT NULL,
                group_hash  TEXT    NOT NULL,
                kind        TEXT    NOT NULL,
                source      TEXT,
                destination TEXT,
                delegate    TEXT,
                fee         BIGINT,
                amount      BIGINT,
                counter     BIGINT,
                PRIMARY KEY (block_hash, op_index)
            )",
            "CREATE TABLE IF NOT EXISTS account_checkpoints (
                account_id  TEXT   NOT NULL,
                block_level BIGINT NOT NULL,
                block_hash  TEXT   NOT NULL,
                cycle       BIGINT,
                PRIMARY KEY (account_id, block_level)
            )",
            "CREATE TABLE IF NOT EXISTS baker_checkpoints (
                delegate    TEXT   NOT NULL,
                block_level BIGINT NOT NULL,
                block_hash  TEXT   NOT NULL,
                cycle       BIGINT,
                PRIMARY KEY (delegate, block_level)
            )",
            "CREATE TABLE IF NOT EXISTS accounts (
                account_id  TEXT    NOT NULL,
                block_level BIGINT  NOT NULL,
                balance     BIGINT  NOT NULL,
                delegate    TEXT,
                counter     BIGINT,
                is_baker    BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (account_id, block_level)
            )",
            "CREATE TABLE IF NOT EXISTS bakers (
                delegate          TEXT    NOT NULL,
                block_level       BIGINT  NOT NULL,
                staking_balance   BIGINT  NOT NULL,
                delegated_balance BIGINT  NOT NULL,
                deactivated       BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (delegate, block_level)
            )",
            "CREATE TABLE IF NOT EXISTS rights (
                level          BIGINT  NOT NULL,
                cycle          BIGINT  NOT NULL,
                delegate       TEXT    NOT NULL,
                slot           INTEGER NOT NULL,
                kind           TEXT    NOT NULL,
                estimated_time TIMESTAMPTZ,
                PRIMARY KEY (level, delegate, slot, kind)
            )",
            "CREATE TABLE IF NOT EXISTS fees (
                kind      TEXT        NOT NULL,
                low       BIGINT      NOT NULL,
                mean      BIGINT      NOT NULL,
                high      BIGINT      NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (kind, timestamp)
            )",
            "CREATE TABLE IF NOT EXISTS token_transfers (
                block_level  BIGINT  NOT NULL,
                op_index     INTEGER NOT NULL,
                contract     TEXT    NOT NULL,
                from_address TEXT    NOT NULL,
                to_address   TEXT    NOT NULL,
                amount       BIGINT  NOT NULL,
                PRIMARY KEY (block_level, op_index)
            )",
            "CREATE TABLE IF NOT EXISTS token_balances (
                block_level BIGINT NOT NULL,
                contract    TEXT   NOT NULL,
                holder      TEXT   NOT NULL,
                balance     BIGINT NOT NULL,
                PRIMARY KEY (block_level, contract, holder)
            )",
            "CREATE TABLE IF NOT EXISTS tns_entries (
                name                TEXT   PRIMARY KEY,
                address             TEXT   NOT NULL,
                registered_at_level BIGINT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS applied_resets (
                activation_level BIGINT      PRIMARY KEY,
                protocol         TEXT        NOT NULL,
                kind             TEXT        NOT NULL,
                applied_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE INDEX IF NOT EXISTS idx_operations_level
             ON operations(block_level DESC, op_index)",
            "CREATE INDEX IF NOT EXISTS idx_operations_kind_fee
             ON operations(kind, block_level DESC) WHERE fee IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_rights_missing_time
             ON rights(level) WHERE estimated_time IS NULL",
        ];
        for stmt in ddl {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        debug!("PostgresStore schema initialized");
        Ok(())
    }

    /// The underlying connection pool (for the query layer).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_block(row: &sqlx::postgres::PgRow) -> Result<Block, sqlx::Error> {
    Ok(Block {
        hash: row.try_get("hash")?,
        level: row.try_get::<i64, _>("level")? as u64,
        predecessor: row.try_get("predecessor")?,
        timestamp: row.try_get("timestamp")?,
        protocol: row.try_get("protocol")?,
        baker: row.try_get("baker")?,
        metadata: row.try_get("metadata")?,
    })
}

fn parse_rights_kind(s: &str) -> RightsKind {
    match s {
        "endorsing" => RightsKind::Endorsing,
        _ => RightsKind::Baking,
    }
}

// ─── BlockStore ──────────────────────────────────────────────────────────────

#[async_trait]
impl BlockStore for PostgresStore {
    async fn write_block_page(&self, page: &[BlockWrite]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut committed = 0usize;

        for write in page {
            let b = &write.block;
            let inserted = sqlx::query(
                "INSERT INTO blocks (hash, level, predecessor, timestamp, protocol, baker, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (hash) DO NOTHING",
            )
            .bind(&b.hash)
            .bind(b.level as i64)
            .bind(&b.predecessor)
            .bind(b.timestamp)
            .bind(&b.protocol)
            .bind(&b.baker)
            .bind(&b.metadata)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                // Block already committed; its dependent rows committed with
                // it, so skip the whole write and emit nothing new.
                continue;
            }
            committed += 1;

            for op in &write.operations {
                sqlx::query(
                    "INSERT INTO operations
                        (block_hash, block_level, op_index, group_hash, kind,
                         source, destination, delegate, fee, amount, counter)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                     ON CONFLICT (block_hash, op_index) DO NOTHING",
                )
                .bind(&op.block_hash)
                .bind(op.block_level as i64)
                .bind(op.op_index as i32)
                .bind(&op.group_hash)
                .bind(op.kind.as_str())
                .bind(&op.source)
                .bind(&op.destination)
                .bind(&op.delegate)
                .bind(op.fee.map(|v| v as i64))
                .bind(op.amount.map(|v| v as i64))
                .bind(op.counter.map(|v| v as i64))
                .execute(&mut *tx)
                .await?;
            }

            for cp in &write.account_checkpoints {
                sqlx::query(
                    "INSERT INTO account_checkpoints (account_id, block_level, block_hash, cycle)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (account_id, block_level) DO NOTHING",
                )
                .bind(&cp.account_id)
                .bind(cp.block_level as i64)
                .bind(&cp.block_hash)
                .bind(cp.cycle.map(|v| v as i64))
                .execute(&mut *tx)
                .await?;
            }

            for cp in &write.baker_checkpoints {
                sqlx::query(
                    "INSERT INTO baker_checkpoints (delegate, block_level, block_hash, cycle)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (delegate, block_level) DO NOTHING",
                )
                .bind(&cp.delegate)
                .bind(cp.block_level as i64)
                .bind(&cp.block_hash)
                .bind(cp.cycle.map(|v| v as i64))
                .execute(&mut *tx)
                .await?;
            }

            for t in &write.token_transfers {
                sqlx::query(
                    "INSERT INTO token_transfers
                        (block_level, op_index, contract, from_address, to_address, amount)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     ON CONFLICT (block_level, op_index) DO NOTHING",
                )
                .bind(t.block_level as i64)
                .bind(t.op_index as i32)
                .bind(&t.contract)
                .bind(&t.from)
                .bind(&t.to)
                .bind(t.amount as i64)
                .execute(&mut *tx)
                .await?;
            }

            for t in &write.token_balances {
                sqlx::query(
                    "INSERT INTO token_balances (block_level, contract, holder, balance)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (block_level, contract, holder) DO NOTHING",
                )
                .bind(t.block_level as i64)
                .bind(&t.contract)
                .bind(&t.holder)
                .bind(t.balance as i64)
                .execute(&mut *tx)
                .await?;
            }

            for e in &write.tns_entries {
                sqlx::query(
                    "INSERT INTO tns_entries (name, address, registered_at_level)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (name) DO UPDATE SET
                        address = EXCLUDED.address,
                        registered_at_level = EXCLUDED.registered_at_level",
                )
                .bind(&e.name)
                .bind(&e.address)
                .bind(e.registered_at_level as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(format!("commit page: {e}")))?;

        Ok(committed)
    }

    async fn max_level(&self) -> Result<Option<u64>, StoreError> {
        let level: Option<i64> = sqlx::query_scalar("SELECT MAX(level) FROM blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(level.map(|l| l as u64))
    }

    async fn block_exists(&self, hash: &str) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM blocks WHERE hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn block_at_level(&self, level: u64) -> Result<Option<Block>, StoreError> {
        let row = sqlx::query("SELECT * FROM blocks WHERE level = $1")
            .bind(level as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_block(&r)).transpose().map_err(Into::into)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// ─── CheckpointStore ─────────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for PostgresStore {
    async fn account_checkpoints(&self) -> Result<Vec<AccountCheckpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT account_id, block_level, block_hash, cycle
             FROM account_checkpoints
             ORDER BY account_id, block_level",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(AccountCheckpoint {
                    account_id: r.try_get("account_id")?,
                    block_level: r.try_get::<i64, _>("block_level")? as u64,
                    block_hash: r.try_get("block_hash")?,
                    cycle: r.try_get::<Option<i64>, _>("cycle")?.map(|v| v as u64),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    async fn write_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for cp in rows {
            sqlx::query(
                "INSERT INTO account_checkpoints (account_id, block_level, block_hash, cycle)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (account_id, block_level) DO NOTHING",
            )
            .bind(&cp.account_id)
            .bind(cp.block_level as i64)
            .bind(&cp.block_hash)
            .bind(cp.cycle.map(|v| v as i64))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_account_checkpoints(
        &self,
        rows: &[AccountCheckpoint],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for cp in rows {
            sqlx::query(
                "DELETE FROM account_checkpoints WHERE account_id = $1 AND block_level = $2",
            )
            .bind(&cp.account_id)
            .bind(cp.block_level as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn baker_checkpoints(&self) -> Result<Vec<BakerCheckpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT delegate, block_level, block_hash, cycle
             FROM baker_checkpoints
             ORDER BY delegate, block_level",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(BakerCheckpoint {
                    delegate: r.try_get("delegate")?,
                    block_level: r.try_get::<i64, _>("block_level")? as u64,
                    block_hash: r.try_get("block_hash")?,
                    cycle: r.try_get::<Option<i64>, _>("cycle")?.map(|v| v as u64),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    async fn write_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for cp in rows {
            sqlx::query(
                "INSERT INTO baker_checkpoints (delegate, block_level, block_hash, cycle)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (delegate, block_level) DO NOTHING",
            )
            .bind(&cp.delegate)
            .bind(cp.block_level as i64)
            .bind(&cp.block_hash)
            .bind(cp.cycle.map(|v| v as i64))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_baker_checkpoints(&self, rows: &[BakerCheckpoint]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for cp in rows {
            sqlx::query("DELETE FROM baker_checkpoints WHERE delegate = $1 AND block_level = $2")
                .bind(&cp.delegate)
                .bind(cp.block_level as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ─── AccountStore / BakerStore ───────────────────────────────────────────────

#[async_trait]
impl AccountStore for PostgresStore {
    async fn write_account_snapshots(&self, rows: &[AccountSnapshot]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for s in rows {
            sqlx::query(
                "INSERT INTO accounts (account_id, block_level, balance, delegate, counter, is_baker)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (account_id, block_level) DO UPDATE SET
                    balance  = EXCLUDED.balance,
                    delegate = EXCLUDED.delegate,
                    counter  = EXCLUDED.counter,
                    is_baker = EXCLUDED.is_baker",
            )
            .bind(&s.account_id)
            .bind(s.block_level as i64)
            .bind(s.balance as i64)
            .bind(&s.delegate)
            .bind(s.counter.map(|v| v as i64))
            .bind(s.is_baker)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn account_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar("SELECT DISTINCT account_id FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn account_snapshot(
        &self,
        account_id: &str,
        block_level: u64,
    ) -> Result<Option<AccountSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT account_id, block_level, balance, delegate, counter, is_baker
             FROM accounts WHERE account_id = $1 AND block_level = $2",
        )
        .bind(account_id)
        .bind(block_level as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok::<_, sqlx::Error>(AccountSnapshot {
                account_id: r.try_get("account_id")?,
                block_level: r.try_get::<i64, _>("block_level")? as u64,
                balance: r.try_get::<i64, _>("balance")? as u64,
                delegate: r.try_get("delegate")?,
                counter: r.try_get::<Option<i64>, _>("counter")?.map(|v| v as u64),
                is_baker: r.try_get("is_baker")?,
            })
        })
        .transpose()
        .map_err(Into::into)
    }
}

#[async_trait]
impl BakerStore for PostgresStore {
    async fn write_baker_snapshots(&self, rows: &[BakerSnapshot]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for s in rows {
            sqlx::query(
                "INSERT INTO bakers
                    (delegate, block_level, staking_balance, delegated_balance, deactivated)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (delegate, block_level) DO UPDATE SET
                    staking_balance   = EXCLUDED.staking_balance,
                    delegated_balance = EXCLUDED.delegated_balance,
                    deactivated       = EXCLUDED.deactivated",
            )
            .bind(&s.delegate)
            .bind(s.block_level as i64)
            .bind(s.staking_balance as i64)
            .bind(s.delegated_balance as i64)
            .bind(s.deactivated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ─── RightsStore ─────────────────────────────────────────────────────────────

#[async_trait]
impl RightsStore for PostgresStore {
    async fn upsert_rights(&self, rows: &[RightsRow]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                "INSERT INTO rights (level, cycle, delegate, slot, kind, estimated_time)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (level, delegate, slot, kind) DO UPDATE SET
                    cycle          = EXCLUDED.cycle,
                    estimated_time = COALESCE(EXCLUDED.estimated_time, rights.estimated_time)",
            )
            .bind(r.level as i64)
            .bind(r.cycle as i64)
            .bind(&r.delegate)
            .bind(r.slot as i32)
            .bind(r.kind.as_str())
            .bind(r.estimated_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn backfill_rights_timestamps(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE rights SET estimated_time = b.timestamp
             FROM blocks b
             WHERE b.level = rights.level
               AND (rights.estimated_time IS NULL OR rights.estimated_time <> b.timestamp)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn rights_at_level(&self, level: u64) -> Result<Vec<RightsRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT level, cycle, delegate, slot, kind, estimated_time
             FROM rights WHERE level = $1 ORDER BY kind, slot",
        )
        .bind(level as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(RightsRow {
                    level: r.try_get::<i64, _>("level")? as u64,
                    cycle: r.try_get::<i64, _>("cycle")? as u64,
                    delegate: r.try_get("delegate")?,
                    slot: r.try_get::<i32, _>("slot")? as u32,
                    kind: parse_rights_kind(r.try_get::<&str, _>("kind")?),
                    estimated_time: r.try_get("estimated_time")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }
}

// ─── FeeStore ────────────────────────────────────────────────────────────────

#[async_trait]
impl FeeStore for PostgresStore {
    async fn recent_fees(&self, kind: OperationKind, limit: usize) -> Result<Vec<u64>, StoreError> {
        let fees: Vec<i64> = sqlx::query_scalar(
            "SELECT fee FROM operations
             WHERE kind = $1 AND fee IS NOT NULL
             ORDER BY block_level DESC, op_index DESC
             LIMIT $2",
        )
        .bind(kind.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(fees.into_iter().map(|f| f as u64).collect())
    }

    async fn write_fee_stats(&self, stats: &FeeStats) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO fees (kind, low, mean, high, timestamp)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (kind, timestamp) DO UPDATE SET
                low = EXCLUDED.low, mean = EXCLUDED.mean, high = EXCLUDED.high",
        )
        .bind(stats.kind.as_str())
        .bind(stats.low as i64)
        .bind(stats.mean as i64)
        .bind(stats.high as i64)
        .bind(stats.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_fee_stats(&self, kind: OperationKind) -> Result<Option<FeeStats>, StoreError> {
        let row = sqlx::query(
            "SELECT kind, low, mean, high, timestamp FROM fees
             WHERE kind = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok::<_, sqlx::Error>(FeeStats {
                kind,
                low: r.try_get::<i64, _>("low")? as u64,
                mean: r.try_get::<i64, _>("mean")? as u64,
                high: r.try_get::<i64, _>("high")? as u64,
                timestamp: r.try_get::<DateTime<Utc>, _>("timestamp")?,
            })
        })
        .transpose()
        .map_err(Into::into)
    }
}

// ─── ResetStore ──────────────────────────────────────────────────────────────

#[async_trait]
impl ResetStore for PostgresStore {
    async fn applied_reset_levels(&self) -> Result<Vec<u64>, StoreError> {
        let levels: Vec<i64> =
            sqlx::query_scalar("SELECT activation_level FROM applied_resets ORDER BY activation_level")
                .fetch_all(&self.pool)
                .await?;
        Ok(levels.into_iter().map(|l| l as u64).collect())
    }

    async fn mark_reset_applied(&self, event: &ResetEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO applied_resets (activation_level, protocol, kind)
             VALUES ($1, $2, $3)
             ON CONFLICT (activation_level) DO NOTHING",
        )
        .bind(event.activation_level as i64)
        .bind(&event.protocol)
        .bind(&event.kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
