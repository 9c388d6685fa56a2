//! PostgreSQL backend.
//!
//! Counter accumulation happens inside the upsert itself
//! (`delta = counters.delta + EXCLUDED.delta`), so concurrent writers never
//! read-modify-write across a round trip. `BIGINT` overflow surfaces as
//! SQLSTATE `22003` and maps to [`StorageError::CounterOverflow`].

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgExecutor, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

use tally_common::{MetricUpdate, MetricValue};

use crate::error::{Result, StorageError};
use crate::repository::Repository;

/// SQLSTATE codes worth re-running the whole operation for: connection
/// exceptions (class 08) and protocol violation.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "08000", // connection_exception
    "08003", // connection_does_not_exist
    "08006", // connection_failure
    "08001", // sqlclient_unable_to_establish_sqlconnection
    "08004", // sqlserver_rejected_establishment_of_sqlconnection
    "08007", // transaction_resolution_unknown
    "08P01", // protocol_violation
];

const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

const UPSERT_GAUGE: &str = "INSERT INTO gauges (id, value) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value";

const UPSERT_COUNTER: &str = "INSERT INTO counters (id, delta) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET delta = counters.delta + EXCLUDED.delta";

pub fn is_transient_sqlstate(code: &str) -> bool {
    TRANSIENT_SQLSTATES.contains(&code)
}

/// Maps a driver error onto the storage taxonomy.
pub fn classify(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if is_transient_sqlstate(code) => StorageError::Transient(err.to_string()),
            Some(NUMERIC_VALUE_OUT_OF_RANGE) => StorageError::CounterOverflow(err.to_string()),
            _ => StorageError::Fatal(err.to_string()),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => StorageError::Transient(err.to_string()),
        _ => StorageError::Fatal(err.to_string()),
    }
}

async fn upsert<'e, E>(executor: E, update: &MetricUpdate) -> std::result::Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    match update.value {
        MetricValue::Gauge(v) => {
            sqlx::query(UPSERT_GAUGE)
                .bind(&update.id)
                .bind(v)
                .execute(executor)
                .await?;
        }
        MetricValue::Counter(d) => {
            sqlx::query(UPSERT_COUNTER)
                .bind(&update.id)
                .bind(d)
                .execute(executor)
                .await?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Opens a connection pool. The first connection is established eagerly
    /// so a bad DSN fails at startup.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(dsn)
            .await
            .map_err(classify)?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    #[instrument(skip(self))]
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        upsert(&self.pool, &MetricUpdate::gauge(id, value))
            .await
            .map_err(classify)
    }

    #[instrument(skip(self))]
    async fn update_counter(&self, id: &str, delta: i64) -> Result<()> {
        upsert(&self.pool, &MetricUpdate::counter(id, delta))
            .await
            .map_err(classify)
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT value FROM gauges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.map(|r| r.try_get::<f64, _>("value")).transpose().map_err(classify)
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT delta FROM counters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.map(|r| r.try_get::<i64, _>("delta")).transpose().map_err(classify)
    }

    async fn get_all_gauges(&self) -> Result<HashMap<String, f64>> {
        let rows = sqlx::query("SELECT id, value FROM gauges")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(classify)?;
            let value: f64 = row.try_get("value").map_err(classify)?;
            out.insert(id, value);
        }
        Ok(out)
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, delta FROM counters")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(classify)?;
            let delta: i64 = row.try_get("delta").map_err(classify)?;
            out.insert(id, delta);
        }
        Ok(out)
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn update_batch(&self, updates: &[MetricUpdate]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        for update in updates {
            // dropping `tx` on error rolls the whole batch back
            upsert(&mut *tx, update).await.map_err(classify)?;
        }
        tx.commit().await.map_err(classify)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
