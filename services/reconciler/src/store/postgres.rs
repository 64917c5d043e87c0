//! Postgres-backed billing ledger.
//!
//! # What this module is
//! A durable [`LedgerStore`] for deployments that keep billing rows in
//! Postgres instead of a warehouse. The ledger statements keep their meaning:
//! select one tenant's rows, upsert a batch, delete a batch. Batches are bound
//! as parallel arrays and expanded with `UNNEST`, so each batch is one
//! statement and commits atomically.
//!
//! # Key invariants
//! - The table has a primary key on `(ns_name, name)`; upsert relies on it.
//! - Schema and table names come from configuration and are validated as plain
//!   identifiers before being formatted into SQL. Row values are always bound.
//!
//! # Error mapping
//! - Serialization failures and deadlocks map to `StoreError::Conflict`.
//! - Pool exhaustion, closed pools, io and TLS failures map to
//!   `StoreError::Unavailable`.
//! - Anything else is `StoreError::Unexpected`.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log `pg.url`.
use super::{LedgerStatement, LedgerStore, LedgerTable, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::BillingRow;
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

pub struct PostgresLedger {
    pool: PgPool,
    /// `schema.table`, validated at connect time.
    target: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbBillingRow {
    ns_name: String,
    name: String,
    value: String,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let conflict = match &err {
            sqlx::Error::Database(db_err) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        };
        if conflict {
            return StoreError::Conflict(err.to_string());
        }
        if matches!(
            &err,
            sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
        ) {
            return StoreError::Unavailable(err.to_string());
        }
        StoreError::Unexpected(err.into())
    }
}

impl PostgresLedger {
    /// Connect, then create the ledger schema and table when missing.
    ///
    /// # Errors
    /// - Invalid schema/table identifiers.
    /// - Connection or DDL failures.
    ///
    /// # Example
    /// ```rust,no_run
    /// use reconciler::config::PostgresConfig;
    /// use reconciler::store::LedgerTable;
    /// use reconciler::store::postgres::PostgresLedger;
    ///
    /// async fn open(pg: PostgresConfig, table: LedgerTable) {
    ///     let _ = PostgresLedger::connect(&pg, &table).await;
    /// }
    /// ```
    pub async fn connect(pg: &PostgresConfig, table: &LedgerTable) -> StoreResult<Self> {
        let target = qualified_name(table)?;
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        let ledger = Self { pool, target };
        ledger.ensure_table(&table.dataset).await?;
        Ok(ledger)
    }

    async fn ensure_table(&self, schema: &str) -> StoreResult<()> {
        // Identifiers were validated by `qualified_name`.
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (ns_name TEXT NOT NULL, name TEXT NOT NULL, value TEXT NOT NULL, PRIMARY KEY (ns_name, name))",
            self.target
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select(&self, ns_name: &str) -> StoreResult<Vec<BillingRow>> {
        let rows = sqlx::query_as::<_, DbBillingRow>(&format!(
            "SELECT ns_name, name, value FROM {} WHERE ns_name = $1 ORDER BY name",
            self.target
        ))
        .bind(ns_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| BillingRow::new(row.ns_name, row.name, row.value))
            .collect())
    }

    async fn upsert(&self, rows: &[BillingRow]) -> StoreResult<()> {
        let (ns_names, names, values) = columns(rows);
        sqlx::query(&format!(
            "INSERT INTO {} (ns_name, name, value) SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[]) ON CONFLICT (ns_name, name) DO UPDATE SET value = EXCLUDED.value",
            self.target
        ))
        .bind(ns_names)
        .bind(names)
        .bind(values)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, rows: &[BillingRow]) -> StoreResult<()> {
        let (ns_names, names, _) = columns(rows);
        sqlx::query(&format!(
            "DELETE FROM {} T USING UNNEST($1::text[], $2::text[]) AS S(ns_name, name) WHERE T.ns_name = S.ns_name AND T.name = S.name",
            self.target
        ))
        .bind(ns_names)
        .bind(names)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn run_query(
        &self,
        statement: &LedgerStatement,
        rows: &[BillingRow],
    ) -> StoreResult<Vec<BillingRow>> {
        match statement {
            LedgerStatement::Select { ns_name } => self.select(ns_name).await,
            LedgerStatement::Upsert => self.upsert(rows).await.map(|_| Vec::new()),
            LedgerStatement::Delete => self.delete(rows).await.map(|_| Vec::new()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn columns(rows: &[BillingRow]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut ns_names = Vec::with_capacity(rows.len());
    let mut names = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        ns_names.push(row.ns_name.clone());
        names.push(row.name.clone());
        values.push(row.value.clone());
    }
    (ns_names, names, values)
}

fn qualified_name(table: &LedgerTable) -> StoreResult<String> {
    for ident in [&table.dataset, &table.table] {
        if !is_identifier(ident) {
            return Err(StoreError::Unexpected(anyhow!(
                "invalid ledger identifier: {ident:?}"
            )));
        }
    }
    Ok(format!("{}.{}", table.dataset, table.table))
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
