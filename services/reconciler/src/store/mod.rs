//! Store interfaces consumed by the reconciler.
//!
//! # Purpose
//! The reconciler never talks to a concrete backend. It reads specifications
//! through [`SpecStore`], writes derived RBAC objects through
//! [`DerivedObjectStore`], the tenant namespace through [`NamespaceStore`] and
//! billing rows through [`LedgerStore`].
//!
//! # Concurrency
//! Reconciles of different tenants run concurrently against the same shared
//! objects. Every write is a read-modify-write guarded by `resource_version`;
//! a stale write fails with [`StoreError::Conflict`] and the whole reconcile is
//! retried by the caller.
use crate::model::{BillingRow, DesiredState, TenantNamespace};
use async_trait::async_trait;
use tenancy_rbac::{LabelSelector, ObjectKey, ObjectKind, RbacObject};
use thiserror::Error;

pub mod memory;
pub mod postgres;


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether retrying the same reconcile later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SpecStore: Send + Sync {
    async fn get(&self, name: &str) -> StoreResult<DesiredState>;
    async fn add_finalizer(&self, name: &str, finalizer: &str) -> StoreResult<DesiredState>;
    async fn remove_finalizer(&self, name: &str, finalizer: &str) -> StoreResult<DesiredState>;
}

#[async_trait]
pub trait DerivedObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<RbacObject>;
    async fn create(&self, object: RbacObject) -> StoreResult<RbacObject>;
    /// Replace a stored object. Fails with `Conflict` when
    /// `object.resource_version` is not the stored version.
    async fn patch(&self, object: RbacObject) -> StoreResult<RbacObject>;
    async fn list(&self, kind: ObjectKind, selector: &LabelSelector)
    -> StoreResult<Vec<RbacObject>>;
}

#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn get(&self, name: &str) -> StoreResult<TenantNamespace>;
    async fn create(&self, namespace: TenantNamespace) -> StoreResult<TenantNamespace>;
    async fn patch(&self, namespace: TenantNamespace) -> StoreResult<TenantNamespace>;
}

/// Location of the billing table inside the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    pub dataset: String,
    pub table: String,
}

/// The three fixed statements ever issued against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatement {
    /// All rows belonging to one tenant.
    Select { ns_name: String },
    /// Insert or update every row passed alongside the statement.
    Upsert,
    /// Delete every `(ns_name, name)` passed alongside the statement.
    Delete,
}

impl LedgerStatement {
    /// Render the statement as ledger SQL. The row list is bound as the single
    /// `UNNEST(?)` parameter of upsert and delete.
    ///
    /// # Example
    /// ```rust
    /// use reconciler::store::{LedgerStatement, LedgerTable};
    ///
    /// let table = LedgerTable { dataset: "billing".into(), table: "labels".into() };
    /// let sql = LedgerStatement::Select { ns_name: "payments".into() }.render(&table);
    /// assert_eq!(sql, "SELECT * FROM billing.labels WHERE ns_name='payments'");
    /// ```
    pub fn render(&self, table: &LedgerTable) -> String {
        let target = format!("{}.{}", table.dataset, table.table);
        match self {
            LedgerStatement::Select { ns_name } => {
                format!("SELECT * FROM {target} WHERE ns_name='{ns_name}'")
            }
            LedgerStatement::Upsert => format!(
                "MERGE {target} T USING (SELECT * FROM UNNEST(?)) S ON T.ns_name=S.NSName AND T.name=S.Name WHEN MATCHED THEN UPDATE SET value=S.value WHEN NOT MATCHED THEN INSERT (name,value,ns_name) VALUES (S.Name,S.Value,S.NSName)"
            ),
            LedgerStatement::Delete => format!(
                "DELETE {target} T WHERE EXISTS (SELECT * FROM UNNEST(?) AS S WHERE T.ns_name=S.NSName AND T.name=S.Name)"
            ),
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            LedgerStatement::Select { .. } => "select",
            LedgerStatement::Upsert => "upsert",
            LedgerStatement::Delete => "delete",
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn run_query(
        &self,
        statement: &LedgerStatement,
        rows: &[BillingRow],
    ) -> StoreResult<Vec<BillingRow>>;

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LedgerTable {
        LedgerTable {
            dataset: "ds".to_string(),
            table: "tbl".to_string(),
        }
    }

    #[test]
    fn upsert_statement_is_exact() {
        assert_eq!(
            LedgerStatement::Upsert.render(&table()),
            "MERGE ds.tbl T USING (SELECT * FROM UNNEST(?)) S ON T.ns_name=S.NSName AND T.name=S.Name WHEN MATCHED THEN UPDATE SET value=S.value WHEN NOT MATCHED THEN INSERT (name,value,ns_name) VALUES (S.Name,S.Value,S.NSName)"
        );
    }

    #[test]
    fn delete_statement_is_exact() {
        assert_eq!(
            LedgerStatement::Delete.render(&table()),
            "DELETE ds.tbl T WHERE EXISTS (SELECT * FROM UNNEST(?) AS S WHERE T.ns_name=S.NSName AND T.name=S.Name)"
        );
    }

    #[test]
    fn select_statement_scopes_to_tenant() {
        let sql = LedgerStatement::Select {
            ns_name: "payments".to_string(),
        }
        .render(&table());
        assert_eq!(sql, "SELECT * FROM ds.tbl WHERE ns_name='payments'");
    }

    #[test]
    fn retryable_errors() {
        assert!(StoreError::Conflict("x".into()).is_retryable());
        assert!(StoreError::Unavailable("x".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::Unexpected(anyhow::anyhow!("boom")).is_retryable());
    }
}
