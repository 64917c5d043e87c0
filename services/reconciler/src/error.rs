//! Reconcile failure reporting.
//!
//! A reconcile stops at the first failing stage. The error names that stage so
//! a single log line tells an operator where convergence stopped; the wrapped
//! [`StoreError`] decides whether the scheduler should retry.
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchSpec,
    Finalizer,
    Namespace,
    Billing,
    SelfImpersonators,
    SudoerGroup,
    SudoerPermissions,
    DeveloperPermissions,
    ManagerPermissions,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchSpec => "fetch_spec",
            Stage::Finalizer => "finalizer",
            Stage::Namespace => "namespace",
            Stage::Billing => "billing",
            Stage::SelfImpersonators => "self_impersonators",
            Stage::SudoerGroup => "sudoer_group",
            Stage::SudoerPermissions => "sudoer_permissions",
            Stage::DeveloperPermissions => "developer_permissions",
            Stage::ManagerPermissions => "manager_permissions",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("reconcile failed at {stage}: {source}")]
pub struct ReconcileError {
    pub stage: Stage,
    #[source]
    pub source: StoreError,
}

impl ReconcileError {
    pub fn new(stage: Stage, source: StoreError) -> Self {
        Self { stage, source }
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

/// Attach a [`Stage`] to store failures.
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, ReconcileError>;
}

impl<T> StageContext<T> for Result<T, StoreError> {
    fn stage(self, stage: Stage) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::new(stage, source))
    }
}
