//! Per-key reconcile driver.
//!
//! # Purpose
//! Brings everything derived from one tenant specification in line with it:
//! the core namespace, the billing ledger rows and the RBAC grants.
//!
//! # Ordering
//! 1. Fetch the specification. A missing one is treated as deleted.
//! 2. Orphan gate: a specification carrying the `orphan` finalizer is left
//!    alone, dependents included, with no further store calls.
//! 3. Deletion: a specification marked for deletion releases its entries on
//!    shared grants, then drops its release finalizer.
//! 4. Otherwise the release finalizer is ensured and the stages run
//!    `namespace -> billing -> rbac`, stopping at the first failure.
//!
//! The driver assumes it is the only reconciler running for a given key.
use crate::billing::BillingPlanner;
use crate::error::{ReconcileError, Stage, StageContext};
use crate::model::{DesiredState, RELEASE_GRANTS_FINALIZER};
use crate::namespace::NamespacePlanner;
use crate::rbac::RbacPlanner;
use crate::store::{DerivedObjectStore, LedgerStore, NamespaceStore, SpecStore, StoreError};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The specification no longer exists.
    Gone,
    /// The specification asked for its dependents to be orphaned.
    Orphaned,
    /// Deletion cleanup ran and the release finalizer was removed.
    Finalized,
    Applied,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Gone => "gone",
            ReconcileOutcome::Orphaned => "orphaned",
            ReconcileOutcome::Finalized => "finalized",
            ReconcileOutcome::Applied => "applied",
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    specs: Arc<dyn SpecStore>,
    namespaces: NamespacePlanner,
    billing: BillingPlanner,
    rbac: RbacPlanner,
}

impl Reconciler {
    pub fn new(
        specs: Arc<dyn SpecStore>,
        namespaces: Arc<dyn NamespaceStore>,
        ledger: Arc<dyn LedgerStore>,
        objects: Arc<dyn DerivedObjectStore>,
    ) -> Self {
        Self {
            specs,
            namespaces: NamespacePlanner::new(namespaces),
            billing: BillingPlanner::new(ledger),
            rbac: RbacPlanner::new(objects),
        }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let result = self.run(name).await;
        match &result {
            Ok(outcome) => {
                metrics::counter!(
                    "tenancy_reconcile_total",
                    "stage" => "done",
                    "outcome" => outcome.as_str()
                )
                .increment(1);
            }
            Err(err) => {
                metrics::counter!(
                    "tenancy_reconcile_total",
                    "stage" => err.stage.as_str(),
                    "outcome" => "error"
                )
                .increment(1);
                tracing::error!(
                    stage = %err.stage,
                    retryable = err.is_retryable(),
                    error = %err.source,
                    "reconcile failed"
                );
            }
        }
        result
    }

    async fn run(&self, name: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let state = match self.specs.get(name).await {
            Ok(state) => state,
            Err(StoreError::NotFound(_)) => {
                tracing::info!("specification not found; continuing as if deleted");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(err) => return Err(ReconcileError::new(Stage::FetchSpec, err)),
        };

        if state.is_orphaning() {
            tracing::info!("specification is to be orphaned; leaving dependents untouched");
            return Ok(ReconcileOutcome::Orphaned);
        }

        if state.deletion_requested {
            return self.finalize(&state).await;
        }

        if !state.has_finalizer(RELEASE_GRANTS_FINALIZER) {
            match self.specs.add_finalizer(name, RELEASE_GRANTS_FINALIZER).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    tracing::info!("specification vanished before finalizer was added");
                    return Ok(ReconcileOutcome::Gone);
                }
                Err(err) => return Err(ReconcileError::new(Stage::Finalizer, err)),
            }
        }

        self.namespaces
            .reconcile(&state)
            .await
            .stage(Stage::Namespace)?;
        self.billing.reconcile(&state).await.stage(Stage::Billing)?;
        self.rbac.reconcile(&state).await?;

        tracing::debug!("reconciled");
        Ok(ReconcileOutcome::Applied)
    }

    async fn finalize(&self, state: &DesiredState) -> Result<ReconcileOutcome, ReconcileError> {
        if !state.has_finalizer(RELEASE_GRANTS_FINALIZER) {
            return Ok(ReconcileOutcome::Finalized);
        }
        let released = self.rbac.release_all(state).await?;
        match self
            .specs
            .remove_finalizer(&state.name, RELEASE_GRANTS_FINALIZER)
            .await
        {
            // Already gone: the release above is all that was left to do.
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(ReconcileError::new(Stage::Finalizer, err)),
        }
        tracing::info!(released, "released shared grants before deletion");
        Ok(ReconcileOutcome::Finalized)
    }
}
