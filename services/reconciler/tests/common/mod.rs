use reconciler::model::{DesiredSpec, DesiredState};
use reconciler::reconcile::Reconciler;
use reconciler::store::LedgerTable;
use reconciler::store::memory::{
    InMemoryLedger, InMemoryNamespaceStore, InMemoryObjectStore, InMemorySpecStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tenancy_rbac::Subject;

pub struct Harness {
    pub specs: Arc<InMemorySpecStore>,
    pub namespaces: Arc<InMemoryNamespaceStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub objects: Arc<InMemoryObjectStore>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let specs = Arc::new(InMemorySpecStore::new());
        let namespaces = Arc::new(InMemoryNamespaceStore::new());
        let ledger = Arc::new(InMemoryLedger::new(LedgerTable {
            dataset: "billing".to_string(),
            table: "namespace_labels".to_string(),
        }));
        let objects = Arc::new(InMemoryObjectStore::new());
        let reconciler = Reconciler::new(
            specs.clone(),
            namespaces.clone(),
            ledger.clone(),
            objects.clone(),
        );
        Self {
            specs,
            namespaces,
            ledger,
            objects,
            reconciler,
        }
    }

    /// Writes across every store, used to assert a reconcile was a no-op.
    pub fn total_writes(&self) -> u64 {
        self.specs.writes() + self.namespaces.writes() + self.ledger.writes() + self.objects.writes()
    }

    pub fn total_calls(&self) -> u64 {
        self.specs.calls() + self.namespaces.calls() + self.ledger.calls() + self.objects.calls()
    }
}

pub fn tenant(name: &str, sudoers: &[&str]) -> DesiredState {
    DesiredState::new(
        name,
        DesiredSpec {
            billing: BTreeMap::from([
                ("cost-center".to_string(), "cc-1".to_string()),
                ("budget".to_string(), "100".to_string()),
            ]),
            istio_revision: "istio-version-1".to_string(),
            sudoers: sudoers.iter().map(|s| Subject::user(*s)).collect(),
            developers: vec![Subject::user("dev@example.com")],
            managers: vec![Subject::group("leads")],
            ..DesiredSpec::default()
        },
    )
}
