//! In-memory store adapters.
//!
//! # Purpose
//! Implements every store trait with maps guarded by `tokio::sync::RwLock`. It
//! exists for:
//! - local runs of the reconciler binary without external systems
//! - unit and integration tests of the planners and the driver
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Each object carries a `resource_version` bumped on every write. A patch
//!   carrying a stale version is rejected with `StoreError::Conflict`, the
//!   same optimistic-concurrency contract a real API server enforces.
//!
//! # Secondary index
//! The derived-object store keeps a `classification tag -> keys` index next to
//! the objects, updated under the same lock as the objects themselves, so
//! `list` by classification never scans the full table.
//!
//! # Instrumentation
//! Every adapter counts trait calls and successful writes. Tests use the
//! counters to assert that a reconcile issued no store calls at all, or no
//! writes on a converged second pass.
use super::{
    DerivedObjectStore, LedgerStatement, LedgerStore, LedgerTable, NamespaceStore, SpecStore,
    StoreError, StoreResult,
};
use crate::model::{BillingRow, DesiredState, TenantNamespace};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tenancy_rbac::{LabelSelector, ObjectKey, ObjectKind, RBAC_TYPE_LABEL, RbacObject};
use tokio::sync::RwLock;

/// Call and write counters shared by the in-memory adapters.
#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl Counters {
    fn enter(&self, what: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{what}: backend offline")));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

macro_rules! counter_accessors {
    () => {
        /// Number of trait calls served, failed ones included.
        pub fn calls(&self) -> u64 {
            self.counters.calls.load(Ordering::SeqCst)
        }

        /// Number of successful writes.
        pub fn writes(&self) -> u64 {
            self.counters.writes.load(Ordering::SeqCst)
        }

        /// Make every subsequent call fail with `StoreError::Unavailable`.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.counters.unavailable.store(unavailable, Ordering::SeqCst);
        }
    };
}

/// Specification objects keyed by name.
#[derive(Default)]
pub struct InMemorySpecStore {
    specs: Arc<RwLock<HashMap<String, DesiredState>>>,
    counters: Counters,
}

impl InMemorySpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    counter_accessors!();

    /// Create or replace a specification. Not counted as a reconciler call.
    pub async fn put(&self, state: DesiredState) {
        self.specs.write().await.insert(state.name.clone(), state);
    }

    /// Request deletion. Objects without finalizers disappear immediately;
    /// the rest are flagged and linger until their finalizers are removed.
    pub async fn request_deletion(&self, name: &str) {
        let mut specs = self.specs.write().await;
        let remove = match specs.get_mut(name) {
            Some(state) if state.finalizers.is_empty() => true,
            Some(state) => {
                state.deletion_requested = true;
                false
            }
            None => false,
        };
        if remove {
            specs.remove(name);
        }
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.specs.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.specs.read().await.contains_key(name)
    }
}

#[async_trait]
impl SpecStore for InMemorySpecStore {
    async fn get(&self, name: &str) -> StoreResult<DesiredState> {
        self.counters.enter("get spec")?;
        self.specs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("spec {name}")))
    }

    async fn add_finalizer(&self, name: &str, finalizer: &str) -> StoreResult<DesiredState> {
        self.counters.enter("add finalizer")?;
        let mut specs = self.specs.write().await;
        let state = specs
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("spec {name}")))?;
        if !state.has_finalizer(finalizer) {
            state.finalizers.push(finalizer.to_string());
            self.counters.wrote();
        }
        Ok(state.clone())
    }

    async fn remove_finalizer(&self, name: &str, finalizer: &str) -> StoreResult<DesiredState> {
        self.counters.enter("remove finalizer")?;
        let mut specs = self.specs.write().await;
        let state = specs
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("spec {name}")))?;
        let before = state.finalizers.len();
        state.finalizers.retain(|f| f != finalizer);
        if state.finalizers.len() != before {
            self.counters.wrote();
        }
        let state = state.clone();
        // Mirrors API-server semantics: the last finalizer releases a pending deletion.
        if state.deletion_requested && state.finalizers.is_empty() {
            specs.remove(name);
        }
        Ok(state)
    }
}

#[derive(Default)]
struct ObjectTable {
    objects: BTreeMap<ObjectKey, RbacObject>,
    /// classification tag value -> keys carrying it
    by_class: HashMap<String, BTreeSet<ObjectKey>>,
    next_version: u64,
}

impl ObjectTable {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn unindex(&mut self, object: &RbacObject) {
        let Some(class) = object.labels.get(RBAC_TYPE_LABEL) else {
            return;
        };
        if let Some(keys) = self.by_class.get_mut(class) {
            keys.remove(&object.key);
            if keys.is_empty() {
                self.by_class.remove(class);
            }
        }
    }

    fn index(&mut self, object: &RbacObject) {
        if let Some(class) = object.labels.get(RBAC_TYPE_LABEL) {
            self.by_class
                .entry(class.clone())
                .or_default()
                .insert(object.key.clone());
        }
    }
}

/// Derived RBAC objects with a classification-tag index.
#[derive(Default)]
pub struct InMemoryObjectStore {
    table: Arc<RwLock<ObjectTable>>,
    counters: Counters,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    counter_accessors!();

    /// Every stored object, ordered by key. Not counted as a reconciler call.
    pub async fn snapshot(&self) -> Vec<RbacObject> {
        self.table.read().await.objects.values().cloned().collect()
    }

    /// Remove objects that no longer have a valid owner, standing in for the
    /// external collector. Returns the keys removed.
    pub async fn collect_orphans(&self) -> Vec<ObjectKey> {
        let mut table = self.table.write().await;
        let doomed: Vec<RbacObject> = table
            .objects
            .values()
            .filter(|object| object.owners.is_orphaned())
            .cloned()
            .collect();
        for object in &doomed {
            table.unindex(object);
            table.objects.remove(&object.key);
        }
        doomed.into_iter().map(|object| object.key).collect()
    }
}

#[async_trait]
impl DerivedObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<RbacObject> {
        self.counters.enter("get object")?;
        self.table
            .read()
            .await
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create(&self, mut object: RbacObject) -> StoreResult<RbacObject> {
        self.counters.enter("create object")?;
        let mut table = self.table.write().await;
        if table.objects.contains_key(&object.key) {
            return Err(StoreError::Conflict(format!("{} exists", object.key)));
        }
        object.resource_version = table.bump();
        table.index(&object);
        table.objects.insert(object.key.clone(), object.clone());
        self.counters.wrote();
        Ok(object)
    }

    async fn patch(&self, mut object: RbacObject) -> StoreResult<RbacObject> {
        self.counters.enter("patch object")?;
        let mut table = self.table.write().await;
        let current = table
            .objects
            .get(&object.key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(object.key.to_string()))?;
        if current.resource_version != object.resource_version {
            return Err(StoreError::Conflict(format!(
                "{} modified: have version {}, stored {}",
                object.key, object.resource_version, current.resource_version
            )));
        }
        table.unindex(&current);
        object.resource_version = table.bump();
        table.index(&object);
        table.objects.insert(object.key.clone(), object.clone());
        self.counters.wrote();
        Ok(object)
    }

    async fn list(
        &self,
        kind: ObjectKind,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<RbacObject>> {
        self.counters.enter("list objects")?;
        let table = self.table.read().await;
        if selector.key == RBAC_TYPE_LABEL {
            let Some(keys) = table.by_class.get(&selector.value) else {
                return Ok(Vec::new());
            };
            return Ok(keys
                .iter()
                .filter(|key| key.kind == kind)
                .filter_map(|key| table.objects.get(key).cloned())
                .collect());
        }
        Ok(table
            .objects
            .values()
            .filter(|object| object.key.kind == kind && selector.matches(&object.labels))
            .cloned()
            .collect())
    }
}

/// Tenant namespaces keyed by name.
#[derive(Default)]
pub struct InMemoryNamespaceStore {
    namespaces: Arc<RwLock<HashMap<String, TenantNamespace>>>,
    next_version: AtomicU64,
    counters: Counters,
}

impl InMemoryNamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    counter_accessors!();

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl NamespaceStore for InMemoryNamespaceStore {
    async fn get(&self, name: &str) -> StoreResult<TenantNamespace> {
        self.counters.enter("get namespace")?;
        self.namespaces
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("namespace {name}")))
    }

    async fn create(&self, mut namespace: TenantNamespace) -> StoreResult<TenantNamespace> {
        self.counters.enter("create namespace")?;
        let mut namespaces = self.namespaces.write().await;
        if namespaces.contains_key(&namespace.name) {
            return Err(StoreError::Conflict(format!(
                "namespace {} exists",
                namespace.name
            )));
        }
        namespace.resource_version = self.bump();
        namespaces.insert(namespace.name.clone(), namespace.clone());
        self.counters.wrote();
        Ok(namespace)
    }

    async fn patch(&self, mut namespace: TenantNamespace) -> StoreResult<TenantNamespace> {
        self.counters.enter("patch namespace")?;
        let mut namespaces = self.namespaces.write().await;
        let stored = namespaces
            .get(&namespace.name)
            .ok_or_else(|| StoreError::NotFound(format!("namespace {}", namespace.name)))?;
        if stored.resource_version != namespace.resource_version {
            return Err(StoreError::Conflict(format!(
                "namespace {} modified",
                namespace.name
            )));
        }
        namespace.resource_version = self.bump();
        namespaces.insert(namespace.name.clone(), namespace.clone());
        self.counters.wrote();
        Ok(namespace)
    }
}

/// Number of statements [`InMemoryLedger::queries`] retains.
pub const QUERY_LOG_CAPACITY: usize = 64;

/// Billing ledger rows keyed by `(ns_name, name)`.
///
/// Interprets the three ledger statements directly and keeps the rendered SQL
/// of the most recent calls for inspection.
pub struct InMemoryLedger {
    table: LedgerTable,
    rows: Arc<RwLock<BTreeMap<(String, String), String>>>,
    log: Arc<RwLock<VecDeque<(String, Vec<BillingRow>)>>>,
    counters: Counters,
}

impl InMemoryLedger {
    pub fn new(table: LedgerTable) -> Self {
        Self {
            table,
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            log: Arc::new(RwLock::new(VecDeque::with_capacity(QUERY_LOG_CAPACITY))),
            counters: Counters::default(),
        }
    }

    counter_accessors!();

    pub async fn seed(&self, rows: impl IntoIterator<Item = BillingRow>) {
        let mut stored = self.rows.write().await;
        for row in rows {
            stored.insert((row.ns_name, row.name), row.value);
        }
    }

    pub async fn rows_for(&self, ns_name: &str) -> BTreeMap<String, String> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == ns_name)
            .map(|((_, name), value)| (name.clone(), value.clone()))
            .collect()
    }

    /// The most recent rendered statements and bound rows, oldest first.
    pub async fn queries(&self) -> Vec<(String, Vec<BillingRow>)> {
        self.log.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn run_query(
        &self,
        statement: &LedgerStatement,
        rows: &[BillingRow],
    ) -> StoreResult<Vec<BillingRow>> {
        self.counters.enter(statement.op_name())?;
        {
            let mut log = self.log.write().await;
            if log.len() == QUERY_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back((statement.render(&self.table), rows.to_vec()));
        }
        let mut stored = self.rows.write().await;
        match statement {
            LedgerStatement::Select { ns_name } => Ok(stored
                .iter()
                .filter(|((ns, _), _)| ns == ns_name)
                .map(|((ns, name), value)| BillingRow::new(ns, name, value))
                .collect()),
            LedgerStatement::Upsert => {
                for row in rows {
                    stored.insert((row.ns_name.clone(), row.name.clone()), row.value.clone());
                }
                self.counters.wrote();
                Ok(Vec::new())
            }
            LedgerStatement::Delete => {
                for row in rows {
                    stored.remove(&(row.ns_name.clone(), row.name.clone()));
                }
                self.counters.wrote();
                Ok(Vec::new())
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
