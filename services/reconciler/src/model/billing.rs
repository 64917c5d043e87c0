use serde::{Deserialize, Serialize};

/// One row of the billing ledger: a key/value pair owned by a tenant.
///
/// Rows proposed for deletion carry an empty `value`; the ledger matches them
/// on `(ns_name, name)` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingRow {
    pub ns_name: String,
    pub name: String,
    pub value: String,
}

impl BillingRow {
    pub fn new(ns_name: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ns_name: ns_name.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn key_only(ns_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ns_name, name, String::new())
    }
}
