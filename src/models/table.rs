use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an independently subscribable partition of records,
/// e.g. `APPL_DB:BGP_GLOBAL`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    pub store: String,
    pub table: String,
}

impl TableId {
    pub fn new(store: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.store, self.table)
    }
}
