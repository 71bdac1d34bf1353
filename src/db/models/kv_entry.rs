//! One row of the key-value table backing local persistent storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvEntry {
    pub key: String,
    /// JSON text.
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
