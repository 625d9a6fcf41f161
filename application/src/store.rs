//! Driver interface to the document store.
//!
//! The repository only ever talks to the store through these traits; the
//! concrete driver is supplied by the infrastructure layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A stored document: field name -> JSON value.
pub type Document = Map<String, Value>;

// --- Driver Errors ---
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Client is not connected")]
    NotConnected,
    #[error("No store reachable at '{address}'")]
    ServerUnavailable { address: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Client has been closed")]
    ClientClosed,
    #[error("Duplicate key: {key} = {value}")]
    DuplicateKey { key: String, value: Value },
    #[error("Command failed: {0}")]
    Command(String),
}

// --- Acknowledgment ---

/// Result object nested in a write response.
///
/// Both fields are kept as raw JSON: stores report them as integers or
/// doubles (`1` or `1.0`), and a code of the wrong shape must read as "not
/// acknowledged" rather than fail to parse.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Success code. Only a numeric `1` means the write was acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    /// Number of documents inserted, matched or deleted, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<Value>,
}

/// Response the store returns for a write operation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WriteResponse {
    pub result: WriteResult,
}

impl WriteResponse {
    pub fn acknowledged(n: u64) -> Self {
        Self {
            result: WriteResult {
                ok: Some(Value::from(1)),
                n: Some(Value::from(n)),
            },
        }
    }

    pub fn unacknowledged() -> Self {
        Self {
            result: WriteResult {
                ok: Some(Value::from(0)),
                n: None,
            },
        }
    }

    /// Count reported by the store, if it is a whole non-negative number.
    pub fn affected(&self) -> Option<u64> {
        let n = self.result.n.as_ref()?;
        n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|count| *count >= 0.0 && count.fract() == 0.0 && *count <= u64::MAX as f64)
                .map(|count| count as u64)
        })
    }
}

/// True only when the store reported a numeric success code equal to `1`.
///
/// A zero-match delete or update is still acknowledged: the code says the
/// operation completed, not that anything changed.
pub fn is_acknowledged(response: &WriteResponse) -> bool {
    response
        .result
        .ok
        .as_ref()
        .and_then(Value::as_f64)
        .is_some_and(|code| code == 1.0)
}

// --- Filter ---

/// Exact-match conjunction over document fields. An empty filter matches
/// every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(key, value)
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected))
    }

    pub fn to_document(&self) -> Document {
        self.conditions.iter().cloned().collect()
    }
}

// --- Driver Interfaces (Traits) ---

/// Handle to a document store connection.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Whether the handle currently holds a live connection.
    fn is_connected(&self) -> bool;
    /// Handle on a collection inside a logical database.
    fn collection(&self, database: &str, name: &str) -> Arc<dyn DocumentCollection>;
    /// Releases the connection. Terminal for every user of this handle.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Operations on a single collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// `database.collection`, for diagnostics.
    fn namespace(&self) -> String;
    async fn insert_one(&self, document: Document) -> Result<WriteResponse, StoreError>;
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError>;
    /// Sets the given fields on the first document matching `filter`.
    async fn update_one(
        &self,
        filter: &Filter,
        set: Document,
    ) -> Result<WriteResponse, StoreError>;
    async fn delete_one(&self, filter: &Filter) -> Result<WriteResponse, StoreError>;
    async fn delete_many(&self, filter: &Filter) -> Result<WriteResponse, StoreError>;
}
