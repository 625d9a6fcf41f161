// ./infrastructure/src/persistence/in_memory_store.rs
use crate::config::ClientOptions;
use application::{
    Document, DocumentClient, DocumentCollection, Filter, StoreError, WriteResponse,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Store-owned identifier key added to every document.
pub const ID_KEY: &str = "_id";

// --- Cluster (the store itself) ---

/// Documents of one collection, keyed by insertion sequence so scans run in
/// natural order.
#[derive(Debug, Default)]
struct CollectionState {
    documents: BTreeMap<u64, Document>,
    unique_keys: Vec<String>,
}

impl CollectionState {
    fn first_match(&self, filter: &Filter) -> Option<u64> {
        self.documents
            .iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(seq, _)| *seq)
    }

    /// Checks `document` against `_id` and every unique key, ignoring the
    /// document stored under `skip` (the one being replaced).
    fn check_unique(&self, document: &Document, skip: Option<u64>) -> Result<(), StoreError> {
        let keys = std::iter::once(ID_KEY).chain(self.unique_keys.iter().map(String::as_str));
        for key in keys {
            let Some(value) = document.get(key) else {
                continue;
            };
            let clash = self
                .documents
                .iter()
                .any(|(seq, other)| Some(*seq) != skip && other.get(key) == Some(value));
            if clash {
                return Err(StoreError::DuplicateKey {
                    key: key.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Process-local document store reachable at a nominal address.
#[derive(Debug)]
pub struct InMemoryCluster {
    address: String,
    running: AtomicBool,
    next_seq: AtomicU64,
    // Namespace ("database.collection") -> collection state
    collections: DashMap<String, Arc<RwLock<CollectionState>>>,
}

impl InMemoryCluster {
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            running: AtomicBool::new(true),
            next_seq: AtomicU64::new(0),
            collections: DashMap::new(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops answering requests. Stored data is kept.
    pub fn shutdown(&self) {
        info!(address = %self.address, "In-memory store shutting down");
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn restart(&self) {
        info!(address = %self.address, "In-memory store restarting");
        self.running.store(true, Ordering::SeqCst);
    }

    /// Enforces uniqueness of `key` in a collection from now on. Fails if the
    /// documents already stored hold duplicate values.
    #[instrument(skip(self))]
    pub async fn create_unique_index(
        &self,
        database: &str,
        collection: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let state = self.collection_state(&namespace(database, collection));
        let mut state = state.write().await;
        let mut seen: Vec<&Value> = Vec::new();
        for value in state.documents.values().filter_map(|doc| doc.get(key)) {
            if seen.contains(&value) {
                return Err(StoreError::DuplicateKey {
                    key: key.to_string(),
                    value: value.clone(),
                });
            }
            seen.push(value);
        }
        if !state.unique_keys.iter().any(|k| k == key) {
            state.unique_keys.push(key.to_string());
        }
        debug!("Unique index created");
        Ok(())
    }

    /// Number of documents currently stored in a collection.
    pub async fn count_documents(&self, database: &str, collection: &str) -> usize {
        // Clone the Arc out so no map guard is held across the await
        let state = self
            .collections
            .get(&namespace(database, collection))
            .map(|state| state.clone());
        match state {
            Some(state) => state.read().await.documents.len(),
            None => 0,
        }
    }

    fn collection_state(&self, namespace: &str) -> Arc<RwLock<CollectionState>> {
        self.collections
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }
}

fn namespace(database: &str, collection: &str) -> String {
    format!("{}.{}", database, collection)
}

// --- Client ---

/// Connection state shared by a client and the collections it hands out.
#[derive(Debug)]
struct Session {
    cluster: Arc<InMemoryCluster>,
    address: String,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ClientClosed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::NotConnected);
        }
        if !self.cluster.is_running() {
            return Err(StoreError::Network(format!(
                "connection to {} lost",
                self.address
            )));
        }
        Ok(())
    }
}

/// Client for an [`InMemoryCluster`]. Starts disconnected.
#[derive(Debug)]
pub struct InMemoryClient {
    session: Arc<Session>,
    options: ClientOptions,
}

impl InMemoryClient {
    pub fn new(cluster: Arc<InMemoryCluster>, options: ClientOptions) -> Self {
        Self {
            session: Arc::new(Session {
                cluster,
                address: options.address.clone(),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            options,
        }
    }

    /// Creates a client and connects it.
    pub async fn connected(
        cluster: Arc<InMemoryCluster>,
        options: ClientOptions,
    ) -> Result<Arc<Self>, StoreError> {
        let client = Self::new(cluster, options);
        client.connect().await?;
        Ok(Arc::new(client))
    }

    /// Connects to the configured address. Fails when no running cluster
    /// answers there.
    #[instrument(skip(self), fields(address = %self.options.address))]
    pub async fn connect(&self) -> Result<(), StoreError> {
        if self.session.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ClientClosed);
        }
        let cluster = &self.session.cluster;
        if !cluster.is_running() || cluster.address() != self.options.address {
            warn!("No in-memory store answering at this address");
            return Err(StoreError::ServerUnavailable {
                address: self.options.address.clone(),
            });
        }
        self.session.connected.store(true, Ordering::SeqCst);
        info!(app_name = ?self.options.app_name, "Connected to in-memory store");
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for InMemoryClient {
    fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    fn collection(&self, database: &str, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(InMemoryCollection {
            session: self.session.clone(),
            namespace: namespace(database, name),
        })
    }

    #[instrument(skip(self), fields(address = %self.options.address))]
    async fn close(&self) -> Result<(), StoreError> {
        self.session.closed.store(true, Ordering::SeqCst);
        self.session.connected.store(false, Ordering::SeqCst);
        info!("In-memory client closed");
        Ok(())
    }
}

// --- Collection ---

#[derive(Debug)]
pub struct InMemoryCollection {
    session: Arc<Session>,
    namespace: String,
}

impl InMemoryCollection {
    fn state(&self) -> Result<Arc<RwLock<CollectionState>>, StoreError> {
        self.session.ensure_usable()?;
        Ok(self.session.cluster.collection_state(&self.namespace))
    }
}

#[async_trait]
impl DocumentCollection for InMemoryCollection {
    fn namespace(&self) -> String {
        self.namespace.clone()
    }

    #[instrument(skip(self, document))]
    async fn insert_one(&self, mut document: Document) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.namespace, "Inserting document into in-memory store");
        let state = self.state()?;
        let mut state = state.write().await;
        if !document.contains_key(ID_KEY) {
            document.insert(ID_KEY.to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        state.check_unique(&document, None)?;
        let seq = self.session.cluster.next_seq();
        state.documents.insert(seq, document);
        Ok(WriteResponse::acknowledged(1))
    }

    #[instrument(skip(self))]
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        debug!(namespace = %self.namespace, "Finding document in in-memory store");
        let state = self.state()?;
        let state = state.read().await;
        Ok(state
            .first_match(filter)
            .and_then(|seq| state.documents.get(&seq))
            .cloned())
    }

    #[instrument(skip(self, set))]
    async fn update_one(
        &self,
        filter: &Filter,
        set: Document,
    ) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.namespace, fields = set.len(), "Updating document in in-memory store");
        if set.is_empty() {
            return Err(StoreError::Command(
                "update must set at least one field".to_string(),
            ));
        }
        if set.contains_key(ID_KEY) {
            return Err(StoreError::Command(format!(
                "field '{}' is immutable",
                ID_KEY
            )));
        }
        let state = self.state()?;
        let mut state = state.write().await;
        let Some(seq) = state.first_match(filter) else {
            return Ok(WriteResponse::acknowledged(0));
        };
        let Some(current) = state.documents.get(&seq) else {
            return Ok(WriteResponse::acknowledged(0));
        };
        let mut updated = current.clone();
        updated.extend(set);
        state.check_unique(&updated, Some(seq))?;
        state.documents.insert(seq, updated);
        Ok(WriteResponse::acknowledged(1))
    }

    #[instrument(skip(self))]
    async fn delete_one(&self, filter: &Filter) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.namespace, "Deleting document from in-memory store");
        let state = self.state()?;
        let mut state = state.write().await;
        let deleted = match state.first_match(filter) {
            Some(seq) => state.documents.remove(&seq).map_or(0, |_| 1),
            None => 0,
        };
        Ok(WriteResponse::acknowledged(deleted))
    }

    #[instrument(skip(self))]
    async fn delete_many(&self, filter: &Filter) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.namespace, "Deleting matching documents from in-memory store");
        let state = self.state()?;
        let mut state = state.write().await;
        let before = state.documents.len();
        state.documents.retain(|_, doc| !filter.matches(doc));
        Ok(WriteResponse::acknowledged((before - state.documents.len()) as u64))
    }
}
