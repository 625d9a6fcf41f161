// ./infrastructure/src/persistence/mongo_store.rs
use crate::config::ClientOptions;
use application::{
    Document, DocumentClient, DocumentCollection, Filter, StoreError, WriteResponse,
};
use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::ClientOptions as MongoClientOptions;
use mongodb::{Client, Collection};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

const URI_SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// Connection string for `address`. Bare `host:port` addresses get the
/// `mongodb://` scheme; full connection strings are used as given.
pub fn connection_uri(address: &str) -> String {
    if URI_SCHEMES.iter().any(|scheme| address.starts_with(scheme)) {
        address.to_string()
    } else {
        format!("mongodb://{}", address)
    }
}

// --- Client ---

/// Driver handle plus the connection state shared with every collection.
#[derive(Debug)]
struct Session {
    client: Client,
    address: String,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ClientClosed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::NotConnected);
        }
        Ok(())
    }
}

/// Client for a MongoDB deployment. Starts disconnected; [`connect`](Self::connect)
/// pings the server before any operation is allowed.
#[derive(Debug)]
pub struct MongoClient {
    session: Arc<Session>,
}

impl MongoClient {
    /// Builds the driver client without touching the network.
    pub async fn new(options: ClientOptions) -> Result<Self, StoreError> {
        let uri = connection_uri(&options.address);
        let mut driver_options = MongoClientOptions::parse(&uri).await.map_err(map_error)?;
        if let Some(app_name) = &options.app_name {
            driver_options.app_name = Some(app_name.clone());
        }
        let client = Client::with_options(driver_options).map_err(map_error)?;
        Ok(Self {
            session: Arc::new(Session {
                client,
                address: options.address,
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Creates a client and connects it.
    pub async fn connected(options: ClientOptions) -> Result<Arc<Self>, StoreError> {
        let client = Self::new(options).await?;
        client.connect().await?;
        Ok(Arc::new(client))
    }

    /// Pings the server. Fails with [`StoreError::ServerUnavailable`] when it
    /// cannot be reached.
    #[instrument(skip(self), fields(address = %self.session.address))]
    pub async fn connect(&self) -> Result<(), StoreError> {
        if self.session.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ClientClosed);
        }
        self.session
            .client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                warn!("MongoDB did not answer ping: {}", e);
                match map_error(e) {
                    StoreError::Network(_) => StoreError::ServerUnavailable {
                        address: self.session.address.clone(),
                    },
                    other => other,
                }
            })?;
        self.session.connected.store(true, Ordering::SeqCst);
        info!("Connected to MongoDB");
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for MongoClient {
    fn is_connected(&self) -> bool {
        self.session.connected.load(Ordering::SeqCst) && !self.session.closed.load(Ordering::SeqCst)
    }

    fn collection(&self, database: &str, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(MongoCollection {
            session: self.session.clone(),
            collection: self.session.client.database(database).collection(name),
        })
    }

    #[instrument(skip(self), fields(address = %self.session.address))]
    async fn close(&self) -> Result<(), StoreError> {
        self.session.closed.store(true, Ordering::SeqCst);
        self.session.connected.store(false, Ordering::SeqCst);
        self.session.client.clone().shutdown().await;
        info!("MongoDB client closed");
        Ok(())
    }
}

// --- Collection ---

#[derive(Debug)]
pub struct MongoCollection {
    session: Arc<Session>,
    collection: Collection<BsonDocument>,
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn namespace(&self) -> String {
        self.collection.namespace().to_string()
    }

    #[instrument(skip(self, document))]
    async fn insert_one(&self, document: Document) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.collection.namespace(), "Inserting document into MongoDB");
        self.session.ensure_usable()?;
        self.collection
            .insert_one(to_bson(&document)?, None)
            .await
            .map_err(map_error)?;
        Ok(WriteResponse::acknowledged(1))
    }

    #[instrument(skip(self))]
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        debug!(namespace = %self.collection.namespace(), "Finding document in MongoDB");
        self.session.ensure_usable()?;
        let found = self
            .collection
            .find_one(to_bson(&filter.to_document())?, None)
            .await
            .map_err(map_error)?;
        found.map(from_bson).transpose()
    }

    #[instrument(skip(self, set))]
    async fn update_one(
        &self,
        filter: &Filter,
        set: Document,
    ) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.collection.namespace(), fields = set.len(), "Updating document in MongoDB");
        self.session.ensure_usable()?;
        let result = self
            .collection
            .update_one(to_bson(&filter.to_document())?, set_update(&set)?, None)
            .await
            .map_err(map_error)?;
        Ok(WriteResponse::acknowledged(result.matched_count))
    }

    #[instrument(skip(self))]
    async fn delete_one(&self, filter: &Filter) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.collection.namespace(), "Deleting document from MongoDB");
        self.session.ensure_usable()?;
        let result = self
            .collection
            .delete_one(to_bson(&filter.to_document())?, None)
            .await
            .map_err(map_error)?;
        Ok(WriteResponse::acknowledged(result.deleted_count))
    }

    #[instrument(skip(self))]
    async fn delete_many(&self, filter: &Filter) -> Result<WriteResponse, StoreError> {
        debug!(namespace = %self.collection.namespace(), "Deleting matching documents from MongoDB");
        self.session.ensure_usable()?;
        let result = self
            .collection
            .delete_many(to_bson(&filter.to_document())?, None)
            .await
            .map_err(map_error)?;
        Ok(WriteResponse::acknowledged(result.deleted_count))
    }
}

// --- Conversions ---

fn to_bson(document: &Document) -> Result<BsonDocument, StoreError> {
    bson::to_document(document)
        .map_err(|e| StoreError::Command(format!("document cannot be encoded as BSON: {}", e)))
}

/// Stored documents come back as relaxed extended JSON, so an `ObjectId`
/// reads as `{"$oid": "..."}`.
fn from_bson(document: BsonDocument) -> Result<Document, StoreError> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Command(format!(
            "store returned a non-document value: {}",
            other
        ))),
    }
}

fn set_update(set: &Document) -> Result<BsonDocument, StoreError> {
    let fields = to_bson(set)?;
    Ok(doc! { "$set": fields })
}

// --- Errors ---

/// What went wrong, independent of the driver's error representation.
#[derive(Debug, PartialEq)]
enum Failure {
    Auth(String),
    Unreachable(String),
    Rejected { code: i32, message: String },
    Other(String),
}

fn classify(err: &MongoError) -> Failure {
    match err.kind.as_ref() {
        ErrorKind::Authentication { message, .. } => Failure::Auth(message.clone()),
        ErrorKind::ServerSelection { message, .. } => Failure::Unreachable(message.clone()),
        ErrorKind::ConnectionPoolCleared { message, .. } => Failure::Unreachable(message.clone()),
        ErrorKind::Io(io) => Failure::Unreachable(io.to_string()),
        ErrorKind::Command(command) => Failure::Rejected {
            code: command.code,
            message: command.message.clone(),
        },
        ErrorKind::Write(WriteFailure::WriteError(write)) => Failure::Rejected {
            code: write.code,
            message: write.message.clone(),
        },
        _ => Failure::Other(err.to_string()),
    }
}

fn map_error(err: MongoError) -> StoreError {
    into_store_error(classify(&err))
}

fn into_store_error(failure: Failure) -> StoreError {
    match failure {
        Failure::Auth(message) => StoreError::Auth(message),
        Failure::Unreachable(message) => StoreError::Network(message),
        Failure::Rejected {
            code: DUPLICATE_KEY_CODE,
            message,
        } => {
            let (key, value) = parse_duplicate_key(&message);
            StoreError::DuplicateKey { key, value }
        }
        Failure::Rejected { code, message } => {
            StoreError::Command(format!("{} (code {})", message, code))
        }
        Failure::Other(message) => StoreError::Command(message),
    }
}

/// Pulls the offending key and value out of an E11000 message such as
/// `... index: rfid_1 dup key: { rfid: "one" }`. Falls back to the whole
/// message when it has another shape.
fn parse_duplicate_key(message: &str) -> (String, Value) {
    let parsed = message.split_once("dup key: {").and_then(|(_, rest)| {
        let body = rest.trim_end().strip_suffix('}')?.trim();
        let (key, value) = body.split_once(':')?;
        let value = value.trim();
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        Some((key.trim().to_string(), value))
    });
    parsed.unwrap_or_else(|| ("unknown".to_string(), Value::String(message.to_string())))
}
