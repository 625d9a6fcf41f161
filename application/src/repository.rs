use crate::ApplicationError;
use crate::store::{
    Document, DocumentClient, DocumentCollection, Filter, WriteResponse, is_acknowledged,
};
use domain::{Entry, EntryField, EntryPatch, Rfid};
use serde::ser::Error as _;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Logical database holding the entries.
pub const DATABASE_NAME: &str = "main";
/// Collection holding the entries.
pub const COLLECTION_NAME: &str = "mainColl";

/// Access-control entries stored in a document store, keyed by RFID.
///
/// Holds no state about entries between calls. Store failures are returned
/// as [`ApplicationError::Store`] without retry or translation.
pub struct EntryRepository {
    client: Arc<dyn DocumentClient>,
    collection: Arc<dyn DocumentCollection>,
}

impl EntryRepository {
    /// Wraps an already connected client. Fails if the client reports it is
    /// not connected.
    pub fn new(client: Arc<dyn DocumentClient>) -> Result<Self, ApplicationError> {
        if !client.is_connected() {
            warn!("Refusing to build entry repository on a disconnected client");
            return Err(ApplicationError::NotConnected);
        }
        let collection = client.collection(DATABASE_NAME, COLLECTION_NAME);
        debug!(namespace = %collection.namespace(), "Entry repository ready");
        Ok(Self { client, collection })
    }

    /// Inserts `entry`. Returns whether the store acknowledged the insert.
    #[instrument(skip(self, entry), fields(rfid = %entry.rfid))]
    pub async fn add(&self, entry: &Entry) -> Result<bool, ApplicationError> {
        let document = entry_to_document(entry)?;
        let response = self.collection.insert_one(document).await?;
        Ok(acknowledge("add", &response))
    }

    /// Deletes the entry with `rfid`.
    ///
    /// `true` only means the delete completed; it is also returned when no
    /// entry matched.
    #[instrument(skip(self, rfid), fields(rfid = %rfid))]
    pub async fn remove(&self, rfid: &Rfid) -> Result<bool, ApplicationError> {
        let response = self.collection.delete_one(&key_filter(rfid)).await?;
        Ok(acknowledge("remove", &response))
    }

    /// Applies `patch` to the entry with `rfid`. Patching the RFID itself
    /// re-keys the entry.
    ///
    /// Like [`remove`](Self::remove), `true` is returned even when no entry
    /// matched.
    #[instrument(skip(self, rfid, patch), fields(rfid = %rfid))]
    pub async fn edit(&self, rfid: &Rfid, patch: &EntryPatch) -> Result<bool, ApplicationError> {
        let set = patch.to_document();
        debug!(fields = set.len(), "Sending partial update");
        let response = self.collection.update_one(&key_filter(rfid), set).await?;
        Ok(acknowledge("edit", &response))
    }

    /// [`edit`](Self::edit) with an untyped patch. Keys that are not entry
    /// fields are rejected before anything reaches the store.
    pub async fn edit_document(
        &self,
        rfid: &Rfid,
        patch: &Document,
    ) -> Result<bool, ApplicationError> {
        let patch = EntryPatch::from_document(patch)?;
        self.edit(rfid, &patch).await
    }

    /// Looks up the entry with `rfid`. `None` when nothing matches.
    #[instrument(skip(self, rfid), fields(rfid = %rfid))]
    pub async fn get(&self, rfid: &Rfid) -> Result<Option<Entry>, ApplicationError> {
        match self.collection.find_one(&key_filter(rfid)).await? {
            Some(document) => {
                let entry = serde_json::from_value(Value::Object(document))?;
                debug!("Entry found");
                Ok(Some(entry))
            }
            None => {
                debug!("Entry not found");
                Ok(None)
            }
        }
    }

    /// Deletes every entry in the collection.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<bool, ApplicationError> {
        info!(namespace = %self.collection.namespace(), "Clearing all entries");
        let response = self.collection.delete_many(&Filter::all()).await?;
        Ok(acknowledge("clear", &response))
    }

    /// Closes the underlying client. Any other holder of the same client
    /// loses its connection too.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<(), ApplicationError> {
        self.client.close().await?;
        info!("Entry repository closed");
        Ok(())
    }
}

fn key_filter(rfid: &Rfid) -> Filter {
    Filter::eq(EntryField::Rfid.as_str(), rfid.as_str())
}

fn entry_to_document(entry: &Entry) -> Result<Document, ApplicationError> {
    match serde_json::to_value(entry)? {
        Value::Object(document) => Ok(document),
        other => Err(ApplicationError::Serialization(serde_json::Error::custom(
            format!("entry serialized to a non-object value: {}", other),
        ))),
    }
}

fn acknowledge(operation: &'static str, response: &WriteResponse) -> bool {
    let acknowledged = is_acknowledged(response);
    if acknowledged {
        debug!(operation, affected = ?response.affected(), "Store acknowledged write");
    } else {
        warn!(operation, result = ?response.result, "Store did not acknowledge write");
    }
    acknowledged
}
