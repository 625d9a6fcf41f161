// Module declarations
pub mod repository;
pub mod store;

use domain::DomainError;
use thiserror::Error;

// Re-export the repository and the driver interface it needs
pub use repository::{COLLECTION_NAME, DATABASE_NAME, EntryRepository};
pub use store::{
    Document, DocumentClient, DocumentCollection, Filter, StoreError, WriteResponse, WriteResult,
    is_acknowledged,
};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Client is not connected")]
    NotConnected,
    #[error(transparent)]
    Store(#[from] StoreError), // Driver errors pass through as-is
    #[error("Entry (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError),
}
