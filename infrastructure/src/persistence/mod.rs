pub mod in_memory_store;
pub mod mongo_store;

// Re-export the driver types
pub use in_memory_store::{ID_KEY, InMemoryClient, InMemoryCluster, InMemoryCollection};
pub use mongo_store::{MongoClient, MongoCollection, connection_uri};
