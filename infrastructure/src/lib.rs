// Module declarations
pub mod config;
pub mod persistence;
pub mod telemetry;

// Re-export all implementations
pub use config::ClientOptions;
pub use persistence::{
    InMemoryClient, InMemoryCluster, InMemoryCollection, MongoClient, MongoCollection,
};
pub use telemetry::init_tracing;
