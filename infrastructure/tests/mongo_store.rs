//! Runs the repository against a live MongoDB server. Ignored by default;
//! start a server and run with `--ignored` (address from ENTRY_STORE_ADDRESS).

use application::{EntryRepository, StoreError};
use domain::{AccessLevel, Entry, EntryPatch, Rfid};
use infrastructure::{ClientOptions, MongoClient, init_tracing};

async fn repository() -> EntryRepository {
    init_tracing();
    let options = ClientOptions::from_env().with_app_name("entry-store-live-tests");
    let client = MongoClient::connected(options).await.unwrap();
    EntryRepository::new(client).unwrap()
}

#[tokio::test]
#[ignore = "needs a MongoDB server"]
async fn entry_lifecycle_against_live_server() {
    let repo = repository().await;
    assert!(repo.clear().await.unwrap());

    let entry = Entry::new("live-one", "John Doe", AccessLevel::Basic);
    assert!(repo.add(&entry).await.unwrap());
    assert_eq!(repo.get(&Rfid::new("live-one")).await.unwrap(), Some(entry));

    let patch = EntryPatch::new().with_access_level(AccessLevel::None);
    assert!(repo.edit(&Rfid::new("live-one"), &patch).await.unwrap());
    let edited = repo.get(&Rfid::new("live-one")).await.unwrap().unwrap();
    assert_eq!(edited.access_level, AccessLevel::None);

    assert!(repo.remove(&Rfid::new("live-one")).await.unwrap());
    assert_eq!(repo.get(&Rfid::new("live-one")).await.unwrap(), None);

    // Zero-match writes are still acknowledged.
    assert!(repo.remove(&Rfid::new("live-one")).await.unwrap());
    assert!(repo.clear().await.unwrap());
    repo.close().await.unwrap();
}

#[tokio::test]
#[ignore = "waits for server selection to time out"]
async fn unreachable_server_fails_to_connect() {
    let options = ClientOptions::new("localhost:1337/?serverSelectionTimeoutMS=500");
    let err = MongoClient::connected(options).await.unwrap_err();
    assert!(matches!(err, StoreError::ServerUnavailable { .. }));
}
