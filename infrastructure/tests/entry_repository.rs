use application::{ApplicationError, COLLECTION_NAME, DATABASE_NAME, EntryRepository, StoreError};
use domain::{AccessLevel, Entry, EntryField, EntryPatch, Rfid};
use infrastructure::{ClientOptions, InMemoryClient, InMemoryCluster, init_tracing};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Asserts that `received` and `expected` agree on the given stored fields,
/// ignoring anything else the store keeps alongside them.
fn assert_fields_match(received: &Entry, expected: &Entry, fields: &[EntryField]) {
    let pick = |entry: &Entry| -> Map<String, Value> {
        let Value::Object(map) = serde_json::to_value(entry).unwrap() else {
            panic!("entry did not serialize to an object");
        };
        map.into_iter()
            .filter(|(key, _)| fields.iter().any(|f| f.as_str() == key))
            .collect()
    };
    assert_eq!(pick(received), pick(expected), "fields {:?} differ", fields);
}

fn entries() -> Vec<Entry> {
    vec![
        Entry::new("one", "John Doe", AccessLevel::Basic),
        Entry::new("two", "Mister Bread", AccessLevel::Full),
        Entry::new("three", "Please Change Name", AccessLevel::Basic),
    ]
}

async fn connect(cluster: &Arc<InMemoryCluster>) -> EntryRepository {
    init_tracing();
    let client = InMemoryClient::connected(cluster.clone(), ClientOptions::default())
        .await
        .unwrap();
    EntryRepository::new(client).unwrap()
}

/// Repository over a fresh store, seeded with [`entries`].
async fn seeded() -> (Arc<InMemoryCluster>, EntryRepository) {
    let cluster = InMemoryCluster::new("localhost:27017");
    let repo = connect(&cluster).await;
    for entry in entries() {
        assert!(repo.add(&entry).await.unwrap());
    }
    (cluster, repo)
}

#[tokio::test]
async fn connect_and_close() {
    let cluster = InMemoryCluster::new("localhost:27017");
    let repo = connect(&cluster).await;
    assert!(repo.close().await.is_ok());
}

#[tokio::test]
async fn disconnected_client_is_rejected() {
    let cluster = InMemoryCluster::new("localhost:27017");
    let client = Arc::new(InMemoryClient::new(
        cluster,
        ClientOptions::new("localhost:1337"),
    ));
    assert!(client.connect().await.is_err());

    for _ in 0..3 {
        let err = EntryRepository::new(client.clone()).err().unwrap();
        assert!(matches!(err, ApplicationError::NotConnected));
        assert_eq!(err.to_string(), "Client is not connected");
    }
}

#[tokio::test]
async fn get_returns_added_entries() {
    let (_cluster, repo) = seeded().await;
    for entry in entries() {
        let received = repo.get(&entry.rfid).await.unwrap().unwrap();
        assert_fields_match(&received, &entry, &EntryField::ALL);
    }
}

#[tokio::test]
async fn get_unknown_rfid_is_none() {
    let (_cluster, repo) = seeded().await;
    assert_eq!(repo.get(&Rfid::new("never-added")).await.unwrap(), None);
}

#[tokio::test]
async fn remove_acknowledges_with_and_without_match() {
    let (cluster, repo) = seeded().await;
    for entry in entries() {
        assert!(repo.remove(&entry.rfid).await.unwrap());
    }
    assert_eq!(cluster.count_documents(DATABASE_NAME, COLLECTION_NAME).await, 0);

    // Nothing left to match, still acknowledged.
    assert!(repo.remove(&Rfid::new("one")).await.unwrap());
    assert!(repo.remove(&Rfid::new("never-added")).await.unwrap());
}

#[tokio::test]
async fn edit_applies_partial_patches() {
    let (_cluster, repo) = seeded().await;
    let patches = [
        EntryPatch::new().with_rfid("changedrfid"),
        EntryPatch::new().with_access_level(AccessLevel::None),
        EntryPatch::new().with_name("changedname"),
    ];
    let after = [
        Entry::new("changedrfid", "John Doe", AccessLevel::Basic),
        Entry::new("two", "Mister Bread", AccessLevel::None),
        Entry::new("three", "changedname", AccessLevel::Basic),
    ];

    for ((entry, patch), expected) in entries().iter().zip(&patches).zip(&after) {
        assert!(repo.edit(&entry.rfid, patch).await.unwrap());
        let received = repo.get(&expected.rfid).await.unwrap().unwrap();
        assert_fields_match(&received, expected, &EntryField::ALL);
    }
}

#[tokio::test]
async fn edit_rfid_rekeys_entry() {
    let (_cluster, repo) = seeded().await;
    let old = Rfid::new("one");
    assert!(
        repo.edit(&old, &EntryPatch::new().with_rfid("new"))
            .await
            .unwrap()
    );

    let renamed = repo.get(&Rfid::new("new")).await.unwrap().unwrap();
    assert_eq!(renamed.name, "John Doe");
    assert_eq!(repo.get(&old).await.unwrap(), None);
}

#[tokio::test]
async fn edit_without_match_is_acknowledged() {
    let (cluster, repo) = seeded().await;
    let patch = EntryPatch::new().with_name("ghost");
    assert!(repo.edit(&Rfid::new("never-added"), &patch).await.unwrap());
    assert_eq!(cluster.count_documents(DATABASE_NAME, COLLECTION_NAME).await, 3);
}

#[tokio::test]
async fn clear_removes_everything() {
    let (_cluster, repo) = seeded().await;
    assert!(repo.clear().await.unwrap());
    for entry in entries() {
        assert_eq!(repo.get(&entry.rfid).await.unwrap(), None);
    }
    // Clearing an empty collection is still acknowledged.
    assert!(repo.clear().await.unwrap());
}

#[tokio::test]
async fn remove_one_of_three() {
    let (_cluster, repo) = seeded().await;
    assert!(repo.remove(&Rfid::new("two")).await.unwrap());

    assert_eq!(repo.get(&Rfid::new("two")).await.unwrap(), None);
    let expected = entries();
    for entry in [&expected[0], &expected[2]] {
        let received = repo.get(&entry.rfid).await.unwrap().unwrap();
        assert_fields_match(&received, entry, &EntryField::ALL);
    }
}

#[tokio::test]
async fn duplicate_rfid_behaviour_is_up_to_the_store() {
    // Without a unique index the store accepts duplicates.
    let (_cluster, repo) = seeded().await;
    assert!(repo.add(&entries()[0]).await.unwrap());

    // With one, the store's error comes back as-is.
    let cluster = InMemoryCluster::new("localhost:27017");
    cluster
        .create_unique_index(DATABASE_NAME, COLLECTION_NAME, EntryField::Rfid.as_str())
        .await
        .unwrap();
    let repo = connect(&cluster).await;
    assert!(repo.add(&entries()[0]).await.unwrap());
    let err = repo.add(&entries()[0]).await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Store(StoreError::DuplicateKey { ref key, .. }) if key == "rfid"
    ));
}

#[tokio::test]
async fn store_outage_propagates() {
    let (cluster, repo) = seeded().await;
    cluster.shutdown();

    let err = repo.get(&Rfid::new("one")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Store(StoreError::Network(_))));

    cluster.restart();
    assert!(repo.get(&Rfid::new("one")).await.unwrap().is_some());
}

#[tokio::test]
async fn close_affects_repositories_sharing_the_client() {
    let cluster = InMemoryCluster::new("localhost:27017");
    let client = InMemoryClient::connected(cluster, ClientOptions::default())
        .await
        .unwrap();
    let first = EntryRepository::new(client.clone()).unwrap();
    let second = EntryRepository::new(client.clone()).unwrap();
    assert!(first.add(&entries()[0]).await.unwrap());

    first.close().await.unwrap();

    let err = second.get(&Rfid::new("one")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Store(StoreError::ClientClosed)));
    assert!(matches!(
        EntryRepository::new(client),
        Err(ApplicationError::NotConnected)
    ));
}
