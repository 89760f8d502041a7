//! Exercises MemoryStore through the `StoreAdapter` trait object, the way the tier chain uses it.

use std::sync::Arc;
use std::time::Duration;

use relay_storage::{MemoryStore, StoreAdapter, StoreLookup};

fn adapter(max_entries: usize) -> Arc<dyn StoreAdapter> {
    Arc::new(MemoryStore::new(max_entries))
}

#[tokio::test]
async fn concurrent_writers_keep_last_value_per_key() {
    let store = adapter(1_000);

    let mut handles = Vec::new();
    for writer in 0..8u8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50u8 {
                let key = format!("item:{i}");
                store
                    .set(&key, Arc::new(vec![writer, i]), Duration::from_secs(60))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.entry_count().await.unwrap(), 50);
    for i in 0..50u8 {
        let value = store
            .get(&format!("item:{i}"))
            .await
            .unwrap()
            .into_payload()
            .expect("every key written");
        assert_eq!(value[1], i);
    }
}

#[tokio::test]
async fn expiry_is_reported_once_then_miss() {
    let store = adapter(10);
    store
        .set("market:eu", Arc::new(b"prices".to_vec()), Duration::from_millis(10))
        .await
        .unwrap();

    assert!(matches!(
        store.get("market:eu").await.unwrap(),
        StoreLookup::Hit(_)
    ));

    tokio::time::sleep(Duration::from_millis(25)).await;

    assert!(matches!(
        store.get("market:eu").await.unwrap(),
        StoreLookup::Expired
    ));
    assert!(matches!(
        store.get("market:eu").await.unwrap(),
        StoreLookup::Miss
    ));
    assert_eq!(store.backend(), "memory");
}
