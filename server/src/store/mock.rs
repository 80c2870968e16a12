use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};

use crate::errors::StoreError;
use crate::store::Store;

/// An in-memory store for tests.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) map: RwLock<HashMap<String, Vec<u8>>>,
}

impl Store for MockStore {
    type Output = ();
    type Raw = Vec<u8>;

    fn delete(&self, key: &str) -> BoxFuture<Result<(), StoreError>> {
        let key = key.to_owned();

        async move {
            self.map.write().unwrap().remove(&key);

            Ok(())
        }
        .boxed()
    }

    fn save(&self, key: &str, raw: Vec<u8>) -> BoxFuture<Result<(), StoreError>> {
        let key = key.to_owned();

        async move {
            self.map.write().unwrap().insert(key, raw);

            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_delete_round_trip() {
        let store = MockStore::default();

        store.save("a.jpg", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.map.read().unwrap().get("a.jpg"), Some(&vec![1, 2, 3]));

        store.delete("a.jpg").await.unwrap();
        store.delete("a.jpg").await.unwrap();
        assert!(store.map.read().unwrap().is_empty());
    }
}
