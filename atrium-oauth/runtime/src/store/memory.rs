use super::Store;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// A [`Store`] kept in process memory. Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore<K, V> {
    store: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self { store: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Debug + Eq + Hash + Send + Sync + 'static,
    V: Debug + Clone + Send + Sync + 'static,
{
    type Error = Infallible;

    async fn get(&self, key: &K) -> Result<Option<V>, Self::Error> {
        Ok(self.store.read().expect("lock should never be poisoned").get(key).cloned())
    }
    async fn set(&self, key: K, value: V) -> Result<(), Self::Error> {
        self.store.write().expect("lock should never be poisoned").insert(key, value);
        Ok(())
    }
    async fn del(&self, key: &K) -> Result<(), Self::Error> {
        self.store.write().expect("lock should never be poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::<String, u32>::default();
        assert_eq!(store.get(&String::from("a")).await.expect("failed to get"), None);
        store.set(String::from("a"), 1).await.expect("failed to set");
        store.set(String::from("a"), 2).await.expect("failed to set");
        assert_eq!(store.get(&String::from("a")).await.expect("failed to get"), Some(2));
        // clones share the same map
        let cloned = store.clone();
        cloned.del(&String::from("a")).await.expect("failed to del");
        assert_eq!(store.get(&String::from("a")).await.expect("failed to get"), None);
        // deleting an absent key is not an error
        store.del(&String::from("b")).await.expect("failed to del");
    }
}
