use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::ca::Leaf;

/// Bounded, LRU-evicted cache of minted leaf certificates, keyed by
/// lowercased hostname.
pub struct LeafCache {
    store: Mutex<LruCache<String, Arc<Leaf>>>,
}

impl LeafCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LeafCache {
            store: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, hostname: &str) -> Option<Arc<Leaf>> {
        self.store.lock().get(hostname).cloned()
    }

    pub fn insert(&self, hostname: String, leaf: Arc<Leaf>) {
        self.store.lock().put(hostname, leaf);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;

    fn dummy_leaf() -> Arc<Leaf> {
        Arc::new(Leaf {
            chain: vec![],
            key: rustls::pki_types::PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0u8; 1])),
        })
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let cache = LeafCache::new(2);
        cache.insert("a.com".into(), dummy_leaf());
        cache.insert("b.com".into(), dummy_leaf());
        cache.insert("c.com".into(), dummy_leaf());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a.com").is_none());
        assert!(cache.get("b.com").is_some());
        assert!(cache.get("c.com").is_some());
    }

    #[test]
    fn recently_used_entry_survives_eviction() {
        let cache = LeafCache::new(2);
        cache.insert("a.com".into(), dummy_leaf());
        cache.insert("b.com".into(), dummy_leaf());
        cache.get("a.com");
        cache.insert("c.com".into(), dummy_leaf());

        assert!(cache.get("a.com").is_some());
        assert!(cache.get("b.com").is_none());
    }
}
