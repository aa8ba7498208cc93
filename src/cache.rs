//! 캐시 어사이드(cache-aside) 저장소
//!
//! 원본은 항상 데이터베이스이며, 쓰기 후에는 소유 컴포넌트가 `invalidate` 를 명시적으로 호출한다.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

pub struct CacheAside<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for CacheAside<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> CacheAside<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn put(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, value);
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_invalidate() {
        let cache: CacheAside<&str, i64> = CacheAside::new();
        assert_eq!(cache.get(&"a"), None);

        cache.put("a", 10);
        cache.put("b", 20);
        assert_eq!(cache.get(&"a"), Some(10));

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(20));

        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }
}
