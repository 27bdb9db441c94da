//! Sharded lock table giving per-key writer discipline.
//!
//! Keys hash onto independent shards, each behind its own short-lived lock.
//! Closures passed to [`ShardedMap::with`] run under the shard lock and must
//! never await or call back into user code.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;
use parking_lot::Mutex;

/// Powers of 2 work best for the index mask.
const SHARD_COUNT: usize = 32;

pub(crate) type Shard<K, V> = HashMap<K, V, RandomState>;

pub(crate) struct ShardedMap<K, V> {
    shards: Box<[Mutex<Shard<K, V>>]>,
    hasher: RandomState,
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    pub(crate) fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::with_hasher(RandomState::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) & (SHARD_COUNT - 1)
    }

    /// Runs `f` with exclusive access to the shard owning `key`.
    #[inline]
    pub(crate) fn with<R>(&self, key: &K, f: impl FnOnce(&mut Shard<K, V>) -> R) -> R {
        let mut shard = self.shards[self.shard_index(key)].lock();
        f(&mut shard)
    }

    /// Visits every shard in turn, locking one at a time.
    pub(crate) fn for_each_shard(&self, mut f: impl FnMut(&mut Shard<K, V>)) {
        for shard in self.shards.iter() {
            f(&mut shard.lock());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

impl<K: Eq + Hash, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_land_in_a_stable_shard() {
        let map: ShardedMap<String, u32> = ShardedMap::new();
        for i in 0..100 {
            map.with(&format!("key-{}", i), |shard| {
                shard.insert(format!("key-{}", i), i);
            });
        }
        assert_eq!(map.len(), 100);

        let found = map.with(&"key-42".to_string(), |shard| shard.get("key-42").copied());
        assert_eq!(found, Some(42));
    }

    #[test]
    fn for_each_shard_can_clear() {
        let map: ShardedMap<u64, u64> = ShardedMap::new();
        for i in 0..64 {
            map.with(&i, |shard| shard.insert(i, i));
        }
        map.for_each_shard(|shard| shard.clear());
        assert_eq!(map.len(), 0);
    }
}
