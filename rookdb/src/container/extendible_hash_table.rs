use log::debug;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Mutex};

/// An in-memory extendible hash table: a directory of `2^global_depth`
/// slots, each sharing a bucket that discriminates on its own `local_depth`
/// low hash bits. A full bucket splits locally; the directory doubles only
/// when the full bucket already uses every directory bit.
///
/// Operations are serialised by the table mutex; the per-bucket locks only
/// guard the shared bucket contents. The hasher is pluggable so tests can
/// pin hash values.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    inner: Mutex<Inner<K, V>>,
    hash_builder: S,
    bucket_capacity: usize,
}

struct Inner<K, V> {
    global_depth: usize,
    num_buckets: usize,
    dir: Vec<Arc<Mutex<Bucket<K, V>>>>,
}

struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            local_depth,
            items: Vec::new(),
        }
    }
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
{
    pub fn new(bucket_capacity: usize) -> Self {
        Self::with_hasher(bucket_capacity, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_capacity: usize, hash_builder: S) -> Self {
        assert!(bucket_capacity > 0, "bucket capacity must be positive");
        let inner = Inner {
            global_depth: 0,
            num_buckets: 1,
            dir: vec![Arc::new(Mutex::new(Bucket::new(0)))],
        };
        Self {
            inner: Mutex::new(inner),
            hash_builder,
            bucket_capacity,
        }
    }

    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let inner = self.inner.lock().unwrap();
        let bucket = inner.dir[self.index_of(&inner, key)].lock().unwrap();
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove(&self, key: &K) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut bucket = inner.dir[self.index_of(&inner, key)].lock().unwrap();
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(index) => {
                bucket.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Upsert: an existing key has its value replaced in place. While the
    /// target bucket is full, it is split (doubling the directory first when
    /// the bucket already discriminates on every directory bit) and the
    /// insert retried.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let index = self.index_of(&inner, &key);
            let bucket = Arc::clone(&inner.dir[index]);
            let mut bucket = bucket.lock().unwrap();
            if let Some((_, slot)) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                *slot = value;
                return;
            }
            if bucket.items.len() < self.bucket_capacity {
                bucket.items.push((key, value));
                return;
            }
            let local_depth = bucket.local_depth;
            drop(bucket);
            self.split_bucket(&mut inner, index, local_depth);
        }
    }

    pub fn global_depth(&self) -> usize {
        self.inner.lock().unwrap().global_depth
    }

    pub fn local_depth(&self, index: usize) -> usize {
        let inner = self.inner.lock().unwrap();
        let local_depth = inner.dir[index].lock().unwrap().local_depth;
        local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().unwrap().num_buckets
    }

    fn index_of(&self, inner: &Inner<K, V>, key: &K) -> usize {
        let mask = (1usize << inner.global_depth) - 1;
        self.hash_builder.hash_one(key) as usize & mask
    }

    fn split_bucket(&self, inner: &mut Inner<K, V>, index: usize, local_depth: usize) {
        if local_depth == inner.global_depth {
            let doubled = inner.dir.clone();
            inner.dir.extend(doubled);
            inner.global_depth += 1;
            debug!("directory doubled, global depth {}", inner.global_depth);
        }
        let high_bit = 1usize << local_depth;
        let old = Arc::clone(&inner.dir[index]);
        let zero = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));
        let one = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));
        {
            let mut old = old.lock().unwrap();
            let mut zero = zero.lock().unwrap();
            let mut one = one.lock().unwrap();
            for (key, value) in old.items.drain(..) {
                if self.hash_builder.hash_one(&key) as usize & high_bit != 0 {
                    one.items.push((key, value));
                } else {
                    zero.items.push((key, value));
                }
            }
        }
        for slot in 0..inner.dir.len() {
            if Arc::ptr_eq(&inner.dir[slot], &old) {
                inner.dir[slot] = if slot & high_bit != 0 {
                    Arc::clone(&one)
                } else {
                    Arc::clone(&zero)
                };
            }
        }
        inner.num_buckets += 1;
    }
}
