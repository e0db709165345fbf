use ahash::RandomState;
use bytes::Bytes;
use hashbrown::HashTable;

static HASHER: RandomState = RandomState::with_seeds(1, 2, 3, 4);

/// Calculate hash for a key using stable ahash seeds.
#[inline(always)]
pub fn calculate_hash(key: &[u8]) -> u64 {
    HASHER.hash_one(key)
}

/// Keyed dictionary used for the value map and the expiry map.
///
/// Entries live in a dense slot vector; a hashbrown `HashTable` maps key
/// hashes to slot positions. Removal swaps the last slot into the hole, so
/// the slots stay contiguous and a uniformly random key can be picked in
/// O(1), which the expiry and eviction samplers rely on.
pub struct Dict<V> {
    index: HashTable<usize>,
    slots: Vec<(Bytes, V)>,
}

impl<V> Default for Dict<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Dict<V> {
    pub fn new() -> Self {
        Self {
            index: HashTable::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    fn position(&self, key: &[u8]) -> Option<usize> {
        let slots = &self.slots;
        self.index
            .find(calculate_hash(key), |&i| slots[i].0.as_ref() == key)
            .copied()
    }

    #[inline]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.position(key).is_some()
    }

    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.position(key).map(|i| &self.slots[i].1)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        self.position(key).map(|i| &mut self.slots[i].1)
    }

    /// Insert a value, returning the previous one if the key was present.
    pub fn insert(&mut self, key: Bytes, value: V) -> Option<V> {
        if let Some(i) = self.position(&key) {
            return Some(std::mem::replace(&mut self.slots[i].1, value));
        }

        let hash = calculate_hash(&key);
        let pos = self.slots.len();
        let slots = &self.slots;
        self.index
            .insert_unique(hash, pos, |&i| calculate_hash(&slots[i].0));
        self.slots.push((key, value));
        None
    }

    /// Remove a key and return its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let slots = &self.slots;
        let pos = match self
            .index
            .find_entry(calculate_hash(key), |&i| slots[i].0.as_ref() == key)
        {
            Ok(entry) => entry.remove().0,
            Err(_) => return None,
        };

        let last = self.slots.len() - 1;
        if pos != last {
            // Repoint the index entry of the slot that is about to move.
            let moved_hash = calculate_hash(&self.slots[last].0);
            if let Some(i) = self.index.find_mut(moved_hash, |&i| i == last) {
                *i = pos;
            }
        }
        Some(self.slots.swap_remove(pos).1)
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
    }

    /// Key and value at a slot position, if in range.
    #[inline]
    pub fn slot(&self, pos: usize) -> Option<(&Bytes, &V)> {
        self.slots.get(pos).map(|(k, v)| (k, v))
    }

    /// A uniformly random entry, or None when empty.
    #[inline]
    pub fn random_slot(&self) -> Option<(&Bytes, &V)> {
        if self.slots.is_empty() {
            return None;
        }
        self.slot(fastrand::usize(..self.slots.len()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> {
        self.slots.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.slots.iter().map(|(k, _)| k)
    }
}
