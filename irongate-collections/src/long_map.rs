/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Open-addressed `i64 -> i64` hash map.
//!
//! Keys and values live interleaved in a single flat array
//! (`[k0, v0, k1, v1, ...]`) with linear probing at a stride of one logical
//! slot. Removal shift-compacts the probe chain instead of leaving
//! tombstones, so probes always terminate at the first empty slot.
//!
//! An empty slot is represented by the caller-chosen `missing_value`
//! sentinel stored in the key cell. Storing `missing_value` as a *value* is
//! permitted, but `get` then cannot distinguish "present with sentinel" from
//! "absent" - callers that need the distinction must use `contains_key`.

/// Default initial capacity in logical slots.
const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Resize is triggered when `size > capacity * LOAD_FACTOR`.
const LOAD_FACTOR: f64 = 0.8;

/// Open-addressed `i64 -> i64` hash map with shift-compacting removal.
#[derive(Debug, Clone)]
pub struct Long2LongMap {
    /// Sentinel marking an empty key cell; also returned for missing keys.
    missing_value: i64,
    /// Capacity in logical slots; always a power of two.
    capacity: usize,
    /// Mask over raw cell indexes (`capacity * 2 - 1`).
    mask: usize,
    /// Number of live entries.
    size: usize,
    /// Resize threshold derived from the load factor.
    resize_threshold: usize,
    /// Interleaved key/value cells.
    entries: Vec<i64>,
}

impl Long2LongMap {
    /// Creates a map with the default initial capacity.
    ///
    /// # Arguments
    /// * `missing_value` - Sentinel returned by [`get`](Self::get) for
    ///   missing keys; must never be used as a key
    #[must_use]
    pub fn new(missing_value: i64) -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY, missing_value)
    }

    /// Creates a map sized for at least `initial_capacity` logical slots.
    #[must_use]
    pub fn with_capacity(initial_capacity: usize, missing_value: i64) -> Self {
        let capacity = initial_capacity.next_power_of_two().max(2);
        let mut map = Self {
            missing_value,
            capacity: 0,
            mask: 0,
            size: 0,
            resize_threshold: 0,
            entries: Vec::new(),
        };
        map.allocate(capacity);
        map
    }

    /// Returns the number of entries in the map.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the map holds no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the sentinel value configured for this map.
    #[inline]
    #[must_use]
    pub const fn missing_value(&self) -> i64 {
        self.missing_value
    }

    /// Returns the current capacity in logical slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up the value for `key`.
    ///
    /// # Returns
    /// The stored value, or the `missing_value` sentinel if absent.
    #[must_use]
    pub fn get(&self, key: i64) -> i64 {
        let mut index = self.hash(key);

        loop {
            let candidate = self.entries[index];
            if candidate == self.missing_value {
                return self.missing_value;
            }
            if candidate == key {
                return self.entries[index + 1];
            }
            index = self.next(index);
        }
    }

    /// Inserts `value` under `key`.
    ///
    /// # Returns
    /// The previous value for `key`, or the `missing_value` sentinel if the
    /// key was absent.
    pub fn put(&mut self, key: i64, value: i64) -> i64 {
        debug_assert!(key != self.missing_value, "key equals the missing sentinel");

        let mut old_value = self.missing_value;
        let mut index = self.hash(key);

        loop {
            let candidate = self.entries[index];
            if candidate == self.missing_value {
                break;
            }
            if candidate == key {
                old_value = self.entries[index + 1];
                break;
            }
            index = self.next(index);
        }

        if old_value == self.missing_value {
            self.size += 1;
            self.entries[index] = key;
        }
        self.entries[index + 1] = value;

        if self.size > self.resize_threshold {
            self.rehash(self.capacity << 1);
        }

        old_value
    }

    /// Removes `key` from the map, shift-compacting the probe chain.
    ///
    /// # Returns
    /// The removed value, or the `missing_value` sentinel if the key was
    /// absent.
    pub fn remove(&mut self, key: i64) -> i64 {
        let mut index = self.hash(key);

        loop {
            let candidate = self.entries[index];
            if candidate == self.missing_value {
                return self.missing_value;
            }
            if candidate == key {
                let old_value = self.entries[index + 1];
                self.entries[index] = self.missing_value;
                self.entries[index + 1] = self.missing_value;
                self.size -= 1;

                self.compact_chain(index);

                return old_value;
            }
            index = self.next(index);
        }
    }

    /// Returns true if `key` maps to a non-sentinel value.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key) != self.missing_value
    }

    /// Returns true if any entry holds `value`.
    #[must_use]
    pub fn contains_value(&self, value: i64) -> bool {
        self.entries
            .chunks_exact(2)
            .any(|cell| cell[0] != self.missing_value && cell[1] == value)
    }

    /// Removes all entries without releasing capacity.
    pub fn clear(&mut self) {
        self.entries.fill(self.missing_value);
        self.size = 0;
    }

    /// Calls `f` for every `(key, value)` pair.
    ///
    /// Iteration order is unspecified but stable between mutations.
    pub fn for_each(&self, mut f: impl FnMut(i64, i64)) {
        for cell in self.entries.chunks_exact(2) {
            if cell[0] != self.missing_value {
                f(cell[0], cell[1]);
            }
        }
    }

    /// Iterates over `(key, value)` pairs.
    ///
    /// Iteration order is unspecified but stable between mutations.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.entries
            .chunks_exact(2)
            .filter(|cell| cell[0] != self.missing_value)
            .map(|cell| (cell[0], cell[1]))
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Iterates over the values.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Maps a key to its natural home cell index. Always even: the mix ends
    /// in a left shift, so the low bit is clear before masking.
    #[inline]
    fn hash(&self, key: i64) -> usize {
        let folded = (key as i32) ^ ((key as u64 >> 32) as i32);
        let mixed = folded.wrapping_shl(1).wrapping_sub(folded.wrapping_shl(8));
        (mixed as usize) & self.mask
    }

    /// Advances a cell index by one logical slot, wrapping at capacity.
    #[inline]
    const fn next(&self, index: usize) -> usize {
        (index + 2) & self.mask
    }

    fn allocate(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.resize_threshold = (capacity as f64 * LOAD_FACTOR) as usize;
        self.mask = capacity * 2 - 1;
        self.entries = vec![self.missing_value; capacity * 2];
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_entries = std::mem::take(&mut self.entries);
        self.allocate(new_capacity);
        self.size = 0;

        for cell in old_entries.chunks_exact(2) {
            if cell[0] != self.missing_value {
                self.put(cell[0], cell[1]);
            }
        }
    }

    /// Walks forward from a freshly emptied slot, moving back any entry
    /// whose natural home lies within the wrapped range
    /// `(delete_index, current_index]`.
    fn compact_chain(&mut self, mut delete_index: usize) {
        let mut index = delete_index;

        loop {
            index = self.next(index);
            if self.entries[index] == self.missing_value {
                return;
            }

            let hash = self.hash(self.entries[index]);

            if (index < hash && (hash <= delete_index || delete_index <= index))
                || (hash <= delete_index && delete_index <= index)
            {
                self.entries[delete_index] = self.entries[index];
                self.entries[delete_index + 1] = self.entries[index + 1];

                self.entries[index] = self.missing_value;
                self.entries[index + 1] = self.missing_value;
                delete_index = index;
            }
        }
    }
}
