//! Concurrent open-addressing tables for edges and triangles.
//!
//! Linear probing with one mutex per slot. Keys are canonical: an edge is the
//! ordered pair (min, max) of its vertex handles, a triangle is its sorted
//! vertex triple.
//!
//! Concurrency contract: probing never inspects or writes a slot without
//! holding its lock, and the partition discipline guarantees no two threads
//! ever insert or remove the same key concurrently. Removal leaves a
//! tombstone; the coordinator calls `purge` between syncsteps once tombstones
//! accumulate, so probe chains stay short and an empty slot always exists.
//! Capacity is fixed after the single-threaded build phase (collapses only
//! rekey or remove entries, never grow the population).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::arena::Handle;

/// Maximum load factor before the build phase grows the table.
const MAX_LOAD: f64 = 0.7;

/// Canonical key for one of the hash tables.
pub(crate) trait TableKey: Copy + Eq {
    fn hash(&self) -> u64;
}

/// Canonical edge key: vertex pair with `k[0] < k[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EdgeKey(pub [u32; 2]);

impl EdgeKey {
    pub fn new(a: Handle, b: Handle) -> EdgeKey {
        let (a, b) = (a.raw(), b.raw());
        if a < b {
            EdgeKey([a, b])
        } else {
            EdgeKey([b, a])
        }
    }
}

impl TableKey for EdgeKey {
    fn hash(&self) -> u64 {
        mix(((self.0[0] as u64) << 32) | self.0[1] as u64)
    }
}

/// Canonical triangle key: sorted vertex triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TriKey(pub [u32; 3]);

impl TriKey {
    pub fn new(a: Handle, b: Handle, c: Handle) -> TriKey {
        let mut k = [a.raw(), b.raw(), c.raw()];
        k.sort_unstable();
        TriKey(k)
    }
}

impl TableKey for TriKey {
    fn hash(&self) -> u64 {
        mix(mix(((self.0[0] as u64) << 32) | self.0[1] as u64) ^ self.0[2] as u64)
    }
}

/// 64-bit finalizer (splitmix64).
#[inline]
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot<K> {
    Empty,
    Tombstone,
    Full(K, Handle),
}

/// Lock-per-slot open-addressing table.
pub(crate) struct Table<K: TableKey> {
    slots: Vec<Mutex<Slot<K>>>,
    mask: usize,
    len: usize,
    tombstones: AtomicUsize,
}

pub(crate) type EdgeTable = Table<EdgeKey>;
pub(crate) type TriTable = Table<TriKey>;

impl<K: TableKey> Table<K> {
    /// Create a table able to hold `expected` entries under the load cap.
    pub fn with_expected(expected: usize) -> Self {
        let wanted = ((expected.max(8) as f64 / MAX_LOAD) as usize).next_power_of_two();
        let mut slots = Vec::with_capacity(wanted);
        slots.resize_with(wanted, || Mutex::new(Slot::Empty));
        Self {
            slots,
            mask: wanted - 1,
            len: 0,
            tombstones: AtomicUsize::new(0),
        }
    }

    /// Live entry count as of the end of the build phase.
    pub fn build_len(&self) -> usize {
        self.len
    }

    /// Insert during the single-threaded build phase, growing as needed.
    /// Returns the previously mapped handle when the key already exists
    /// (the insert is then a no-op).
    pub fn insert_mut(&mut self, key: K, value: Handle) -> Option<Handle> {
        if (self.len + 1) as f64 > self.slots.len() as f64 * MAX_LOAD {
            self.grow();
        }
        let existing = self.insert(key, value);
        if existing.is_none() {
            self.len += 1;
        }
        existing
    }

    /// Insert. Writes only into an empty slot, decided while its lock is
    /// held, so concurrent inserts of distinct keys cannot collide.
    pub fn insert(&self, key: K, value: Handle) -> Option<Handle> {
        let mut i = key.hash() as usize & self.mask;
        let mut probes = 0usize;
        loop {
            let mut slot = self.slots[i].lock().unwrap();
            match *slot {
                Slot::Empty => {
                    *slot = Slot::Full(key, value);
                    return None;
                }
                Slot::Tombstone => {}
                Slot::Full(k, existing) => {
                    if k == key {
                        return Some(existing);
                    }
                }
            }
            drop(slot);
            i = (i + 1) & self.mask;
            probes += 1;
            debug_assert!(probes <= self.slots.len(), "hash table has no empty slot");
        }
    }

    /// Look up a key.
    pub fn lookup(&self, key: K) -> Option<Handle> {
        let mut i = key.hash() as usize & self.mask;
        loop {
            let slot = self.slots[i].lock().unwrap();
            match *slot {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Full(k, value) => {
                    if k == key {
                        return Some(value);
                    }
                }
            }
            drop(slot);
            i = (i + 1) & self.mask;
        }
    }

    /// Remove a key, returning its mapped handle.
    pub fn remove(&self, key: K) -> Option<Handle> {
        let mut i = key.hash() as usize & self.mask;
        loop {
            let mut slot = self.slots[i].lock().unwrap();
            match *slot {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Full(k, value) => {
                    if k == key {
                        *slot = Slot::Tombstone;
                        self.tombstones.fetch_add(1, Ordering::Relaxed);
                        return Some(value);
                    }
                }
            }
            drop(slot);
            i = (i + 1) & self.mask;
        }
    }

    /// Whether tombstones have accumulated enough to warrant a purge.
    pub fn needs_purge(&self) -> bool {
        self.tombstones.load(Ordering::Relaxed) * 8 >= self.slots.len()
    }

    /// Rebuild the table in place, dropping tombstones. Must only run while
    /// no worker touches the table (the syncstep barrier).
    pub fn purge(&self) {
        let mut entries: Vec<(K, Handle)> = Vec::new();
        for slot in &self.slots {
            let mut guard = slot.lock().unwrap();
            if let Slot::Full(k, v) = *guard {
                entries.push((k, v));
            }
            *guard = Slot::Empty;
        }
        self.tombstones.store(0, Ordering::Relaxed);
        for (k, v) in entries {
            self.insert(k, v);
        }
    }

    fn grow(&mut self) {
        let new_cap = self.slots.len() * 2;
        let mut new_slots: Vec<Mutex<Slot<K>>> = Vec::with_capacity(new_cap);
        new_slots.resize_with(new_cap, || Mutex::new(Slot::Empty));
        let new_mask = new_cap - 1;
        for slot in &mut self.slots {
            if let Slot::Full(key, value) = *slot.get_mut().unwrap() {
                let mut i = key.hash() as usize & new_mask;
                loop {
                    let dst = new_slots[i].get_mut().unwrap();
                    if matches!(*dst, Slot::Empty) {
                        *dst = Slot::Full(key, value);
                        break;
                    }
                    i = (i + 1) & new_mask;
                }
            }
        }
        self.slots = new_slots;
        self.mask = new_mask;
    }
}
