//! Fixed-capacity result cache keyed by payload digest, with strict LRU eviction.
//!
//! Each [`HashKey`] maps to a [`CacheEntry`] that moves through
//! `Pending → Success | Error`. Every `get`, `put` and `reserve` counts as an
//! access; when an insertion pushes the store past capacity exactly one
//! least-recently-accessed entry is evicted.
//!
//! The cache does no locking of its own. Owners that share it across tasks
//! wrap it in a mutex so that [`ContentAddressedCache::reserve`] acts as an
//! atomic check-and-reserve.
//!
//! A reservation is tracked until [`ContentAddressedCache::complete`] is
//! called with its [`ReservationId`], even if capacity pressure evicts the
//! `Pending` entry in the meantime. Resubmitting such a key restores the
//! `Pending` entry instead of handing out a second reservation, and a
//! completion for an evicted entry is dropped. A terminal entry is therefore
//! only ever written once per residency.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::HashKey;
use crate::error::Result;

/// Lifecycle state of a job, as seen through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Never submitted, or evicted.
    #[serde(rename = "notFound")]
    NotFound,
    /// Reserved; the background job has not finished yet.
    #[serde(rename = "inProgress")]
    Pending,
    /// Terminal: a validated value is stored.
    #[serde(rename = "success")]
    Success,
    /// Terminal: generation gave up.
    #[serde(rename = "error")]
    Error,
}

impl JobStatus {
    /// `Success` and `Error` are never left under normal operation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// A status plus the value stored with it.
///
/// Handed out by value so callers can never mutate the cached copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub status: JobStatus,
    pub value: Option<V>,
}

impl<V> CacheEntry<V> {
    pub fn not_found() -> Self {
        Self {
            status: JobStatus::NotFound,
            value: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            value: None,
        }
    }
}

/// Token proving ownership of a `Pending` reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Outcome of [`ContentAddressedCache::reserve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation<V> {
    /// The key was absent and now holds a `Pending` entry owned by the caller,
    /// who must finish it with [`ContentAddressedCache::complete`].
    Reserved(ReservationId),
    /// The key was already present, or still has an unfinished reservation.
    Existing(CacheEntry<V>),
}

#[derive(Debug)]
struct Slot<V> {
    entry: CacheEntry<V>,
    accessed_at: u64,
    reservation: Option<ReservationId>,
}

/// Content-addressed cache with strict LRU eviction.
#[derive(Debug)]
pub struct ContentAddressedCache<V> {
    entries: HashMap<HashKey, Slot<V>>,
    /// Reservations not yet completed, resident or not.
    in_flight: HashMap<HashKey, ReservationId>,
    capacity: usize,
    /// Monotonic access counter; wall-clock time is too coarse for strict LRU.
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> ContentAddressedCache<V> {
    /// Create an empty cache. `capacity` is clamped to a minimum of 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Deterministic key for a serializable payload.
    pub fn hash<T: Serialize + ?Sized>(payload: &T) -> Result<HashKey> {
        HashKey::from_payload(payload)
    }

    /// Look up `key`, marking it most recently used on hit.
    ///
    /// Returns a `NotFound` entry for keys never written or already evicted.
    pub fn get(&mut self, key: &HashKey) -> CacheEntry<V> {
        let now = self.tick();
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.accessed_at = now;
                self.hits += 1;
                slot.entry.clone()
            }
            None => {
                self.misses += 1;
                CacheEntry::not_found()
            }
        }
    }

    /// Read without touching recency or hit counters.
    pub fn peek(&self, key: &HashKey) -> CacheEntry<V> {
        self.entries
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(CacheEntry::not_found)
    }

    /// Insert or overwrite the entry for `key` and mark it most recently used.
    ///
    /// Overwriting a terminal entry is permitted here; the orchestrator only
    /// ever writes a terminal state over its own `Pending` reservation.
    pub fn put(&mut self, key: HashKey, status: JobStatus, value: Option<V>) {
        let now = self.tick();
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.entry = CacheEntry { status, value };
            slot.accessed_at = now;
            slot.reservation = None;
            return;
        }
        self.insert_slot(key, CacheEntry { status, value }, now, None);
    }

    /// Atomic check-and-reserve.
    ///
    /// If `key` is present, touches it and returns a copy of its entry. If its
    /// `Pending` entry was evicted while the reservation is still open, the
    /// entry is restored and returned as `Existing`. Otherwise inserts a
    /// `Pending` entry (evicting if needed) and returns
    /// [`Reservation::Reserved`]; the caller then owns the terminal write.
    pub fn reserve(&mut self, key: &HashKey) -> Reservation<V> {
        let existing = self.get(key);
        if existing.status != JobStatus::NotFound {
            return Reservation::Existing(existing);
        }

        let now = self.tick();
        if let Some(&id) = self.in_flight.get(key) {
            debug!(key = %key.short(), reservation = %id, "Restoring evicted pending entry");
            self.insert_slot(key.clone(), CacheEntry::pending(), now, Some(id));
            return Reservation::Existing(CacheEntry::pending());
        }

        let id = ReservationId(now);
        self.in_flight.insert(key.clone(), id);
        self.insert_slot(key.clone(), CacheEntry::pending(), now, Some(id));
        Reservation::Reserved(id)
    }

    /// Finish reservation `id` with a terminal state.
    ///
    /// The write only lands on the `Pending` entry created by that
    /// reservation. If the entry was evicted, or the reservation is unknown,
    /// nothing is written and no other entry is displaced. Returns whether
    /// the entry was updated.
    pub fn complete(
        &mut self,
        key: &HashKey,
        id: ReservationId,
        status: JobStatus,
        value: Option<V>,
    ) -> bool {
        if self.in_flight.get(key) == Some(&id) {
            self.in_flight.remove(key);
        }
        let now = self.tick();
        match self.entries.get_mut(key) {
            Some(slot)
                if slot.entry.status == JobStatus::Pending && slot.reservation == Some(id) =>
            {
                slot.entry = CacheEntry { status, value };
                slot.accessed_at = now;
                slot.reservation = None;
                true
            }
            _ => {
                debug!(key = %key.short(), reservation = %id, "Dropping completion for non-resident reservation");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Aggregate counters.
    pub fn stats(&self) -> CacheStats {
        let pending = self
            .entries
            .values()
            .filter(|s| s.entry.status == JobStatus::Pending)
            .count();
        CacheStats {
            total_entries: self.entries.len(),
            pending,
            in_flight: self.in_flight.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    // -- private helpers ---------------------------------------------------

    fn insert_slot(
        &mut self,
        key: HashKey,
        entry: CacheEntry<V>,
        now: u64,
        reservation: Option<ReservationId>,
    ) {
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            Slot {
                entry,
                accessed_at: now,
                reservation,
            },
        );
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) {
        if let Some(lru_key) = self
            .entries
            .iter()
            .min_by_key(|(_, s)| s.accessed_at)
            .map(|(k, _)| k.clone())
        {
            debug!(key = %lru_key.short(), "Evicting LRU cache entry");
            self.entries.remove(&lru_key);
            self.evictions += 1;
        }
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently resident.
    pub total_entries: usize,
    /// Resident entries still waiting on a background job.
    pub pending: usize,
    /// Open reservations, including ones whose entry was evicted.
    pub in_flight: usize,
    /// Configured maximum number of entries.
    pub capacity: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed by capacity pressure.
    pub evictions: u64,
}
