use crate::limits::{DEFAULT_MAX_AGE, KEY_MAX, MAX_AGE_MAX, PAYLOAD_MAX};

use ahash::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Handle to a live cache row: a slot index plus the generation it was
/// written under (spec §9 design notes — "replace [the timer's opaque
/// pointer] with an index into C1; the callback receives `(cache_id,
/// generation)` and checks generation equality before evicting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheId {
    index: usize,
    generation: u32,
}

/// One cached origin response (C1 row, spec §3).
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub key: String,
    pub payload: Vec<u8>,
    pub content_format: Option<u16>,
    pub expires_at: u64,
}

struct Slot {
    generation: u32,
    row: Option<CachedResponse>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PutStatus {
    Ok,
    Full,
}

/// Fixed-capacity table of cached proxy responses keyed by `Proxy-Uri`,
/// with per-entry TTL (spec §4.1, component C1).
///
/// Eviction is nearest-deadline-first when the table is full and the key
/// is new. A write for a key already present always refreshes that row in
/// place rather than being rejected — the design's `key_conflict` outcome
/// names a possible API surface for an implementation that prefers to keep
/// the existing row, but this proxy's policy is "last write wins", so
/// `cache_put` only ever returns `Ok` or `Full`.
pub struct CacheTable {
    slots: Vec<Slot>,
    index: HashMap<String, CacheId>,
    default_max_age: u32,
    max_age_ceiling: u32,
}

impl CacheTable {
    pub fn new(capacity: usize) -> Self {
        Self::with_max_age(capacity, DEFAULT_MAX_AGE, MAX_AGE_MAX)
    }

    pub fn with_max_age(capacity: usize, default_max_age: u32, max_age_ceiling: u32) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| Slot {
                    generation: 0,
                    row: None,
                })
                .collect(),
            index: HashMap::default(),
            default_max_age,
            max_age_ceiling,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn normalize_max_age(&self, max_age: u32) -> u32 {
        if max_age == 0 {
            self.default_max_age
        } else {
            max_age.min(self.max_age_ceiling)
        }
    }

    /// Inserts or refreshes a cache row. `key` longer than `KEY_MAX` or
    /// `payload` longer than `PAYLOAD_MAX` is simply not cached (the
    /// forward itself still succeeds at the engine layer) — modeled here
    /// as a no-op `Ok` so callers don't need a third status for it.
    pub fn cache_put(
        &mut self,
        key: &str,
        payload: &[u8],
        content_format: Option<u16>,
        max_age: u32,
        now: u64,
    ) -> PutStatus {
        if key.len() > KEY_MAX || payload.len() > PAYLOAD_MAX {
            return PutStatus::Ok;
        }

        let max_age = self.normalize_max_age(max_age);
        let expires_at = now + max_age as u64;

        if let Some(id) = self.index.get(key).copied() {
            let slot = &mut self.slots[id.index];
            slot.row = Some(CachedResponse {
                key: key.to_string(),
                payload: payload.to_vec(),
                content_format,
                expires_at,
            });
            return PutStatus::Ok;
        }

        let free = self.slots.iter().position(|slot| slot.row.is_none());
        let index = match free {
            Some(index) => index,
            None => match self.nearest_deadline_index() {
                Some(index) => {
                    let evicted_key = self.slots[index].row.take().map(|row| row.key);
                    if let Some(evicted_key) = evicted_key {
                        self.index.remove(&evicted_key);
                    }
                    self.slots[index].generation = self.slots[index].generation.wrapping_add(1);
                    index
                }
                None => return PutStatus::Full,
            },
        };

        let slot = &mut self.slots[index];
        slot.row = Some(CachedResponse {
            key: key.to_string(),
            payload: payload.to_vec(),
            content_format,
            expires_at,
        });

        self.index.insert(
            key.to_string(),
            CacheId {
                index,
                generation: slot.generation,
            },
        );

        PutStatus::Ok
    }

    fn nearest_deadline_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.row.as_ref().map(|row| (i, row.expires_at)))
            .min_by_key(|(_, expires_at)| *expires_at)
            .map(|(i, _)| i)
    }

    /// Exact-match lookup, re-checking `expires_at` against `now` to close
    /// the TOCTOU window between an entry's deadline and its timer firing
    /// (spec §4.1).
    ///
    /// # Test
    ///
    /// ```
    /// use coap_proxy_service::cache::CacheTable;
    ///
    /// let mut table = CacheTable::new(4);
    /// table.cache_put("coap://[fd00::2]/x", b"hi", Some(50), 30, 0);
    ///
    /// assert!(table.cache_get("coap://[fd00::2]/x", 10).is_some());
    /// assert!(table.cache_get("coap://[fd00::2]/x", 31).is_none());
    /// ```
    pub fn cache_get(&self, key: &str, now: u64) -> Option<&CachedResponse> {
        let id = self.index.get(key)?;
        let slot = &self.slots[id.index];
        let row = slot.row.as_ref()?;

        if row.expires_at <= now { None } else { Some(row) }
    }

    /// Removes a row and cancels its timer. Idempotent.
    pub fn cache_invalidate(&mut self, key: &str) {
        if let Some(id) = self.index.remove(key) {
            let slot = &mut self.slots[id.index];
            if slot.generation == id.generation {
                slot.row = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    /// Removes every row whose deadline has passed. The caller (the
    /// binary's event loop) drives this once per scheduler tick in lieu of
    /// a per-entry timer, per the single-threaded cooperative model
    /// (spec §5).
    pub fn sweep_expired(&mut self, now: u64) {
        let expired: Vec<String> = self
            .slots
            .iter()
            .filter_map(|slot| slot.row.as_ref())
            .filter(|row| row.expires_at <= now)
            .map(|row| row.key.clone())
            .collect();

        for key in expired {
            self.cache_invalidate(&key);
        }
    }
}
