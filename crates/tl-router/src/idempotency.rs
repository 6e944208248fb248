//! Recently-processed event tracking.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Remembers `(hotel, event)` pairs that finished the pipeline.
pub trait IdempotencyStore: Send + Sync {
    fn seen_recently(&self, hotel_id: &str, event_id: &str) -> bool;

    fn mark_seen(&self, hotel_id: &str, event_id: &str, ttl: Duration);
}

/// In-process store. Entries expire on their own; nothing survives a restart.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    // key -> expiry deadline
    entries: DashMap<String, Instant>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(hotel_id: &str, event_id: &str) -> String {
        format!("seen:{}:{}", hotel_id, event_id)
    }

    /// Live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| *e.value() > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, now: Instant) {
        self.entries.retain(|_, deadline| *deadline > now);
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn seen_recently(&self, hotel_id: &str, event_id: &str) -> bool {
        let key = Self::key(hotel_id, event_id);
        let now = Instant::now();

        let live = match self.entries.get(&key) {
            Some(deadline) => *deadline > now,
            None => return false,
        };

        if !live {
            self.entries.remove_if(&key, |_, deadline| *deadline <= now);
        }
        live
    }

    fn mark_seen(&self, hotel_id: &str, event_id: &str, ttl: Duration) {
        let now = Instant::now();
        self.sweep(now);
        self.entries.insert(Self::key(hotel_id, event_id), now + ttl);
    }
}
