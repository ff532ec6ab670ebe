//! TTL cache for probe verdicts.
//!
//! Entries are keyed by the full identity of a check (checker, service,
//! port, path, query); two requests share a verdict only when every
//! component matches. Counters are monotonic and reset only by
//! `configure`. There is no dedup of concurrent misses: two simultaneous
//! requests for the same key may both probe and both store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::checker::{CheckResult, CheckerId};

/// Fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub checker: CheckerId,
    pub service: String,
    pub port: u16,
    pub path: String,
    pub query: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CheckResult,
    expires_at: f64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    gets: AtomicU64,
    sets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time counter snapshot for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub gets: u64,
    pub sets: u64,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

/// Shared verdict cache.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    counters: CacheCounters,
    // TTL stored as f64 bits so reconfiguration needs no lock.
    ttl_bits: AtomicU64,
}

impl ResponseCache {
    pub fn new(ttl_secs: f64) -> Self {
        Self {
            entries: DashMap::new(),
            counters: CacheCounters::default(),
            ttl_bits: AtomicU64::new(ttl_secs.to_bits()),
        }
    }

    /// Install a new TTL and drop every entry and counter. Reconfiguration
    /// is always a full reset, never partial.
    pub fn configure(&self, ttl_secs: f64) {
        self.ttl_bits.store(ttl_secs.to_bits(), Ordering::Relaxed);
        self.entries.clear();
        self.counters.gets.store(0, Ordering::Relaxed);
        self.counters.sets.store(0, Ordering::Relaxed);
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.expirations.store(0, Ordering::Relaxed);
    }

    /// Per-request view of the cache. While `bust` is set every lookup
    /// through the scope misses, without evicting entries other requests
    /// still use.
    pub fn scope(&self, bust: bool) -> CacheScope<'_> {
        CacheScope { cache: self, bust }
    }

    pub fn ttl_secs(&self) -> f64 {
        f64::from_bits(self.ttl_bits.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Request-scoped cache handle carrying the bust flag.
pub struct CacheScope<'a> {
    cache: &'a ResponseCache,
    bust: bool,
}

impl CacheScope<'_> {
    /// Look up a verdict. Expired entries count an expiration and are
    /// removed; busted lookups miss without touching stored entries.
    pub fn get(&self, key: &CacheKey) -> Option<CheckResult> {
        let counters = &self.cache.counters;
        counters.gets.fetch_add(1, Ordering::Relaxed);
        if self.bust {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let expired = match self.cache.entries.get(key) {
            Some(entry) => {
                if entry.expires_at > unix_now() {
                    counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.cache.entries.remove(key);
            counters.expirations.fetch_add(1, Ordering::Relaxed);
        }
        counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a verdict with expiry `now + ttl`.
    pub fn set(&self, key: CacheKey, value: CheckResult) {
        self.cache.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.cache.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: unix_now() + self.cache.ttl_secs(),
            },
        );
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
