//! Recency and access accounting behind the reporting endpoints.
//!
//! Unbounded by design: entries live for the life of the process and are
//! filtered only at read time.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

/// Last raw verdict returned for a service. The code is recorded before any
/// transport remapping, so checker-internal codes like 599 stay visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub code: u16,
    pub remote_ip: String,
    pub ts: f64,
}

/// Tracks which services have been checked, by whom, and with what verdict.
#[derive(Default)]
pub struct RecencyTracker {
    seen: DashMap<String, f64>,
    last: DashMap<String, StatusResponse>,
    counts: DashMap<String, DashMap<String, u64>>,
}

impl RecencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note an incoming check before any probe runs.
    pub fn record_access(&self, service: &str, remote_ip: &str) {
        self.seen.insert(service.to_string(), unix_now());
        self.counts
            .entry(service.to_string())
            .or_default()
            .entry(remote_ip.to_string())
            .and_modify(|n| *n += 1)
            .or_insert(1);
    }

    /// Note the raw verdict of a finished check.
    pub fn record_verdict(&self, service: &str, code: u16, remote_ip: &str) {
        self.last.insert(
            service.to_string(),
            StatusResponse {
                code,
                remote_ip: remote_ip.to_string(),
                ts: unix_now(),
            },
        );
    }

    /// Services seen within the last `threshold_secs`, sorted by name, each
    /// with its last verdict when one exists.
    pub fn recent(&self, threshold_secs: f64) -> Vec<(String, Option<StatusResponse>)> {
        let horizon = unix_now() - threshold_secs;
        let mut seen: Vec<(String, Option<StatusResponse>)> = self
            .seen
            .iter()
            .filter(|entry| *entry.value() > horizon)
            .map(|entry| {
                let service = entry.key().clone();
                let last = self.last.get(&service).map(|r| r.value().clone());
                (service, last)
            })
            .collect();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        seen
    }

    /// Per-service, per-requester access counts.
    pub fn access_counts(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.counts
            .iter()
            .map(|service_entry| {
                let by_ip = service_entry
                    .value()
                    .iter()
                    .map(|ip_entry| (ip_entry.key().clone(), *ip_entry.value()))
                    .collect();
                (service_entry.key().clone(), by_ip)
            })
            .collect()
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
