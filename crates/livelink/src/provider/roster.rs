// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection records and the provider's consumer roster.

use crate::transport::EndpointAddress;
use std::collections::HashMap;

/// Liveness record for one peer address.
///
/// Provider side: one per subscribed consumer. Consumer side: the bound
/// provider of a link.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub address: EndpointAddress,
    /// Platform seconds of the last heartbeat (or any traffic) seen
    pub last_heartbeat_time: f64,
    /// Platform seconds the record was created
    pub connected_at: f64,
}

impl ConnectionRecord {
    pub fn new(address: EndpointAddress, now: f64) -> Self {
        Self {
            address,
            last_heartbeat_time: now,
            connected_at: now,
        }
    }

    /// Refresh the liveness timestamp.
    pub fn touch(&mut self, now: f64) {
        if now > self.last_heartbeat_time {
            self.last_heartbeat_time = now;
        }
    }

    pub fn silence(&self, now: f64) -> f64 {
        now - self.last_heartbeat_time
    }

    /// Active only while `now - last_heartbeat_time < timeout`.
    pub fn is_expired(&self, now: f64, timeout: f64) -> bool {
        self.silence(now) >= timeout
    }
}

/// Subscribed consumers, indexed by address.
#[derive(Debug, Default)]
pub struct Roster {
    records: HashMap<EndpointAddress, ConnectionRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `address`. Returns `false` (and refreshes it) if already present.
    pub fn add(&mut self, address: EndpointAddress, now: f64) -> bool {
        match self.records.get_mut(&address) {
            Some(record) => {
                record.touch(now);
                false
            }
            None => {
                self.records
                    .insert(address.clone(), ConnectionRecord::new(address, now));
                true
            }
        }
    }

    /// Refresh `address`. Returns `false` if it is not in the roster.
    pub fn touch(&mut self, address: &EndpointAddress, now: f64) -> bool {
        match self.records.get_mut(address) {
            Some(record) => {
                record.touch(now);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, address: &EndpointAddress) -> bool {
        self.records.contains_key(address)
    }

    pub fn remove(&mut self, address: &EndpointAddress) -> Option<ConnectionRecord> {
        self.records.remove(address)
    }

    /// Remove records silent for at least `timeout` and return their addresses.
    pub fn remove_expired(&mut self, now: f64, timeout: f64) -> Vec<EndpointAddress> {
        let expired: Vec<EndpointAddress> = self
            .records
            .values()
            .filter(|r| r.is_expired(now, timeout))
            .map(|r| r.address.clone())
            .collect();
        for address in &expired {
            self.records.remove(address);
        }
        expired
    }

    pub fn addresses(&self) -> Vec<EndpointAddress> {
        self.records.keys().cloned().collect()
    }

    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
