// SPDX-License-Identifier: MPL-2.0

//! Per-connection session state: the packet-identifier allocator and the
//! set of active subscriptions.
//!
//! Identifiers are scoped to one connection. They allocate sequentially
//! from 1, wrap at the namespace ceiling, and skip values still bound to an
//! outstanding delivery. The ceiling is 65535 on the wire but shrinkable so
//! exhaustion is reachable in tests.

use std::collections::{BTreeMap, HashSet};

use crate::error::ClientError;

pub const MAX_PACKET_ID: u16 = u16::MAX;

#[derive(Debug)]
pub struct SessionState {
    next_id: u16,
    max_id: u16,
    in_use: HashSet<u16>,
    /// Active subscriptions, filter -> granted QoS.
    subscriptions: BTreeMap<String, u8>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_max_id(MAX_PACKET_ID)
    }

    /// A session whose identifier namespace ends at `max_id` instead
    /// of 65535.
    pub fn with_max_id(max_id: u16) -> Self {
        assert!(max_id >= 1, "packet identifier namespace cannot be empty");
        SessionState {
            next_id: 1,
            max_id,
            in_use: HashSet::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    /// Allocate the next free packet identifier.
    pub fn allocate_id(&mut self) -> Result<u16, ClientError> {
        if self.in_use.len() >= self.max_id as usize {
            return Err(ClientError::IdentifierSpaceExhausted);
        }

        loop {
            let candidate = self.next_id;
            self.next_id = if self.next_id >= self.max_id {
                1
            } else {
                self.next_id + 1
            };
            if self.in_use.insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Return an identifier to the pool once its handshake completes.
    pub fn release_id(&mut self, id: u16) {
        self.in_use.remove(&id);
    }

    pub fn ids_in_use(&self) -> usize {
        self.in_use.len()
    }

    pub fn record_subscription(&mut self, filter: impl Into<String>, granted_qos: u8) {
        self.subscriptions.insert(filter.into(), granted_qos);
    }

    pub fn remove_subscription(&mut self, filter: &str) {
        self.subscriptions.remove(filter);
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, u8)> {
        self.subscriptions.iter().map(|(f, &q)| (f.as_str(), q))
    }

    /// Drop every identifier binding and subscription. Used on explicit
    /// disconnect and when the broker reports a fresh session.
    pub fn clear(&mut self) {
        self.next_id = 1;
        self.in_use.clear();
        self.subscriptions.clear();
    }
}
