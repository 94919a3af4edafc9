// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C2: connected-station roster with admission policy (spec §4.2).
//!
//! The roster itself never calls the driver or the event bus directly; it
//! returns an outcome describing what side effects the caller (the FSM)
//! must perform. This keeps admission/eviction policy unit-testable without
//! a fake driver.

use crate::config::{Client, SoftApCapability, SoftApConfiguration};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockReason {
    BlockedByUser,
    NoMoreStas,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AdmitOutcome {
    /// Client inserted; membership changed.
    Admitted,
    /// `isConnected` already matched current membership; a no-op logged at
    /// error level by the caller (spec §4.2).
    DuplicateNoop,
    /// Rejected and forced off by the driver. `emit_blocked_event` is false
    /// when the client's MAC is already in the blocked set (silently
    /// dropped per spec §4.2).
    Rejected { reason: BlockReason, emit_blocked_event: bool },
}

/// An ordered, duplicate-free connected-station roster (spec invariant I2).
#[derive(Default)]
pub struct ClientRoster {
    clients: Vec<Client>,
}

impl ClientRoster {
    pub fn new() -> Self {
        ClientRoster { clients: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Client> {
        self.clients.clone()
    }

    pub fn contains(&self, client: &Client) -> bool {
        self.clients.iter().any(|c| c.mac == client.mac)
    }

    /// Admits or rejects `client` per spec §4.2. On `Rejected`, the roster
    /// is left unmodified; the caller must issue the forced disconnect (and
    /// the blocked-client callback, when `emit_blocked_event` is set).
    pub fn admit(&mut self, client: Client, config: &SoftApConfiguration) -> AdmitOutcome {
        if self.contains(&client) {
            return AdmitOutcome::DuplicateNoop;
        }
        if config.client_control_by_user && !config.allowed_macs.contains(&client.mac) {
            let emit_blocked_event = !config.blocked_macs.contains(&client.mac);
            return AdmitOutcome::Rejected {
                reason: BlockReason::BlockedByUser,
                emit_blocked_event,
            };
        }
        AdmitOutcome::Admitted
    }

    /// Call after an `Admitted` outcome (or directly, when the capability
    /// check is being applied first) to actually enforce the cap.
    /// Returns `Rejected { NoMoreStas }` without mutating if at capacity,
    /// otherwise inserts and returns `Admitted`.
    pub fn try_insert(
        &mut self,
        client: Client,
        effective_max_clients: u32,
    ) -> AdmitOutcome {
        if self.clients.len() as u32 >= effective_max_clients {
            return AdmitOutcome::Rejected { reason: BlockReason::NoMoreStas, emit_blocked_event: true };
        }
        self.clients.push(client);
        AdmitOutcome::Admitted
    }

    /// Removes by MAC equality. Returns true if membership changed.
    pub fn remove(&mut self, client: Client) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.mac != client.mac);
        self.clients.len() != before
    }

    pub fn clear(&mut self) -> Vec<Client> {
        std::mem::take(&mut self.clients)
    }

    /// Computes which currently-connected clients must be force-evicted
    /// after a config/capability change (spec §4.2): first anyone no longer
    /// on the allow list (when user control is enabled), then, if still
    /// over the effective cap, the allowed-but-over-cap tail (most recently
    /// admitted first) until under the limit. Does not mutate the roster;
    /// actual removal follows the driver's confirmation event.
    pub fn reconcile(
        &self,
        config: &SoftApConfiguration,
        capability: &SoftApCapability,
    ) -> Vec<Client> {
        let mut evictions = Vec::new();
        let mut remaining: Vec<Client> = self.clients.clone();

        if config.client_control_by_user {
            let (keep, drop): (Vec<_>, Vec<_>) =
                remaining.into_iter().partition(|c| config.allowed_macs.contains(&c.mac));
            evictions.extend(drop);
            remaining = keep;
        }

        let effective_max = config.effective_max_clients(capability) as usize;
        while remaining.len() > effective_max {
            // evict the most-recently-admitted of the surviving tail
            evictions.push(remaining.pop().expect("len > effective_max implies non-empty"));
        }
        evictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Band, CapabilityFlags, Mac, SecurityMode};

    fn cap(max: u32) -> SoftApCapability {
        SoftApCapability {
            flags: CapabilityFlags::CLIENT_FORCE_DISCONNECT,
            max_clients: max,
            channels_2ghz: vec![1],
            channels_5ghz: vec![36],
            channels_6ghz: vec![],
            supports_5ghz: true,
        }
    }

    fn cfg() -> SoftApConfiguration {
        SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ)
    }

    fn mac(n: u8) -> Mac {
        Mac([n, 0, 0, 0, 0, 0])
    }

    #[test]
    fn admits_unrestricted_client() {
        let mut roster = ClientRoster::new();
        let outcome = roster.admit(Client::new(mac(1)), &cfg());
        assert_eq!(outcome, AdmitOutcome::Admitted);
    }

    #[test]
    fn duplicate_admit_is_noop() {
        let mut roster = ClientRoster::new();
        roster.try_insert(Client::new(mac(1)), 10);
        let outcome = roster.admit(Client::new(mac(1)), &cfg());
        assert_eq!(outcome, AdmitOutcome::DuplicateNoop);
    }

    #[test]
    fn blocked_by_user_emits_event_unless_already_blocked() {
        let mut c = cfg();
        c.client_control_by_user = true;
        let mut roster = ClientRoster::new();

        let outcome = roster.admit(Client::new(mac(1)), &c);
        assert_eq!(
            outcome,
            AdmitOutcome::Rejected { reason: BlockReason::BlockedByUser, emit_blocked_event: true }
        );

        c.blocked_macs.insert(mac(1));
        let outcome = roster.admit(Client::new(mac(1)), &c);
        assert_eq!(
            outcome,
            AdmitOutcome::Rejected { reason: BlockReason::BlockedByUser, emit_blocked_event: false }
        );
    }

    #[test]
    fn try_insert_rejects_over_cap() {
        let mut roster = ClientRoster::new();
        roster.try_insert(Client::new(mac(1)), 1);
        let outcome = roster.try_insert(Client::new(mac(2)), 1);
        assert_eq!(
            outcome,
            AdmitOutcome::Rejected { reason: BlockReason::NoMoreStas, emit_blocked_event: true }
        );
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn reconcile_ejects_disallowed_then_trims_to_cap() {
        let mut roster = ClientRoster::new();
        roster.try_insert(Client::new(mac(1)), 10);
        roster.try_insert(Client::new(mac(2)), 10);
        roster.try_insert(Client::new(mac(3)), 10);

        let mut c = cfg();
        c.client_control_by_user = true;
        c.allowed_macs.insert(mac(1));
        c.allowed_macs.insert(mac(2));
        c.max_client_count = 1;

        let evicted = roster.reconcile(&c, &cap(10));
        // mac(3) ejected for not being allowed; then over cap (1) so mac(2)
        // (most-recently-admitted of the surviving allowed tail) is evicted.
        assert!(evicted.contains(&Client::new(mac(3))));
        assert!(evicted.contains(&Client::new(mac(2))));
        assert!(!evicted.contains(&Client::new(mac(1))));
    }
}
