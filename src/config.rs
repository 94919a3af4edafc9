// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Data types shared across the Soft-AP lifecycle manager: configuration,
//! capability, observable info, and the client/scan-result value types.

use std::collections::HashSet;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A 48-bit hardware address. Equality and hashing are by the raw octets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; 6]);

    /// True if this is a locally-administered, unicast address (the kind we
    /// generate when randomizing a BSSID).
    pub fn is_locally_administered_unicast(&self) -> bool {
        self.0[0] & 0b0000_0011 == 0b0000_0010
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

bitflags! {
    /// Band bitmask. `ANY` requests the union; `ConfigResolver` splits it.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
    pub struct Band: u8 {
        const TWO_GHZ = 0b001;
        const FIVE_GHZ = 0b010;
        const SIX_GHZ = 0b100;
        const ANY = Self::TWO_GHZ.bits() | Self::FIVE_GHZ.bits() | Self::SIX_GHZ.bits();
    }
}

bitflags! {
    /// Capability feature bits advertised by the driver adapter.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
    pub struct CapabilityFlags: u32 {
        const ACS_OFFLOAD = 1 << 0;
        const CLIENT_FORCE_DISCONNECT = 1 << 1;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SecurityMode {
    Open,
    Wpa2Psk,
    Wpa3Sae,
    Owe,
    SaeTransition,
}

/// User-requested Soft-AP configuration (spec §3 `SoftApConfiguration`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftApConfiguration {
    pub ssid: Vec<u8>,
    pub passphrase: Option<Vec<u8>>,
    pub security: SecurityMode,
    pub band: Band,
    /// 0 means auto/ACS.
    pub channel: u8,
    pub hidden_ssid: bool,
    /// `None` means "randomize a BSSID".
    pub bssid: Option<Mac>,
    /// Set internally once a BSSID has been generated; preserved across
    /// `updateConfiguration` calls with `bssid = None` so re-clearing stays
    /// idempotent (spec §4.4).
    pub bssid_randomized: bool,
    pub auto_shutdown: bool,
    /// 0 means "use the platform default".
    pub shutdown_timeout_ms: u64,
    /// 0 means capability-derived.
    pub max_client_count: u32,
    pub client_control_by_user: bool,
    pub blocked_macs: HashSet<Mac>,
    pub allowed_macs: HashSet<Mac>,
    /// Set by `ConfigResolver` for OWE/Open transition-mode children; names
    /// the sibling interface each side is bridged with.
    pub transitional_peer_iface: Option<String>,
}

impl SoftApConfiguration {
    pub fn new(ssid: Vec<u8>, security: SecurityMode, band: Band) -> Self {
        SoftApConfiguration {
            ssid,
            passphrase: None,
            security,
            band,
            channel: 0,
            hidden_ssid: false,
            bssid: None,
            bssid_randomized: false,
            auto_shutdown: false,
            shutdown_timeout_ms: 0,
            max_client_count: 0,
            client_control_by_user: false,
            blocked_macs: HashSet::new(),
            allowed_macs: HashSet::new(),
            transitional_peer_iface: None,
        }
    }

    /// `effectiveMaxClients` (spec I2): min of capability and user-configured
    /// limits, with 0 meaning "unbounded" on the user side.
    pub fn effective_max_clients(&self, capability: &SoftApCapability) -> u32 {
        if self.max_client_count == 0 {
            capability.max_clients
        } else {
            capability.max_clients.min(self.max_client_count)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftApCapability {
    pub flags: CapabilityFlags,
    pub max_clients: u32,
    pub channels_2ghz: Vec<u8>,
    pub channels_5ghz: Vec<u8>,
    pub channels_6ghz: Vec<u8>,
    pub supports_5ghz: bool,
}

impl SoftApCapability {
    pub fn channels_for(&self, band: Band) -> &[u8] {
        match band {
            Band::TWO_GHZ => &self.channels_2ghz,
            Band::FIVE_GHZ => &self.channels_5ghz,
            Band::SIX_GHZ => &self.channels_6ghz,
            _ => &[],
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Bandwidth {
    Invalid,
    Bw20,
    Bw40,
    Bw80,
    Bw160,
}

/// Observable Soft-AP channel state (spec §3 `SoftApInfo`). `frequency = 0`
/// and `bandwidth = Invalid` together mean "down".
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SoftApInfo {
    pub frequency: u32,
    pub bandwidth: Bandwidth,
}

impl SoftApInfo {
    pub const DOWN: SoftApInfo = SoftApInfo { frequency: 0, bandwidth: Bandwidth::Invalid };
}

impl Default for SoftApInfo {
    fn default() -> Self {
        SoftApInfo::DOWN
    }
}

/// A connected station, identified by MAC (spec §3 `Client`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Client {
    pub mac: Mac,
}

impl Client {
    pub fn new(mac: Mac) -> Self {
        Client { mac }
    }
}

/// A single scan result keyed by BSSID in `ScanCache`.
#[derive(Clone, Debug)]
pub struct ScanResult {
    pub bssid: Mac,
    /// Elapsed-since-boot milliseconds; monotonic.
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

/// Whether this Soft-AP instance is local-only or shares upstream
/// connectivity (spec glossary "Tethered mode").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TargetMode {
    LocalOnly,
    Tethered,
}

/// The Soft-AP role set a `Manager` may be assigned into exactly once
/// (spec invariant I6).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Role {
    Unspecified,
    Primary,
    Secondary,
}

/// Constructor input bundling the fixed mode configuration (spec §3
/// "Lifecycles").
#[derive(Clone, Debug)]
pub struct SoftApModeConfiguration {
    pub target_mode: TargetMode,
    pub config: SoftApConfiguration,
    pub capability: SoftApCapability,
    /// Platform regulatory domain, consulted at startup §4.5 step 5. Not
    /// part of `SoftApConfiguration` because it is host/platform scoped,
    /// not per-AP.
    pub country_code: String,
    /// Platform default shutdown timeout, used when the per-AP timeout is
    /// 0 (spec §4.3).
    pub platform_default_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display_is_colon_hex() {
        let mac = Mac([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(mac.to_string(), "02:11:22:33:44:55");
    }

    #[test]
    fn locally_administered_bit() {
        assert!(Mac([0x02, 0, 0, 0, 0, 0]).is_locally_administered_unicast());
        assert!(!Mac([0x00, 0, 0, 0, 0, 0]).is_locally_administered_unicast());
        // multicast bit set, not unicast
        assert!(!Mac([0x03, 0, 0, 0, 0, 0]).is_locally_administered_unicast());
    }

    #[test]
    fn effective_max_clients_takes_the_min() {
        let cap = SoftApCapability {
            flags: CapabilityFlags::empty(),
            max_clients: 8,
            channels_2ghz: vec![1],
            channels_5ghz: vec![36],
            channels_6ghz: vec![],
            supports_5ghz: true,
        };
        let mut cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ);
        assert_eq!(cfg.effective_max_clients(&cap), 8);
        cfg.max_client_count = 3;
        assert_eq!(cfg.effective_max_clients(&cap), 3);
        cfg.max_client_count = 20;
        assert_eq!(cfg.effective_max_clients(&cap), 8);
    }
}
