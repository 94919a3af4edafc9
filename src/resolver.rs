// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C4: pure configuration transforms — BSSID randomization, dual-band
//! split, OWE transition pairing, and channel/ACS resolution (spec §4.4).

use rand::RngCore;

use crate::config::{Band, Mac, SoftApCapability, SoftApConfiguration};
use crate::error::ManagerError;

pub struct ConfigResolver;

impl ConfigResolver {
    /// Generates a locally-administered unicast MAC when `config.bssid` is
    /// absent, marking the configuration `randomized`. A no-op when a BSSID
    /// is already present. Re-applying to a config whose BSSID was cleared
    /// back to `None` regenerates and re-marks, so "clearing BSSID" stays
    /// idempotent at the level of the `randomized` flag (spec §4.4).
    pub fn randomize_bssid(config: &mut SoftApConfiguration, rng: &mut impl RngCore) {
        match config.bssid {
            Some(_) => config.bssid_randomized = false,
            None => {
                config.bssid = Some(generate_locally_administered_mac(rng));
                config.bssid_randomized = true;
            }
        }
    }

    /// Splits a `band = ANY` configuration into two children, identical to
    /// the parent except band is forced to 2.4GHz then 5GHz (spec §4.4).
    pub fn dual_band_split(
        config: &SoftApConfiguration,
    ) -> Result<(SoftApConfiguration, SoftApConfiguration), ManagerError> {
        if config.band != Band::ANY {
            return Err(ManagerError::ConfigInvalid(
                "dual_band_split requires band = ANY".to_string(),
            ));
        }
        let mut first = config.clone();
        first.band = Band::TWO_GHZ;
        let mut second = config.clone();
        second.band = Band::FIVE_GHZ;
        Ok((first, second))
    }

    /// Produces the OWE/Open transition pair (spec §4.4): the OWE child
    /// carries a hidden, hash-derived SSID; the Open child keeps the
    /// original, visible SSID. Each records the other's interface name as
    /// its transitional peer.
    pub fn owe_transition_pair(
        config: &SoftApConfiguration,
        owe_iface: &str,
        open_iface: &str,
    ) -> (SoftApConfiguration, SoftApConfiguration) {
        let mut owe_child = config.clone();
        owe_child.ssid = format!("OWE_{}", stable_hash32(&config.ssid)).into_bytes();
        owe_child.hidden_ssid = true;
        owe_child.transitional_peer_iface = Some(open_iface.to_string());

        let mut open_child = config.clone();
        open_child.security = crate::config::SecurityMode::Open;
        open_child.transitional_peer_iface = Some(owe_iface.to_string());

        (owe_child, open_child)
    }

    /// Resolves the channel to start on for a single, concrete (non-`ANY`)
    /// band. An explicit non-zero channel is honored as-is. Auto (0) defers
    /// to ACS when offloaded, otherwise picks the first capability-listed
    /// channel for the band; fails `NoChannel` when none exist.
    pub fn resolve_channel(
        config: &SoftApConfiguration,
        capability: &SoftApCapability,
    ) -> Result<u8, ManagerError> {
        if config.channel != 0 {
            return Ok(config.channel);
        }
        if capability.flags.contains(crate::config::CapabilityFlags::ACS_OFFLOAD) {
            return Ok(0);
        }
        capability
            .channels_for(config.band)
            .first()
            .copied()
            .ok_or_else(|| ManagerError::NoChannel(format!("no supported channel for {:?}", config.band)))
    }
}

fn generate_locally_administered_mac(rng: &mut impl RngCore) -> Mac {
    let mut octets = [0u8; 6];
    rng.fill_bytes(&mut octets);
    // set the locally-administered bit, clear the multicast bit.
    octets[0] = (octets[0] | 0b0000_0010) & 0b1111_1110;
    Mac(octets)
}

/// A small FNV-1a 32-bit hash. Deterministic across processes and runs,
/// unlike `std`'s `DefaultHasher`, which spec §4.4's OWE SSID derivation
/// requires (two parties must independently compute the same hidden SSID).
pub fn stable_hash32(data: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
