// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C5: the ordered driver-call sequence for single/dual/OWE startup and
//! rollback (spec §4.5).

use rand::RngCore;

use crate::config::{Band, SecurityMode, SoftApCapability, SoftApConfiguration, SoftApModeConfiguration};
use crate::driver::DriverIface;
use crate::error::ManagerError;
use crate::event_bus::{ApState, EventBus, StateChangeBroadcast};
use crate::resolver::ConfigResolver;

/// What the sequencer built, for the FSM to record as the live topology.
pub struct StartupOutcome {
    /// The name the Manager exposes for all client-visible operations:
    /// the single radio interface, or the bridge in dual/OWE topologies
    /// (spec §4.5).
    pub ap_interface_name: String,
    pub data_interface_name: String,
    pub radio_interfaces: Vec<String>,
    pub bridge_interface: Option<String>,
}

/// A failed startup attempt. `interface_was_created` tells the FSM whether
/// to publish a single `FAILED`, or `FAILED` followed by
/// `DISABLING`→`DISABLED` (spec §7 propagation policy).
pub struct StartupFailure {
    pub error: ManagerError,
    pub interface_was_created: bool,
}

pub struct StartupSequencer;

impl StartupSequencer {
    pub async fn start(
        driver: &dyn DriverIface,
        event_bus: &dyn EventBus,
        mode_config: &SoftApModeConfiguration,
        rng: &mut impl RngCore,
    ) -> Result<StartupOutcome, StartupFailure> {
        // BSSID randomization (spec §4.4) is resolved once, here, ahead of
        // any band split: dual-band/OWE children are clones of this same
        // resolved config (spec §4.4 "identical to the parent except
        // band"), so both radios end up sharing the one chosen BSSID.
        let mut resolved = mode_config.clone();
        ConfigResolver::randomize_bssid(&mut resolved.config, rng);

        if resolved.config.security == SecurityMode::Owe {
            Self::start_owe(driver, event_bus, &resolved).await
        } else if resolved.config.band == Band::ANY {
            Self::start_dual_band(driver, event_bus, &resolved).await
        } else {
            Self::start_single(driver, event_bus, &resolved).await
        }
    }

    async fn start_single(
        driver: &dyn DriverIface,
        event_bus: &dyn EventBus,
        mode_config: &SoftApModeConfiguration,
    ) -> Result<StartupOutcome, StartupFailure> {
        validate_band_preflight(driver, &mode_config.config, &mode_config.country_code)
            .await
            .map_err(|error| StartupFailure { error, interface_was_created: false })?;

        // step 1
        let iface = driver.setup_interface_for_soft_ap_mode().await.map_err(|e| StartupFailure {
            error: ManagerError::driver_failure("setupInterfaceForSoftApMode", e),
            interface_was_created: false,
        })?;

        // step 2
        let data_iface =
            driver.get_fst_data_interface_name(&iface).await.unwrap_or_else(|| iface.clone());

        // step 3
        event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Enabling,
                prev_state: ApState::Disabled,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data_iface.clone(),
                target_mode: mode_config.target_mode,
            })
            .await;

        // steps 4-9
        match provision_interface(
            driver,
            &iface,
            &mode_config.config,
            &mode_config.capability,
            &mode_config.country_code,
        )
        .await
        {
            Ok(_finalized) => {
                log::info!("soft-ap started on {}", iface);
                Ok(StartupOutcome {
                    ap_interface_name: iface,
                    data_interface_name: data_iface,
                    radio_interfaces: vec![],
                    bridge_interface: None,
                })
            }
            Err(error) => {
                let _ = driver.teardown_interface(&iface).await;
                Err(StartupFailure { error, interface_was_created: true })
            }
        }
    }

    async fn start_dual_band(
        driver: &dyn DriverIface,
        event_bus: &dyn EventBus,
        mode_config: &SoftApModeConfiguration,
    ) -> Result<StartupOutcome, StartupFailure> {
        let (cfg_2ghz, cfg_5ghz) =
            ConfigResolver::dual_band_split(&mode_config.config).map_err(|error| StartupFailure {
                error,
                interface_was_created: false,
            })?;
        Self::start_dual_topology(driver, event_bus, mode_config, (cfg_2ghz, cfg_5ghz)).await
    }

    async fn start_owe(
        driver: &dyn DriverIface,
        event_bus: &dyn EventBus,
        mode_config: &SoftApModeConfiguration,
    ) -> Result<StartupOutcome, StartupFailure> {
        // interface names aren't known until creation, so the transition
        // pair is re-derived with concrete names once both radios exist;
        // placeholder names are used only to decide ordering up front.
        let placeholder = ConfigResolver::owe_transition_pair(&mode_config.config, "", "");
        Self::start_dual_topology(driver, event_bus, mode_config, (placeholder.0, placeholder.1)).await
    }

    /// Shared dual-interface topology: create two radios plus a bridge;
    /// roll all three back together on any failure (spec invariant I4/I5
    /// and property P5).
    async fn start_dual_topology(
        driver: &dyn DriverIface,
        event_bus: &dyn EventBus,
        mode_config: &SoftApModeConfiguration,
        (mut cfg_a, mut cfg_b): (SoftApConfiguration, SoftApConfiguration),
    ) -> Result<StartupOutcome, StartupFailure> {
        for cfg in [&cfg_a, &cfg_b] {
            validate_band_preflight(driver, cfg, &mode_config.country_code)
                .await
                .map_err(|error| StartupFailure { error, interface_was_created: false })?;
        }

        let radio_a = driver.setup_interface_for_soft_ap_mode().await.map_err(|e| StartupFailure {
            error: ManagerError::driver_failure("setupInterfaceForSoftApMode (radio a)", e),
            interface_was_created: false,
        })?;

        let radio_b = match driver.setup_interface_for_soft_ap_mode().await {
            Ok(name) => name,
            Err(e) => {
                let _ = driver.teardown_interface(&radio_a).await;
                return Err(StartupFailure {
                    error: ManagerError::driver_failure("setupInterfaceForSoftApMode (radio b)", e),
                    interface_was_created: true,
                });
            }
        };

        let bridge = match driver.setup_interface_for_bridge_mode().await {
            Ok(name) => name,
            Err(e) => {
                let _ = driver.teardown_interface(&radio_a).await;
                let _ = driver.teardown_interface(&radio_b).await;
                return Err(StartupFailure {
                    error: ManagerError::driver_failure("setupInterfaceForBridgeMode", e),
                    interface_was_created: true,
                });
            }
        };

        // for the OWE path the peer-iface names recorded in the configs
        // depend on the real interface names; re-stamp them now.
        if cfg_a.security == SecurityMode::Owe || cfg_b.security == SecurityMode::Owe {
            if cfg_a.security == SecurityMode::Owe {
                cfg_a.transitional_peer_iface = Some(radio_b.clone());
                cfg_b.transitional_peer_iface = Some(radio_a.clone());
            } else {
                cfg_b.transitional_peer_iface = Some(radio_a.clone());
                cfg_a.transitional_peer_iface = Some(radio_b.clone());
            }
        }

        let data_iface =
            driver.get_fst_data_interface_name(&bridge).await.unwrap_or_else(|| bridge.clone());

        event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Enabling,
                prev_state: ApState::Disabled,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data_iface.clone(),
                target_mode: mode_config.target_mode,
            })
            .await;

        if let Err(error) =
            provision_interface(driver, &radio_a, &cfg_a, &mode_config.capability, &mode_config.country_code)
                .await
        {
            teardown_ifaces(driver, &[&radio_a, &radio_b, &bridge]).await;
            return Err(StartupFailure { error, interface_was_created: true });
        }

        if let Err(error) =
            provision_interface(driver, &radio_b, &cfg_b, &mode_config.capability, &mode_config.country_code)
                .await
        {
            teardown_ifaces(driver, &[&radio_a, &radio_b, &bridge]).await;
            return Err(StartupFailure { error, interface_was_created: true });
        }

        if let Err(e) = driver.bridge_up(&bridge, &[radio_a.clone(), radio_b.clone()]).await {
            teardown_ifaces(driver, &[&radio_a, &radio_b, &bridge]).await;
            return Err(StartupFailure {
                error: ManagerError::driver_failure("bridge up", e),
                interface_was_created: true,
            });
        }

        log::info!("dual-interface soft-ap started: {} + {} (bridge {})", radio_a, radio_b, bridge);
        Ok(StartupOutcome {
            ap_interface_name: bridge.clone(),
            data_interface_name: data_iface,
            radio_interfaces: vec![radio_a, radio_b],
            bridge_interface: Some(bridge),
        })
    }

    /// Tears down a topology on a non-startup failure path (e.g. in-Started
    /// `INTERFACE_DESTROYED`/`FAILURE`), matching invariant I4.
    pub async fn teardown(driver: &dyn DriverIface, outcome: &StartupOutcome) {
        for radio in &outcome.radio_interfaces {
            let _ = driver.teardown_interface(radio).await;
        }
        if let Some(bridge) = &outcome.bridge_interface {
            let _ = driver.teardown_interface(bridge).await;
        }
        if outcome.radio_interfaces.is_empty() && outcome.bridge_interface.is_none() {
            let _ = driver.teardown_interface(&outcome.ap_interface_name).await;
        }
    }
}

/// Checks a single child config's 5GHz preconditions before any interface
/// for it is created: an empty country code or a driver without 5GHz
/// support must fail without ever reaching step 1, so no interface is
/// left behind and only a single `FAILED` is broadcast (spec §7/§8
/// scenario 2). A no-op for non-5GHz configs.
async fn validate_band_preflight(
    driver: &dyn DriverIface,
    config: &SoftApConfiguration,
    country_code: &str,
) -> Result<(), ManagerError> {
    if config.band != Band::FIVE_GHZ {
        return Ok(());
    }
    if country_code.is_empty() {
        return Err(ManagerError::driver_failure_plain("empty country code for a 5GHz interface"));
    }
    if !driver.is_5ghz_band_supported().await {
        return Err(ManagerError::NoChannel("NO_5GHZ_SUPPORT".to_string()));
    }
    Ok(())
}

async fn teardown_ifaces(driver: &dyn DriverIface, ifaces: &[&str]) {
    for iface in ifaces {
        let _ = driver.teardown_interface(iface).await;
    }
}

/// Steps 4-9 of spec §4.5, shared by the single-AP and per-radio dual
/// startup paths.
async fn provision_interface(
    driver: &dyn DriverIface,
    iface: &str,
    config: &SoftApConfiguration,
    capability: &SoftApCapability,
    country_code: &str,
) -> Result<SoftApConfiguration, ManagerError> {
    // step 4: setMacAddress
    match config.bssid {
        Some(mac) => {
            driver
                .set_mac_address(iface, mac)
                .await
                .map_err(|e| ManagerError::driver_failure("setMacAddress", e))?;
        }
        None => {
            let factory = driver
                .get_factory_mac_address(iface)
                .await
                .map_err(|e| ManagerError::driver_failure("getFactoryMacAddress", e))?;
            if let Err(e) = driver.set_mac_address(iface, factory).await {
                log::warn!("best-effort factory MAC reset failed on {}: {}", iface, e);
            }
        }
    }

    // step 5: setCountryCode. The empty-country-code-for-5GHz and
    // driver-5GHz-support checks (step 5/6 preconditions) already ran in
    // `validate_band_preflight` before any interface existed; what's left
    // here is the actual HAL call against this now-created interface.
    let is_5ghz = config.band == Band::FIVE_GHZ;
    if let Err(e) = driver.set_country_code_hal(iface, country_code).await {
        if is_5ghz {
            return Err(ManagerError::driver_failure("setCountryCodeHal", e));
        }
        log::warn!("non-fatal setCountryCodeHal failure on {}: {}", iface, e);
    }

    // step 7: channel/ACS resolution
    let channel = ConfigResolver::resolve_channel(config, capability)?;
    let mut finalized = config.clone();
    finalized.channel = channel;

    // step 8: checkSupportAllConfiguration
    check_support_all_configuration(&finalized, capability)?;

    // step 9: startSoftAp
    driver
        .start_soft_ap(iface, &finalized)
        .await
        .map_err(|e| ManagerError::driver_failure("startSoftAp", e))?;

    Ok(finalized)
}

fn check_support_all_configuration(
    config: &SoftApConfiguration,
    capability: &SoftApCapability,
) -> Result<(), ManagerError> {
    if config.channel != 0 && !capability.channels_for(config.band).contains(&config.channel) {
        return Err(ManagerError::ConfigInvalid(format!(
            "channel {} unsupported for band {:?}",
            config.channel, config.band
        )));
    }
    if config.ssid.is_empty() || config.ssid.len() > 32 {
        return Err(ManagerError::ConfigInvalid("SSID must be 1-32 octets".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityFlags, TargetMode};
    use crate::driver::fake::{FakeDriver, Scripted};
    use crate::event_bus::recording::RecordingEventBus;
    use rand::rngs::mock::StepRng;

    fn capability() -> SoftApCapability {
        SoftApCapability {
            flags: CapabilityFlags::CLIENT_FORCE_DISCONNECT,
            max_clients: 8,
            channels_2ghz: vec![1, 6, 11],
            channels_5ghz: vec![36, 40],
            channels_6ghz: vec![],
            supports_5ghz: true,
        }
    }

    fn mode_config(config: SoftApConfiguration, country_code: &str) -> SoftApModeConfiguration {
        SoftApModeConfiguration {
            target_mode: TargetMode::LocalOnly,
            config,
            capability: capability(),
            country_code: country_code.to_string(),
            platform_default_timeout_ms: 0,
        }
    }

    #[tokio::test]
    async fn single_ap_happy_path() {
        let driver = FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let outcome = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap();
        assert_eq!(outcome.ap_interface_name, "wlan0");
        assert_eq!(driver.started(), vec!["wlan0".to_string()]);
        assert!(driver.torn_down().is_empty());
    }

    #[tokio::test]
    async fn five_ghz_without_country_code_fails_before_any_interface_created() {
        let driver = FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::FIVE_GHZ);
        let mc = mode_config(cfg, "");
        let mut rng = StepRng::new(0, 1);

        let err = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap_err();
        assert!(!err.interface_was_created);
        assert!(driver.started().is_empty());
        assert!(driver.torn_down().is_empty());
    }

    #[tokio::test]
    async fn five_ghz_without_driver_support_is_no_channel() {
        let driver = FakeDriver::new(Scripted { supports_5ghz: false, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::FIVE_GHZ);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let err = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap_err();
        match err.error {
            ManagerError::NoChannel(msg) => assert!(msg.contains("NO_5GHZ_SUPPORT")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn setup_interface_failure_is_pre_interface() {
        let driver = FakeDriver::new(Scripted { fail_setup_soft_ap: true, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let err = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap_err();
        assert!(!err.interface_was_created);
    }

    #[tokio::test]
    async fn dual_band_creates_three_interfaces_and_starts_both_radios() {
        let driver = FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::ANY);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let outcome = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap();
        assert_eq!(outcome.radio_interfaces.len(), 2);
        assert_eq!(outcome.bridge_interface, Some("br0".to_string()));
        assert_eq!(driver.started().len(), 2);
    }

    #[tokio::test]
    async fn dual_band_rolls_back_all_three_on_bridge_up_failure() {
        let driver = FakeDriver::new(Scripted {
            supports_5ghz: true,
            fail_bridge_up: true,
            ..Default::default()
        });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::ANY);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let err = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap_err();
        assert!(err.interface_was_created);
        let mut torn_down = driver.torn_down();
        torn_down.sort();
        assert_eq!(torn_down, vec!["br0".to_string(), "wlan0".to_string(), "wlan1".to_string()]);
    }

    #[tokio::test]
    async fn owe_transition_creates_hidden_and_open_pair() {
        let driver = FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() });
        let bus = RecordingEventBus::new();
        let cfg = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Owe, Band::TWO_GHZ);
        let mc = mode_config(cfg, "US");
        let mut rng = StepRng::new(0, 1);

        let outcome = StartupSequencer::start(&driver, &bus, &mc, &mut rng).await.unwrap();
        assert_eq!(outcome.radio_interfaces.len(), 2);
        assert!(outcome.bridge_interface.is_some());
    }
}
