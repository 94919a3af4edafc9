// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The native driver adapter (hostapd/nl80211 wrapper) seam. Its
//! implementation is explicitly out of scope (spec §1); this module only
//! defines the trait the rest of the Manager is built against, plus a fake
//! used by tests (gated behind the `test-util` feature so integration
//! tests in `tests/` can reuse it).

use async_trait::async_trait;

use crate::config::{Mac, SoftApConfiguration};
use crate::roster::BlockReason;

/// Opaque native driver adapter (spec §6 `DriverIface`).
#[async_trait]
pub trait DriverIface: Send + Sync {
    /// Creates a single-radio Soft-AP interface, returning its name.
    async fn setup_interface_for_soft_ap_mode(&self) -> anyhow::Result<String>;

    /// Creates the bridge interface used by dual-band/OWE topologies.
    async fn setup_interface_for_bridge_mode(&self) -> anyhow::Result<String>;

    async fn teardown_interface(&self, iface: &str) -> anyhow::Result<()>;

    async fn start_soft_ap(&self, iface: &str, config: &SoftApConfiguration) -> anyhow::Result<()>;

    async fn set_mac_address(&self, iface: &str, mac: Mac) -> anyhow::Result<()>;

    async fn get_factory_mac_address(&self, iface: &str) -> anyhow::Result<Mac>;

    async fn set_country_code_hal(&self, iface: &str, country_code: &str) -> anyhow::Result<()>;

    async fn is_5ghz_band_supported(&self) -> bool;

    async fn is_interface_up(&self, iface: &str) -> anyhow::Result<bool>;

    async fn force_client_disconnect(
        &self,
        iface: &str,
        mac: Mac,
        reason: BlockReason,
    ) -> anyhow::Result<()>;

    async fn set_hostapd_params(&self, iface: &str, cmd: &str) -> anyhow::Result<()>;

    async fn get_fst_data_interface_name(&self, iface: &str) -> Option<String>;

    /// Dual-band-specific "bridge up" command, issued once both radio
    /// interfaces have individually completed startup (spec §4.5).
    async fn bridge_up(&self, bridge_iface: &str, radio_ifaces: &[String]) -> anyhow::Result<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Which call should be made to fail, and how.
    #[derive(Clone, Debug, Default)]
    pub struct Scripted {
        pub fail_setup_soft_ap: bool,
        pub fail_setup_bridge: bool,
        pub fail_set_mac_address: bool,
        pub fail_factory_mac: bool,
        pub fail_country_code: bool,
        pub supports_5ghz: bool,
        pub fail_start_soft_ap: bool,
        pub fail_bridge_up: bool,
        pub factory_mac: Option<Mac>,
    }

    #[derive(Default)]
    struct Recorded {
        torn_down: Vec<String>,
        started: Vec<String>,
        forced_disconnects: Vec<(String, Mac, BlockReason)>,
        mac_addresses: HashMap<String, Mac>,
    }

    /// A scriptable, in-memory `DriverIface` for unit and integration
    /// tests. Interface names are synthesized (`wlan0`, `wlan1`, `br0`, ...)
    /// in creation order.
    pub struct FakeDriver {
        pub script: Mutex<Scripted>,
        next_radio: AtomicU32,
        next_bridge: AtomicU32,
        recorded: Mutex<Recorded>,
    }

    impl FakeDriver {
        pub fn new(script: Scripted) -> Self {
            FakeDriver {
                script: Mutex::new(script),
                next_radio: AtomicU32::new(0),
                next_bridge: AtomicU32::new(0),
                recorded: Mutex::new(Recorded::default()),
            }
        }

        pub fn torn_down(&self) -> Vec<String> {
            self.recorded.lock().torn_down.clone()
        }

        pub fn started(&self) -> Vec<String> {
            self.recorded.lock().started.clone()
        }

        pub fn forced_disconnects(&self) -> Vec<(String, Mac, BlockReason)> {
            self.recorded.lock().forced_disconnects.clone()
        }
    }

    #[async_trait]
    impl DriverIface for FakeDriver {
        async fn setup_interface_for_soft_ap_mode(&self) -> anyhow::Result<String> {
            if self.script.lock().fail_setup_soft_ap {
                anyhow::bail!("setupInterfaceForSoftApMode failed");
            }
            let n = self.next_radio.fetch_add(1, Ordering::SeqCst);
            Ok(format!("wlan{}", n))
        }

        async fn setup_interface_for_bridge_mode(&self) -> anyhow::Result<String> {
            if self.script.lock().fail_setup_bridge {
                anyhow::bail!("setupInterfaceForBridgeMode failed");
            }
            let n = self.next_bridge.fetch_add(1, Ordering::SeqCst);
            Ok(format!("br{}", n))
        }

        async fn teardown_interface(&self, iface: &str) -> anyhow::Result<()> {
            self.recorded.lock().torn_down.push(iface.to_string());
            Ok(())
        }

        async fn start_soft_ap(&self, iface: &str, _config: &SoftApConfiguration) -> anyhow::Result<()> {
            if self.script.lock().fail_start_soft_ap {
                anyhow::bail!("startSoftAp failed");
            }
            self.recorded.lock().started.push(iface.to_string());
            Ok(())
        }

        async fn set_mac_address(&self, iface: &str, mac: Mac) -> anyhow::Result<()> {
            if self.script.lock().fail_set_mac_address {
                anyhow::bail!("setMacAddress failed");
            }
            self.recorded.lock().mac_addresses.insert(iface.to_string(), mac);
            Ok(())
        }

        async fn get_factory_mac_address(&self, _iface: &str) -> anyhow::Result<Mac> {
            let script = self.script.lock();
            if script.fail_factory_mac {
                anyhow::bail!("getFactoryMacAddress failed");
            }
            Ok(script.factory_mac.unwrap_or(Mac([0xaa, 0, 0, 0, 0, 0])))
        }

        async fn set_country_code_hal(&self, _iface: &str, country_code: &str) -> anyhow::Result<()> {
            if self.script.lock().fail_country_code {
                anyhow::bail!("setCountryCodeHal failed");
            }
            let _ = country_code;
            Ok(())
        }

        async fn is_5ghz_band_supported(&self) -> bool {
            self.script.lock().supports_5ghz
        }

        async fn is_interface_up(&self, _iface: &str) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn force_client_disconnect(
            &self,
            iface: &str,
            mac: Mac,
            reason: BlockReason,
        ) -> anyhow::Result<()> {
            self.recorded.lock().forced_disconnects.push((iface.to_string(), mac, reason));
            Ok(())
        }

        async fn set_hostapd_params(&self, _iface: &str, _cmd: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_fst_data_interface_name(&self, _iface: &str) -> Option<String> {
            None
        }

        async fn bridge_up(&self, _bridge_iface: &str, _radio_ifaces: &[String]) -> anyhow::Result<()> {
            if self.script.lock().fail_bridge_up {
                anyhow::bail!("bridge up failed");
            }
            Ok(())
        }
    }
}
