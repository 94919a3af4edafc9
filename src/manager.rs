// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The public Soft-AP `Manager` API (spec §6). A thin wrapper around the
//! FSM's mailbox plus the one piece of state that lives outside it: role
//! assignment, which is once-only (invariant I6) and not part of either
//! state's message table.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{Role, SoftApCapability, SoftApConfiguration, SoftApModeConfiguration};
use crate::config_store::ApConfigStore;
use crate::demux::DriverEventDemux;
use crate::driver::DriverIface;
use crate::event_bus::EventBus;
use crate::fsm::{DumpSnapshot, Message, SoftApStateMachine};

const MAILBOX_CAPACITY: usize = 64;

pub struct Manager {
    mailbox_tx: mpsc::Sender<Message>,
    role: Mutex<Role>,
    config_store: Arc<dyn ApConfigStore>,
}

impl Manager {
    /// Builds the FSM, spawns its mailbox loop, and returns the public
    /// handle alongside the demux a driver adapter should register its
    /// callbacks with. `fsm_task` is returned so a caller that wants to
    /// await full shutdown can join it; dropping it just detaches the task.
    pub fn spawn(
        driver: Arc<dyn DriverIface>,
        event_bus: Arc<dyn EventBus>,
        config_store: Arc<dyn ApConfigStore>,
        mode_config: SoftApModeConfiguration,
    ) -> (Arc<Manager>, DriverEventDemux, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let fsm = SoftApStateMachine::new(driver, event_bus, mode_config, tx.clone(), rx);
        let fsm_task = tokio::spawn(fsm.run());
        let demux = DriverEventDemux::new(tx.clone());
        let manager =
            Arc::new(Manager { mailbox_tx: tx, role: Mutex::new(Role::Unspecified), config_store });
        (manager, demux, fsm_task)
    }

    pub async fn start(&self) {
        let _ = self.mailbox_tx.send(Message::Start).await;
    }

    /// Spec §6: a stop with nothing running is a no-op (P7) — the FSM's
    /// Idle branch silently drops an unhandled message, so there is
    /// nothing further to special-case here.
    pub async fn stop(&self) {
        let _ = self.mailbox_tx.send(Message::Stop).await;
    }

    pub async fn update_capability(&self, capability: SoftApCapability) {
        let _ = self.mailbox_tx.send(Message::UpdateCapability(capability)).await;
    }

    /// Persists the new configuration before enqueueing it, so a crash
    /// between the two still leaves the store consistent with what was
    /// requested rather than with stale FSM state.
    pub async fn update_configuration(&self, config: SoftApConfiguration) {
        self.config_store.store(&config).await;
        let _ = self.mailbox_tx.send(Message::UpdateConfig(Box::new(config))).await;
    }

    pub fn get_role(&self) -> Role {
        *self.role.lock()
    }

    /// Assigns the role exactly once from `Unspecified` (invariant I6).
    /// Returns `false`, leaving the current role untouched, if a role was
    /// already assigned.
    pub fn set_role(&self, role: Role) -> bool {
        let mut current = self.role.lock();
        if *current != Role::Unspecified {
            return false;
        }
        *current = role;
        true
    }

    /// Writes the diagnostic snapshot described in spec §6. Returns
    /// without error (writing a one-line placeholder) if the FSM mailbox
    /// has already shut down.
    pub async fn dump(&self, writer: &mut dyn std::fmt::Write) -> std::fmt::Result {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.mailbox_tx.send(Message::Dump(reply_tx)).await.is_err() {
            return writeln!(writer, "soft-ap manager: fsm mailbox closed");
        }
        match reply_rx.await {
            Ok(snapshot) => write_dump(writer, &snapshot, self.get_role()),
            Err(_) => writeln!(writer, "soft-ap manager: fsm mailbox closed"),
        }
    }
}

fn write_dump(writer: &mut dyn std::fmt::Write, snapshot: &DumpSnapshot, role: Role) -> std::fmt::Result {
    writeln!(writer, "state: {}", snapshot.state_name)?;
    writeln!(writer, "role: {:?}", role)?;
    writeln!(writer, "ap_interface: {}", snapshot.ap_interface_name)?;
    writeln!(writer, "data_interface: {}", snapshot.data_interface_name)?;
    writeln!(writer, "iface_up: {}", snapshot.iface_up)?;
    writeln!(writer, "country_code: {}", snapshot.country_code)?;
    writeln!(writer, "target_mode: {:?}", snapshot.target_mode)?;
    writeln!(writer, "ssid: {}", String::from_utf8_lossy(&snapshot.ssid))?;
    writeln!(writer, "band: {:?}", snapshot.band)?;
    writeln!(writer, "hidden_ssid: {}", snapshot.hidden_ssid)?;
    writeln!(writer, "client_count: {}", snapshot.client_count)?;
    writeln!(writer, "auto_shutdown_enabled: {}", snapshot.auto_shutdown_enabled)?;
    writeln!(writer, "current_info: {:?}", snapshot.current_info)?;
    writeln!(writer, "start_timestamp_ms: {:?}", snapshot.start_timestamp_ms)?;
    writeln!(writer, "fsm_log:")?;
    for entry in &snapshot.fsm_log {
        writeln!(writer, "  {}", entry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Band, SecurityMode, SoftApCapability as Capability, TargetMode};
    use crate::config_store::StaticApConfigStore;
    use crate::driver::fake::{FakeDriver, Scripted};
    use crate::event_bus::recording::RecordingEventBus;

    fn capability() -> Capability {
        Capability {
            flags: crate::config::CapabilityFlags::CLIENT_FORCE_DISCONNECT,
            max_clients: 4,
            channels_2ghz: vec![1, 6, 11],
            channels_5ghz: vec![36],
            channels_6ghz: vec![],
            supports_5ghz: true,
        }
    }

    fn mode_config() -> SoftApModeConfiguration {
        SoftApModeConfiguration {
            target_mode: TargetMode::LocalOnly,
            config: SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ),
            capability: capability(),
            country_code: "US".to_string(),
            platform_default_timeout_ms: 0,
        }
    }

    #[tokio::test]
    async fn role_is_assignable_exactly_once() {
        let driver: Arc<dyn DriverIface> =
            Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus: Arc<dyn EventBus> = Arc::new(RecordingEventBus::new());
        let store: Arc<dyn ApConfigStore> = Arc::new(StaticApConfigStore::new());
        let (manager, _demux, _task) = Manager::spawn(driver, bus, store, mode_config());

        assert_eq!(manager.get_role(), Role::Unspecified);
        assert!(manager.set_role(Role::Primary));
        assert_eq!(manager.get_role(), Role::Primary);
        assert!(!manager.set_role(Role::Secondary));
        assert_eq!(manager.get_role(), Role::Primary);
    }

    #[tokio::test]
    async fn dump_on_idle_reports_idle_state() {
        let driver: Arc<dyn DriverIface> = Arc::new(FakeDriver::new(Scripted::default()));
        let bus: Arc<dyn EventBus> = Arc::new(RecordingEventBus::new());
        let store: Arc<dyn ApConfigStore> = Arc::new(StaticApConfigStore::new());
        let (manager, _demux, _task) = Manager::spawn(driver, bus, store, mode_config());

        let mut out = String::new();
        manager.dump(&mut out).await.unwrap();
        assert!(out.contains("state: Idle"));
        assert!(out.contains("ssid: foo"));
    }

    #[tokio::test]
    async fn start_then_stop_round_trip_produces_no_panics() {
        let driver: Arc<dyn DriverIface> =
            Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus: Arc<dyn EventBus> = Arc::new(RecordingEventBus::new());
        let store: Arc<dyn ApConfigStore> = Arc::new(StaticApConfigStore::new());
        let (manager, _demux, _task) = Manager::spawn(driver, bus, store, mode_config());

        manager.start().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        manager.stop().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let mut out = String::new();
        manager.dump(&mut out).await.unwrap();
        assert!(out.contains("state: Idle"));
    }
}
