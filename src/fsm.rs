// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C6: the two-state Soft-AP FSM (spec §4.6). Every external command and
//! driver event is a `Message` processed one at a time, FIFO, by a single
//! actor task — this is the serialized mailbox described in spec §5.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot};

use crate::clock::Clock;
use crate::config::{
    Band, Bandwidth, Client, Mac, SoftApCapability, SoftApConfiguration, SoftApInfo,
    SoftApModeConfiguration, TargetMode,
};
use crate::driver::DriverIface;
use crate::error::ManagerError;
use crate::event_bus::{ApState, EventBus, StateChangeBroadcast};
use crate::roster::{AdmitOutcome, BlockReason, ClientRoster};
use crate::sequencer::{StartupFailure, StartupOutcome, StartupSequencer};
use crate::timer::{resolve_timeout_ms, ShutdownTimer};

const FSM_LOG_CAPACITY: usize = 64;

/// Everything a caller may enqueue into the FSM's mailbox: public-API
/// commands and normalized driver events (spec §2 data flow, §4.6).
pub enum Message {
    Start,
    Stop,
    UpdateCapability(SoftApCapability),
    UpdateConfig(Box<SoftApConfiguration>),
    AssociatedStationsChanged { client: Client, connected: bool },
    ConnectedStations { mac: Mac },
    DisconnectedStations { mac: Mac },
    SoftApChannelSwitched { frequency: u32, bandwidth: Bandwidth },
    InterfaceStatusChanged { up: bool },
    NoAssociatedStationsTimeout,
    InterfaceDestroyed,
    DualSapInterfaceDestroyed { iface: String },
    Failure,
    InterfaceDown,
    Dump(oneshot::Sender<DumpSnapshot>),
}

#[derive(Clone, Debug)]
pub struct DumpSnapshot {
    pub state_name: &'static str,
    pub ap_interface_name: String,
    pub data_interface_name: String,
    pub iface_up: bool,
    pub country_code: String,
    pub target_mode: TargetMode,
    pub ssid: Vec<u8>,
    pub band: Band,
    pub hidden_ssid: bool,
    pub client_count: usize,
    pub auto_shutdown_enabled: bool,
    pub current_info: SoftApInfo,
    pub start_timestamp_ms: Option<u64>,
    pub fsm_log: Vec<String>,
}

struct StartedData {
    outcome: StartupOutcome,
    ap_iface_up: bool,
    data_iface_up: bool,
    iface_destroyed: bool,
    roster: ClientRoster,
    timer: ShutdownTimer,
    info: SoftApInfo,
    start_timestamp_ms: u64,
    /// Legacy count-only path (spec §9 open question); kept side-by-side
    /// with the roster-based path. Drives its own literal per-message
    /// timer actions (cancel on CONNECTED_STATIONS, schedule on
    /// DISCONNECTED_STATIONS reaching zero) independently of the roster —
    /// see DESIGN.md for what "authoritative" does and doesn't cover here.
    legacy_sta_count: u32,
}

enum Phase {
    Idle,
    Started(StartedData),
}

/// The FSM actor. Owns all mutable Manager state exclusively; every other
/// handle into the Manager (`Manager`, `DriverEventDemux`) only ever talks
/// to it by sending `Message`s through `mailbox_tx`.
pub struct SoftApStateMachine {
    driver: Arc<dyn DriverIface>,
    event_bus: Arc<dyn EventBus>,
    clock: Clock,
    rng: StdRng,
    mailbox_tx: mpsc::Sender<Message>,
    mailbox_rx: mpsc::Receiver<Message>,

    target_mode: TargetMode,
    config: SoftApConfiguration,
    capability: SoftApCapability,
    country_code: String,
    platform_default_timeout_ms: u64,

    phase: Phase,
    log: VecDeque<String>,
}

impl SoftApStateMachine {
    pub fn new(
        driver: Arc<dyn DriverIface>,
        event_bus: Arc<dyn EventBus>,
        mode_config: SoftApModeConfiguration,
        mailbox_tx: mpsc::Sender<Message>,
        mailbox_rx: mpsc::Receiver<Message>,
    ) -> Self {
        SoftApStateMachine {
            driver,
            event_bus,
            clock: Clock::new(),
            rng: StdRng::from_entropy(),
            mailbox_tx,
            mailbox_rx,
            target_mode: mode_config.target_mode,
            config: mode_config.config,
            capability: mode_config.capability,
            country_code: mode_config.country_code,
            platform_default_timeout_ms: mode_config.platform_default_timeout_ms,
            phase: Phase::Idle,
            log: VecDeque::with_capacity(FSM_LOG_CAPACITY),
        }
    }

    fn record(&mut self, entry: impl Into<String>) {
        if self.log.len() == FSM_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(entry.into());
    }

    fn record_metric(&self, name: &str) {
        // The metrics sink is out of scope (spec §1); metrics are logged
        // so a host can wire a real sink by scraping this log, the way the
        // teacher crate leaves Cobalt calls as simple log lines in tests.
        log::debug!("metric: {}", name);
    }

    /// Drains the mailbox until the sender side is dropped (i.e. every
    /// `Manager`/`DriverEventDemux` handle has gone away), processing one
    /// message at a time to completion (spec §5: no suspension points span
    /// multiple messages).
    pub async fn run(mut self) {
        while let Some(message) = self.mailbox_rx.recv().await {
            self.handle(message).await;
        }
    }

    async fn handle(&mut self, message: Message) {
        if let Message::Dump(reply) = message {
            let _ = reply.send(self.dump_snapshot());
            return;
        }
        self.dispatch(message).await;
    }

    async fn dispatch(&mut self, message: Message) {
        // Idle and Started are mutually exclusive branches; `phase` is
        // taken out so handlers can freely transition it.
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => self.handle_idle(message).await,
            Phase::Started(data) => self.handle_started(message, data).await,
        }
    }

    // ---- Idle -------------------------------------------------------

    async fn handle_idle(&mut self, message: Message) {
        match message {
            Message::Start => self.start_from_idle().await,
            Message::UpdateCapability(cap) => {
                if self.target_mode == TargetMode::Tethered {
                    self.capability = cap;
                }
                self.phase = Phase::Idle;
            }
            Message::UpdateConfig(cfg) => {
                self.config = *cfg;
                self.phase = Phase::Idle;
            }
            _ => {
                log::debug!("ignoring message in Idle");
                self.phase = Phase::Idle;
            }
        }
    }

    async fn start_from_idle(&mut self) {
        self.record("Idle -> START");
        let mode_config = SoftApModeConfiguration {
            target_mode: self.target_mode,
            config: self.config.clone(),
            capability: self.capability.clone(),
            country_code: self.country_code.clone(),
            platform_default_timeout_ms: self.platform_default_timeout_ms,
        };

        match StartupSequencer::start(&*self.driver, &*self.event_bus, &mode_config, &mut self.rng).await {
            Ok(outcome) => {
                log::info!("soft-ap started: {}", outcome.ap_interface_name);
                self.enter_started(outcome).await;
            }
            Err(StartupFailure { error, interface_was_created }) => {
                self.fail_startup(error, interface_was_created).await;
                self.phase = Phase::Idle;
            }
        }
    }

    async fn fail_startup(&mut self, error: ManagerError, interface_was_created: bool) {
        let reason = error.to_failure_reason();
        let description = error.description();
        log::error!("soft-ap startup failed: {}", description);
        self.record(format!("START failed: {}", description));

        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Failed,
                prev_state: ApState::Enabling,
                failure_reason: Some(reason),
                failure_description: Some(description.clone()),
                data_interface_name: String::new(),
                target_mode: self.target_mode,
            })
            .await;

        if interface_was_created {
            self.event_bus
                .on_state_changed(StateChangeBroadcast {
                    new_state: ApState::Disabling,
                    prev_state: ApState::Failed,
                    failure_reason: None,
                    failure_description: None,
                    data_interface_name: String::new(),
                    target_mode: self.target_mode,
                })
                .await;
            self.event_bus
                .on_state_changed(StateChangeBroadcast {
                    new_state: ApState::Disabled,
                    prev_state: ApState::Disabling,
                    failure_reason: None,
                    failure_description: None,
                    data_interface_name: String::new(),
                    target_mode: self.target_mode,
                })
                .await;
        }

        self.record_metric("soft_ap_start_failure");
        self.event_bus.on_start_failure(reason, Some(description)).await;
    }

    // ---- Started ------------------------------------------------------

    async fn enter_started(&mut self, outcome: StartupOutcome) {
        let ap_name = outcome.ap_interface_name.clone();
        let data_name = outcome.data_interface_name.clone();
        let mut data = StartedData {
            outcome,
            ap_iface_up: false,
            data_iface_up: false,
            iface_destroyed: false,
            roster: ClientRoster::new(),
            timer: ShutdownTimer::new(),
            info: SoftApInfo::DOWN,
            start_timestamp_ms: self.clock.now_ms(),
            legacy_sta_count: 0,
        };
        self.reschedule_timer(&mut data);
        self.record("Idle -> Started");

        // Started.entry probes both interfaces directly (spec §4.6): a
        // driver whose interface is already up by the time startup
        // completes must still reach ENABLED here, since `handle_idle`
        // would otherwise have to wait on a status event that may never
        // arrive. Each probe result is routed through the same
        // up-transition handling a later `InterfaceStatusChanged` uses, so
        // a driver that reports "not yet up" still reaches ENABLED once
        // that event lands.
        let ap_up = self.probe_interface_up(&ap_name).await;
        self.apply_ap_iface_up(&mut data, ap_up).await;
        let data_up = self.probe_interface_up(&data_name).await;
        self.apply_data_iface_up(&mut data, data_up).await;

        self.phase = Phase::Started(data);
    }

    async fn probe_interface_up(&self, iface: &str) -> bool {
        match self.driver.is_interface_up(iface).await {
            Ok(up) => up,
            Err(e) => {
                log::warn!("is_interface_up probe failed for {}: {}", iface, e);
                false
            }
        }
    }

    fn should_arm_timer(&self, data: &StartedData) -> bool {
        self.config.auto_shutdown && data.roster.is_empty()
    }

    fn reschedule_timer(&mut self, data: &mut StartedData) {
        if self.should_arm_timer(data) {
            let timeout_ms = resolve_timeout_ms(self.config.shutdown_timeout_ms, self.platform_default_timeout_ms);
            data.timer.arm(Duration::from_millis(timeout_ms), self.mailbox_tx.clone());
        } else {
            data.timer.cancel();
        }
    }

    async fn handle_started(&mut self, message: Message, mut data: StartedData) {
        match message {
            Message::Start => {
                self.phase = Phase::Started(data);
            }
            Message::Stop => {
                self.on_stop(data).await;
            }
            Message::AssociatedStationsChanged { client, connected } => {
                self.on_associated_stations_changed(&mut data, client, connected).await;
                self.phase = Phase::Started(data);
            }
            Message::ConnectedStations { mac } => {
                data.legacy_sta_count += 1;
                self.event_bus.on_sta_connected(mac, data.legacy_sta_count).await;
                if data.legacy_sta_count > 0 {
                    data.timer.cancel();
                }
                self.phase = Phase::Started(data);
            }
            Message::DisconnectedStations { mac } => {
                data.legacy_sta_count = data.legacy_sta_count.saturating_sub(1);
                self.event_bus.on_sta_disconnected(mac, data.legacy_sta_count).await;
                if data.legacy_sta_count == 0 && self.config.auto_shutdown {
                    let timeout_ms =
                        resolve_timeout_ms(self.config.shutdown_timeout_ms, self.platform_default_timeout_ms);
                    data.timer.arm(Duration::from_millis(timeout_ms), self.mailbox_tx.clone());
                }
                self.phase = Phase::Started(data);
            }
            Message::SoftApChannelSwitched { frequency, bandwidth } => {
                self.on_channel_switched(&mut data, frequency, bandwidth).await;
                self.phase = Phase::Started(data);
            }
            Message::InterfaceStatusChanged { up } => {
                self.on_interface_status_changed(&mut data, up).await;
                self.phase = Phase::Started(data);
            }
            Message::NoAssociatedStationsTimeout => {
                self.on_shutdown_timeout(data).await;
            }
            Message::InterfaceDestroyed => {
                self.on_interface_destroyed(data).await;
            }
            Message::DualSapInterfaceDestroyed { iface } => {
                self.on_dual_peer_destroyed(&mut data, &iface).await;
                self.phase = Phase::Started(data);
            }
            Message::Failure | Message::InterfaceDown => {
                self.on_fatal_driver_event(data).await;
            }
            Message::UpdateCapability(cap) => {
                if self.target_mode == TargetMode::Tethered {
                    self.capability = cap;
                    let evictions = data.roster.reconcile(&self.config, &self.capability);
                    self.request_evictions(&data, evictions).await;
                }
                self.phase = Phase::Started(data);
            }
            Message::UpdateConfig(new_config) => {
                self.on_update_config_started(&mut data, *new_config).await;
                self.phase = Phase::Started(data);
            }
            Message::Dump(_) => unreachable!("handled in handle()"),
        }
    }

    async fn on_associated_stations_changed(&mut self, data: &mut StartedData, client: Client, connected: bool) {
        let changed = if connected {
            match data.roster.admit(client, &self.config) {
                AdmitOutcome::DuplicateNoop => {
                    log::error!("duplicate admission for already-connected client {}", client.mac);
                    false
                }
                AdmitOutcome::Rejected { reason, emit_blocked_event } => {
                    let _ = self
                        .driver
                        .force_client_disconnect(&data.outcome.ap_interface_name, client.mac, reason)
                        .await;
                    if emit_blocked_event {
                        self.event_bus.on_blocked_client_connecting(client, reason).await;
                    }
                    false
                }
                AdmitOutcome::Admitted => {
                    let effective_max = self.config.effective_max_clients(&self.capability);
                    match data.roster.try_insert(client, effective_max) {
                        AdmitOutcome::Admitted => true,
                        AdmitOutcome::Rejected { reason, emit_blocked_event } => {
                            let _ = self
                                .driver
                                .force_client_disconnect(&data.outcome.ap_interface_name, client.mac, reason)
                                .await;
                            if emit_blocked_event {
                                self.event_bus.on_blocked_client_connecting(client, reason).await;
                            }
                            false
                        }
                        AdmitOutcome::DuplicateNoop => false,
                    }
                }
            }
        } else {
            data.roster.remove(client)
        };

        if changed {
            self.event_bus.on_connected_clients_changed(data.roster.snapshot()).await;
            self.record_metric("connected_clients_changed");
            self.reschedule_timer(data);
        }
    }

    async fn on_channel_switched(&mut self, data: &mut StartedData, frequency: u32, bandwidth: Bandwidth) {
        let new_info = SoftApInfo { frequency, bandwidth };
        if new_info == data.info {
            return; // spec P8: unchanged info emits nothing further.
        }
        data.info = new_info;
        self.event_bus.on_info_changed(new_info).await;
        if frequency > 0 && bandwidth != Bandwidth::Invalid {
            self.record_metric("channel_switch");
            self.record_metric("band_preference_check");
        }
    }

    /// A driver event carrying a single combined up/down signal for the
    /// interface pair (spec §4.6 `InterfaceStatusChanged`); routed through
    /// the same per-interface transition handling the Started.entry probes
    /// use below.
    async fn on_interface_status_changed(&mut self, data: &mut StartedData, up: bool) {
        self.apply_ap_iface_up(data, up).await;
        self.apply_data_iface_up(data, up).await;
    }

    async fn apply_ap_iface_up(&mut self, data: &mut StartedData, up: bool) {
        let was_up = data.ap_iface_up && data.data_iface_up;
        data.ap_iface_up = up;
        self.maybe_announce_enabled(data, was_up).await;
    }

    async fn apply_data_iface_up(&mut self, data: &mut StartedData, up: bool) {
        let was_up = data.ap_iface_up && data.data_iface_up;
        data.data_iface_up = up;
        self.maybe_announce_enabled(data, was_up).await;
    }

    async fn maybe_announce_enabled(&mut self, data: &mut StartedData, was_up: bool) {
        let is_up = data.ap_iface_up && data.data_iface_up;
        if was_up || !is_up {
            return;
        }
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Enabled,
                prev_state: ApState::Enabling,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.event_bus.on_started().await;
        self.record_metric("soft_ap_start_success");
        self.event_bus.on_connected_clients_changed(data.roster.snapshot()).await;
    }

    async fn on_shutdown_timeout(&mut self, mut data: StartedData) {
        if !self.config.auto_shutdown || !data.roster.is_empty() {
            log::error!("spurious shutdown timeout: auto_shutdown={} roster_len={}", self.config.auto_shutdown, data.roster.len());
            self.phase = Phase::Started(data);
            return;
        }
        self.record("Started -> Idle (shutdown timeout)");
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Disabling,
                prev_state: ApState::Enabled,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.exit_started(&mut data, false).await;
    }

    /// User-initiated `stop()` (spec §6): publishes DISABLING from ENABLED
    /// when the interface is already up, else from ENABLING (a stop
    /// requested mid-startup), then runs the same exit path as any other
    /// Started→Idle transition.
    async fn on_stop(&mut self, mut data: StartedData) {
        self.record("Started -> Idle (stop requested)");
        let prev_state = if data.ap_iface_up && data.data_iface_up {
            ApState::Enabled
        } else {
            ApState::Enabling
        };
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Disabling,
                prev_state,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.exit_started(&mut data, false).await;
    }

    async fn on_interface_destroyed(&mut self, mut data: StartedData) {
        if !data.outcome.radio_interfaces.is_empty() {
            StartupSequencer::teardown(&*self.driver, &data.outcome).await;
        }
        data.iface_destroyed = true;
        self.record("Started -> Idle (interface destroyed)");
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Disabling,
                prev_state: ApState::Enabled,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.exit_started(&mut data, true).await;
    }

    async fn on_dual_peer_destroyed(&mut self, data: &mut StartedData, destroyed_iface: &str) {
        if data.iface_destroyed {
            return;
        }
        for radio in data.outcome.radio_interfaces.clone() {
            if radio != destroyed_iface {
                let _ = self.driver.teardown_interface(&radio).await;
            }
        }
        if let Some(bridge) = &data.outcome.bridge_interface {
            let _ = self.driver.teardown_interface(bridge).await;
        }
        data.iface_destroyed = true;
    }

    async fn on_fatal_driver_event(&mut self, mut data: StartedData) {
        self.record("Started -> FAILED -> Idle");
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Failed,
                prev_state: ApState::Enabled,
                failure_reason: Some(crate::error::FailureReason::General),
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Disabling,
                prev_state: ApState::Failed,
                failure_reason: None,
                failure_description: None,
                data_interface_name: data.outcome.data_interface_name.clone(),
                target_mode: self.target_mode,
            })
            .await;
        self.exit_started(&mut data, false).await;
    }

    async fn request_evictions(&self, data: &StartedData, evictions: Vec<Client>) {
        for client in evictions {
            let _ = self
                .driver
                .force_client_disconnect(&data.outcome.ap_interface_name, client.mac, BlockReason::NoMoreStas)
                .await;
        }
    }

    async fn on_update_config_started(&mut self, data: &mut StartedData, new_config: SoftApConfiguration) {
        if config_change_requires_restart(&self.config, &new_config) {
            log::info!("config change requires restart; ignoring while Started");
            return;
        }
        let timer_relevant_changed = self.config.shutdown_timeout_ms != new_config.shutdown_timeout_ms
            || self.config.auto_shutdown != new_config.auto_shutdown;
        self.config = new_config;
        let evictions = data.roster.reconcile(&self.config, &self.capability);
        self.request_evictions(data, evictions).await;
        if timer_relevant_changed {
            self.reschedule_timer(data);
        }
    }

    /// Runs `Started.exit` (spec §4.6): stop the driver if not already
    /// destroyed, clear the roster, cancel the timer, publish
    /// `DISABLED`, clear interface names, reset role/info, emit
    /// `onStopped`.
    async fn exit_started(&mut self, data: &mut StartedData, already_destroyed: bool) {
        if !already_destroyed && !data.iface_destroyed {
            StartupSequencer::teardown(&*self.driver, &data.outcome).await;
        }
        let cleared = data.roster.clear();
        if !cleared.is_empty() {
            self.event_bus.on_connected_clients_changed(Vec::new()).await;
        }
        data.timer.cancel();

        self.event_bus
            .on_state_changed(StateChangeBroadcast {
                new_state: ApState::Disabled,
                prev_state: ApState::Disabling,
                failure_reason: None,
                failure_description: None,
                data_interface_name: String::new(),
                target_mode: self.target_mode,
            })
            .await;

        self.phase = Phase::Idle;
        self.event_bus.on_stopped().await;
    }

    fn dump_snapshot(&self) -> DumpSnapshot {
        match &self.phase {
            Phase::Idle => DumpSnapshot {
                state_name: "Idle",
                ap_interface_name: String::new(),
                data_interface_name: String::new(),
                iface_up: false,
                country_code: self.country_code.clone(),
                target_mode: self.target_mode,
                ssid: self.config.ssid.clone(),
                band: self.config.band,
                hidden_ssid: self.config.hidden_ssid,
                client_count: 0,
                auto_shutdown_enabled: self.config.auto_shutdown,
                current_info: SoftApInfo::DOWN,
                start_timestamp_ms: None,
                fsm_log: self.log.iter().cloned().collect(),
            },
            Phase::Started(data) => DumpSnapshot {
                state_name: "Started",
                ap_interface_name: data.outcome.ap_interface_name.clone(),
                data_interface_name: data.outcome.data_interface_name.clone(),
                iface_up: data.ap_iface_up && data.data_iface_up,
                country_code: self.country_code.clone(),
                target_mode: self.target_mode,
                ssid: self.config.ssid.clone(),
                band: self.config.band,
                hidden_ssid: self.config.hidden_ssid,
                client_count: data.roster.len(),
                auto_shutdown_enabled: self.config.auto_shutdown,
                current_info: data.info,
                start_timestamp_ms: Some(data.start_timestamp_ms),
                fsm_log: self.log.iter().cloned().collect(),
            },
        }
    }
}

/// A config update "requires restart" when it touches anything baked into
/// the live driver call (SSID, security, passphrase, band, channel,
/// hidden flag, BSSID). Allow/block lists, auto-shutdown, timeout, max
/// client count, and client-control-by-user can all be applied live.
fn config_change_requires_restart(old: &SoftApConfiguration, new: &SoftApConfiguration) -> bool {
    old.ssid != new.ssid
        || old.security != new.security
        || old.passphrase != new.passphrase
        || old.band != new.band
        || old.channel != new.channel
        || old.hidden_ssid != new.hidden_ssid
        || old.bssid != new.bssid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityFlags, SecurityMode};
    use crate::driver::fake::{FakeDriver, Scripted};
    use crate::event_bus::recording::{RecordedEvent, RecordingEventBus};

    fn capability() -> SoftApCapability {
        SoftApCapability {
            flags: CapabilityFlags::CLIENT_FORCE_DISCONNECT,
            max_clients: 1,
            channels_2ghz: vec![1, 6, 11],
            channels_5ghz: vec![36],
            channels_6ghz: vec![],
            supports_5ghz: true,
        }
    }

    fn mode_config(auto_shutdown: bool, timeout_ms: u64) -> SoftApModeConfiguration {
        let mut config = SoftApConfiguration::new(b"foo".to_vec(), SecurityMode::Open, Band::TWO_GHZ);
        config.auto_shutdown = auto_shutdown;
        config.shutdown_timeout_ms = timeout_ms;
        SoftApModeConfiguration {
            target_mode: TargetMode::LocalOnly,
            config,
            capability: capability(),
            country_code: "US".to_string(),
            platform_default_timeout_ms: 0,
        }
    }

    fn spawn(
        driver: Arc<dyn DriverIface>,
        bus: Arc<RecordingEventBus>,
        mode_config: SoftApModeConfiguration,
    ) -> (mpsc::Sender<Message>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let fsm = SoftApStateMachine::new(driver, bus, mode_config, tx.clone(), rx);
        let handle = tokio::spawn(fsm.run());
        (tx, handle)
    }

    #[tokio::test]
    async fn happy_path_start_then_idle_timeout_shuts_down() {
        let driver: Arc<dyn DriverIface> =
            Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus = Arc::new(RecordingEventBus::new());
        let (tx, _handle) = spawn(driver, bus.clone(), mode_config(true, 20));

        tx.send(Message::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tx.send(Message::InterfaceStatusChanged { up: true }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let events = bus.events();
        let has_enabling = events.iter().any(|e| matches!(e, RecordedEvent::StateChanged(b) if b.new_state == ApState::Enabling));
        let has_enabled = events.iter().any(|e| matches!(e, RecordedEvent::StateChanged(b) if b.new_state == ApState::Enabled));
        let has_disabled = events.iter().any(|e| matches!(e, RecordedEvent::StateChanged(b) if b.new_state == ApState::Disabled));
        let has_started = events.iter().any(|e| matches!(e, RecordedEvent::Started));
        let has_stopped = events.iter().any(|e| matches!(e, RecordedEvent::Stopped));
        assert!(has_enabling && has_enabled && has_disabled && has_started && has_stopped);
    }

    #[tokio::test]
    async fn second_client_over_cap_is_force_disconnected() {
        let driver = Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus = Arc::new(RecordingEventBus::new());
        let (tx, _handle) = spawn(driver.clone(), bus.clone(), mode_config(false, 0));

        tx.send(Message::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let first = Client::new(Mac([1, 0, 0, 0, 0, 0]));
        let second = Client::new(Mac([2, 0, 0, 0, 0, 0]));
        tx.send(Message::AssociatedStationsChanged { client: first, connected: true }).await.unwrap();
        tx.send(Message::AssociatedStationsChanged { client: second, connected: true }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let forced = driver.forced_disconnects();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].1, second.mac);
        assert_eq!(forced[0].2, BlockReason::NoMoreStas);

        let blocked = bus
            .events()
            .into_iter()
            .filter(|e| matches!(e, RecordedEvent::BlockedClientConnecting(c, BlockReason::NoMoreStas) if c.mac == second.mac))
            .count();
        assert_eq!(blocked, 1);
    }

    #[tokio::test]
    async fn unauthorized_client_blocked_then_silently_dropped_once_blocked() {
        let driver = Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus = Arc::new(RecordingEventBus::new());
        let mut mc = mode_config(false, 0);
        mc.config.client_control_by_user = true;
        mc.capability.max_clients = 8;
        let (tx, _handle) = spawn(driver.clone(), bus.clone(), mc);

        tx.send(Message::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let intruder = Client::new(Mac([9, 0, 0, 0, 0, 0]));
        tx.send(Message::AssociatedStationsChanged { client: intruder, connected: true }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let blocked_events = bus
            .events()
            .into_iter()
            .filter(|e| matches!(e, RecordedEvent::BlockedClientConnecting(_, BlockReason::BlockedByUser)))
            .count();
        assert_eq!(blocked_events, 1);
        assert_eq!(driver.forced_disconnects().len(), 1);
    }

    #[tokio::test]
    async fn info_changed_is_not_re_emitted_for_identical_values() {
        let driver = Arc::new(FakeDriver::new(Scripted { supports_5ghz: true, ..Default::default() }));
        let bus = Arc::new(RecordingEventBus::new());
        let (tx, _handle) = spawn(driver, bus.clone(), mode_config(false, 0));

        tx.send(Message::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tx.send(Message::SoftApChannelSwitched { frequency: 2412, bandwidth: Bandwidth::Bw20 }).await.unwrap();
        tx.send(Message::SoftApChannelSwitched { frequency: 2412, bandwidth: Bandwidth::Bw20 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let info_events =
            bus.events().into_iter().filter(|e| matches!(e, RecordedEvent::InfoChanged(_))).count();
        assert_eq!(info_events, 1);
    }

    #[tokio::test]
    async fn stop_on_idle_is_a_dump_only_no_broadcast() {
        let driver = Arc::new(FakeDriver::new(Scripted::default()));
        let bus = Arc::new(RecordingEventBus::new());
        let (tx, _handle) = spawn(driver, bus.clone(), mode_config(false, 0));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Message::Dump(reply_tx)).await.unwrap();
        let snapshot = reply_rx.await.unwrap();
        assert_eq!(snapshot.state_name, "Idle");
        assert!(bus.events().is_empty());
    }
}
