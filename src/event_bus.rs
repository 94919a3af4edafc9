// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C7: fan-out to the external callback surface and metrics sink (spec
//! §4.7). The Manager never calls back into its own FSM synchronously from
//! here (spec §5 reentrancy rule) — callers that need to re-enter must do
//! so via the mailbox, not from inside an `EventBus` method.

use async_trait::async_trait;

use crate::config::{Client, SoftApInfo, TargetMode};
use crate::error::FailureReason;
use crate::roster::BlockReason;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ApState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
    Failed,
}

/// The broadcast payload published alongside every state change (spec
/// §4.7 / §6).
#[derive(Clone, Debug)]
pub struct StateChangeBroadcast {
    pub new_state: ApState,
    pub prev_state: ApState,
    pub failure_reason: Option<FailureReason>,
    pub failure_description: Option<String>,
    pub data_interface_name: String,
    pub target_mode: TargetMode,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn on_state_changed(&self, broadcast: StateChangeBroadcast);
    async fn on_connected_clients_changed(&self, clients: Vec<Client>);
    async fn on_info_changed(&self, info: SoftApInfo);
    async fn on_sta_connected(&self, mac: crate::config::Mac, count: u32);
    async fn on_sta_disconnected(&self, mac: crate::config::Mac, count: u32);
    async fn on_blocked_client_connecting(&self, client: Client, reason: BlockReason);
    async fn on_started(&self);
    async fn on_stopped(&self);
    async fn on_start_failure(&self, reason: FailureReason, description: Option<String>);
}

#[cfg(any(test, feature = "test-util"))]
pub mod recording {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone, Debug)]
    pub enum RecordedEvent {
        StateChanged(StateChangeBroadcast),
        ConnectedClientsChanged(Vec<Client>),
        InfoChanged(SoftApInfo),
        StaConnected(crate::config::Mac, u32),
        StaDisconnected(crate::config::Mac, u32),
        BlockedClientConnecting(Client, BlockReason),
        Started,
        Stopped,
        StartFailure(FailureReason, Option<String>),
    }

    /// Records every callback in order, for assertions in tests.
    #[derive(Default)]
    pub struct RecordingEventBus {
        events: Mutex<Vec<RecordedEvent>>,
    }

    impl RecordingEventBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl EventBus for RecordingEventBus {
        async fn on_state_changed(&self, broadcast: StateChangeBroadcast) {
            self.events.lock().push(RecordedEvent::StateChanged(broadcast));
        }
        async fn on_connected_clients_changed(&self, clients: Vec<Client>) {
            self.events.lock().push(RecordedEvent::ConnectedClientsChanged(clients));
        }
        async fn on_info_changed(&self, info: SoftApInfo) {
            self.events.lock().push(RecordedEvent::InfoChanged(info));
        }
        async fn on_sta_connected(&self, mac: crate::config::Mac, count: u32) {
            self.events.lock().push(RecordedEvent::StaConnected(mac, count));
        }
        async fn on_sta_disconnected(&self, mac: crate::config::Mac, count: u32) {
            self.events.lock().push(RecordedEvent::StaDisconnected(mac, count));
        }
        async fn on_blocked_client_connecting(&self, client: Client, reason: BlockReason) {
            self.events.lock().push(RecordedEvent::BlockedClientConnecting(client, reason));
        }
        async fn on_started(&self) {
            self.events.lock().push(RecordedEvent::Started);
        }
        async fn on_stopped(&self) {
            self.events.lock().push(RecordedEvent::Stopped);
        }
        async fn on_start_failure(&self, reason: FailureReason, description: Option<String>) {
            self.events.lock().push(RecordedEvent::StartFailure(reason, description));
        }
    }
}
