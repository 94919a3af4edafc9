// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Soft Access Point lifecycle manager: brings up, operates, and tears
//! down a Wi-Fi Soft-AP on top of an opaque native driver adapter.
//!
//! [`Manager`] is the entry point; it owns a [`fsm::SoftApStateMachine`]
//! running on its own mailbox task and exposes the external API described
//! in the module docs below. Driver adapters push native callbacks
//! through a [`demux::DriverEventDemux`] returned alongside the manager.

pub mod clock;
pub mod config;
pub mod config_store;
pub mod demux;
pub mod driver;
pub mod error;
pub mod event_bus;
pub mod fsm;
pub mod logging;
pub mod manager;
pub mod resolver;
pub mod roster;
pub mod scan_cache;
pub mod sequencer;
pub mod timer;

pub use config::{
    Band, Bandwidth, CapabilityFlags, Client, Mac, Role, ScanResult, SecurityMode,
    SoftApCapability, SoftApConfiguration, SoftApInfo, SoftApModeConfiguration, TargetMode,
};
pub use config_store::{ApConfigStore, StaticApConfigStore};
pub use demux::{DriverEventDemux, RawDriverEvent};
pub use driver::DriverIface;
pub use error::{FailureReason, ManagerError};
pub use event_bus::{ApState, EventBus, StateChangeBroadcast};
pub use fsm::{DumpSnapshot, Message};
pub use manager::Manager;
pub use roster::BlockReason;
pub use scan_cache::ScanCache;
