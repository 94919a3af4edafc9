// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Domain error kinds (spec §7) and their mapping onto the broadcast
//! `FailureReason`.

use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FailureReason {
    General,
    NoChannel,
    UnsupportedConfiguration,
}

#[derive(Error, Debug)]
pub enum ManagerError {
    /// Missing SSID or a field that fails the capability check.
    #[error("configuration rejected by capability check: {0}")]
    ConfigInvalid(String),

    /// 5GHz requested without driver support, or the resolver exhausted
    /// every channel candidate.
    #[error("no channel available: {0}")]
    NoChannel(String),

    /// Any driver call returning non-success not otherwise classified.
    #[error("driver call failed: {context}")]
    DriverFailure {
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A destroyed-callback raced a startup or stop sequence; handled
    /// silently by the FSM, never surfaced to the caller.
    #[error("interface destroyed concurrently with {0}")]
    ConcurrentDestroy(String),
}

impl ManagerError {
    pub fn driver_failure(context: impl Into<String>, source: anyhow::Error) -> Self {
        ManagerError::DriverFailure { context: context.into(), source: Some(source) }
    }

    pub fn driver_failure_plain(context: impl Into<String>) -> Self {
        ManagerError::DriverFailure { context: context.into(), source: None }
    }

    /// Maps an error onto the broadcast failure reason per spec §7's
    /// propagation policy.
    pub fn to_failure_reason(&self) -> FailureReason {
        match self {
            ManagerError::ConfigInvalid(_) => FailureReason::UnsupportedConfiguration,
            ManagerError::NoChannel(_) => FailureReason::NoChannel,
            ManagerError::DriverFailure { .. } => FailureReason::General,
            ManagerError::ConcurrentDestroy(_) => FailureReason::General,
        }
    }

    pub fn description(&self) -> String {
        self.to_string()
    }
}
