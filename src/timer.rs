// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C3: one-shot, wake-capable idle-shutdown timer (spec §4.3).
//!
//! Built on `tokio::time` rather than a Fuchsia `zx::Timer`: the host is
//! assumed always-awake, which spec §9's design notes call out as an
//! acceptable substitute for a true wake-capable timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fsm::Message;

/// Falls back to this when both the per-AP timeout and the platform
/// default are unset. Matches the 10-minute default used throughout the
/// teacher's Soft-AP configuration surfaces.
pub const FALLBACK_TIMEOUT_MS: u64 = 600_000;

/// Resolves the effective shutdown timeout: the per-AP value if non-zero,
/// else the platform default, else `FALLBACK_TIMEOUT_MS`.
pub fn resolve_timeout_ms(per_ap_timeout_ms: u64, platform_default_ms: u64) -> u64 {
    if per_ap_timeout_ms != 0 {
        per_ap_timeout_ms
    } else if platform_default_ms != 0 {
        platform_default_ms
    } else {
        FALLBACK_TIMEOUT_MS
    }
}

pub struct ShutdownTimer {
    handle: Option<JoinHandle<()>>,
}

impl ShutdownTimer {
    pub fn new() -> Self {
        ShutdownTimer { handle: None }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Arms (replacing any pending fire) for `duration` from now. Firing
    /// delivers a single `NoAssociatedStationsTimeout` message; re-arming
    /// requires another explicit call (spec §4.3).
    pub fn arm(&mut self, duration: Duration, sender: mpsc::Sender<Message>) {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(Message::NoAssociatedStationsTimeout).await;
        }));
    }

    /// Idempotent: canceling an unarmed timer is a no-op.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ShutdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Default for ShutdownTimer {
    fn default() -> Self {
        Self::new()
    }
}
