// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The persisted-configuration collaborator (spec §1's opaque
//! `ApConfigStore`). Persistence itself is out of scope; this module only
//! defines the seam and an in-memory implementation good enough to back
//! `Manager::update_configuration` between process restarts of a test.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::SoftApConfiguration;

#[async_trait]
pub trait ApConfigStore: Send + Sync {
    async fn load(&self) -> Option<SoftApConfiguration>;
    async fn store(&self, config: &SoftApConfiguration);
}

/// An in-memory `ApConfigStore`. No disk I/O, so every instance starts
/// empty; callers that want durability across real restarts must supply
/// their own implementation backed by the platform's config partition.
#[derive(Default)]
pub struct StaticApConfigStore {
    current: Mutex<Option<SoftApConfiguration>>,
}

impl StaticApConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(config: SoftApConfiguration) -> Self {
        StaticApConfigStore { current: Mutex::new(Some(config)) }
    }
}

#[async_trait]
impl ApConfigStore for StaticApConfigStore {
    async fn load(&self) -> Option<SoftApConfiguration> {
        self.current.lock().clone()
    }

    async fn store(&self, config: &SoftApConfiguration) {
        *self.current.lock() = Some(config.clone());
    }
}
