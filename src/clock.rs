// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A monotonic, elapsed-since-construction millisecond clock. Stands in
//! for the platform's "elapsed since boot" source (spec §9 design notes):
//! purely monotonic, no wall-clock adjustment, host assumed always-awake.

use std::time::Instant;

#[derive(Clone)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Clock { epoch: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
