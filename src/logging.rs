// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Logger initialization. Mirrors the teacher's `util::logger::init()`
//! shape: a single call near the top of `main`, reading filter level from
//! `RUST_LOG` with a crate-scoped default.

/// Initializes `env_logger` with `info` as the default filter for this
/// crate when `RUST_LOG` is unset. Safe to call more than once; later
/// calls are no-ops (`env_logger::try_init` swallows the "already
/// initialized" error).
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
