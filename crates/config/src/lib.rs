// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! repoconv-config: environment variables and the YAML repository manifest.

pub mod env;
pub mod manifest;

pub use env::EnvConfig;
pub use manifest::{load_manifest, parse_manifest, ManifestError};
