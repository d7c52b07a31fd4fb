// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Wagate gateway.
//!
//! TOML files merged through the XDG hierarchy with `WAGATE_*` environment
//! overrides, plus a handful of well-known plain environment names
//! (`DATABASE_URL`, `PORT`, ...) honored for deployment convenience.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::WagateConfig;
