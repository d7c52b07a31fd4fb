// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session fleet management for the Wagate gateway.
//!
//! - [`registry`]: process-local table of live session handles.
//! - [`supervisor`]: lifecycle, restore, and event wiring for sessions.
//! - [`reconnect`]: exponential-backoff reconnection with a single timer
//!   per session.

pub mod reconnect;
pub mod registry;
pub mod supervisor;

pub use reconnect::ReconnectController;
pub use registry::{SessionHandle, SessionRegistry};
pub use supervisor::SessionSupervisor;
