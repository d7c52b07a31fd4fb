// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the seams between Wagate subsystems.

pub mod client;
pub mod events;
pub mod store;

pub use client::{WaClient, WaConnection, WaConnector};
pub use events::EventSink;
pub use store::SessionStore;
