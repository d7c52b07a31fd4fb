// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic test doubles for the Wagate workspace.
//!
//! - [`MockConnector`] / [`MockClient`]: scriptable WhatsApp connector with
//!   injectable events and captured sends.
//! - [`MemoryStore`]: full in-memory [`wagate_core::SessionStore`].
//! - [`RecordingSink`]: captures event-bus publications for assertions.

pub mod memory_store;
pub mod mock_client;
pub mod recording_sink;

pub use memory_store::MemoryStore;
pub use mock_client::{MockClient, MockConnector};
pub use recording_sink::{RecordedEvent, RecordingSink};
