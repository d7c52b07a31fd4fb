// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket edge for the Wagate gateway.
//!
//! - [`server`]: router assembly, CORS, bind/serve.
//! - [`auth`]: bearer-token tenant resolution.
//! - [`handlers`] / [`groups`]: REST route handlers.
//! - [`limits`]: advisory account and message caps.
//! - [`ws`]: per-session rooms implementing the event bus.

pub mod auth;
pub mod error;
pub mod groups;
pub mod handlers;
pub mod limits;
pub mod server;
pub mod ws;

pub use error::ApiError;
pub use server::{build_router, start_server, GatewayState};
pub use ws::WsRooms;
