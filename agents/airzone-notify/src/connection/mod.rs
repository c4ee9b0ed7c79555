//! Connection module
//!
//! This module handles the event stream: frame encoding, the transport and
//! the supervisor that keeps the connection alive.

pub mod protocol;
pub mod transport;
pub mod websocket;
