//! Airzone Notify Library
//!
//! This crate bridges the Airzone Cloud event stream to push notifications:
//! frame protocol, connection supervision, device update interpretation and
//! notification delivery.

pub mod bridge;
pub mod cli;
pub mod cloud;
pub mod connection;
pub mod error;
pub mod notify;

// Re-exports for convenience
pub use bridge::interpreter::DeviceInterpreter;
pub use bridge::state::{ConnectionLifecycle, ConnectionState};
pub use cli::config::Config;
pub use cloud::api::AirzoneClient;
pub use cloud::types::Installation;
pub use connection::protocol::{Frame, MessageType};
pub use connection::websocket::{ShutdownHandle, Supervisor};
pub use error::{FrameError, NotifyError};
pub use notify::ntfy::NtfySink;
pub use notify::sink::{Notification, NotificationSink, Notifier};
