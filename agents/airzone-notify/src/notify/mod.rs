//! Notify module
//!
//! Delivery of notification decisions to a push-notification service,
//! through the common NotificationSink trait.

pub mod ntfy;
pub mod sink;
