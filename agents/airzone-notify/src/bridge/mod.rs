//! Bridge module
//!
//! Connection state tracking, event routing and the device update
//! interpreter that decides what is worth a notification.

pub mod device;
pub mod interpreter;
pub mod router;
pub mod state;
