//! Cloud module
//!
//! One-shot HTTP calls to the Airzone Cloud REST API: login, notification
//! list and installation lookup.

pub mod api;
pub mod types;
