//! Message Router
//!
//! Maps inbound event names to their handler. The category of an event is
//! the part of its name before the first `.`, e.g.
//! `DEVICES_UPDATES.<installation>` routes to the device update handler.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bridge::device::{DeviceState, DevicesUpdates};
use crate::bridge::interpreter::DeviceInterpreter;
use crate::notify::sink::Notification;

/// Closed dispatch table of event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Server is ready for listener registration
    Ready,
    /// Server asks for the bearer token
    Auth,
    DeviceState,
    DeviceStateEnd,
    DevicesUpdates,
    /// Anything else, logged and ignored
    Unhandled,
}

impl Route {
    pub fn from_event_name(name: &str) -> Self {
        let category = name.split_once('.').map_or(name, |(category, _)| category);
        match category {
            "ready" => Route::Ready,
            "auth" => Route::Auth,
            "DEVICE_STATE" => Route::DeviceState,
            "DEVICE_STATE_END" => Route::DeviceStateEnd,
            "DEVICES_UPDATES" => Route::DevicesUpdates,
            _ => Route::Unhandled,
        }
    }
}

/// Result of routing one event
#[derive(Debug, PartialEq)]
pub enum Dispatch {
    /// Handshake event the connection loop must answer itself
    Handshake(Route),
    /// Application event handled, with the notifications it produced
    Handled(Vec<Notification>),
    Ignored,
}

/// Route an event to the interpreter
pub fn dispatch(interpreter: &mut DeviceInterpreter, name: &str, payload: &Value) -> Dispatch {
    match Route::from_event_name(name) {
        route @ (Route::Ready | Route::Auth) => Dispatch::Handshake(route),
        Route::DeviceState => {
            let Some(state) = parse::<DeviceState>(name, payload) else {
                return Dispatch::Ignored;
            };
            interpreter.handle_device_state(
                &state.device_id,
                &state.device_type,
                state.status.name.as_deref(),
            );
            Dispatch::Handled(Vec::new())
        }
        Route::DeviceStateEnd => {
            interpreter.finalize_device_registry();
            Dispatch::Handled(Vec::new())
        }
        Route::DevicesUpdates => {
            let Some(update) = parse::<DevicesUpdates>(name, payload) else {
                return Dispatch::Ignored;
            };
            Dispatch::Handled(interpreter.handle_device_update(&update.device_id, &update.change))
        }
        Route::Unhandled => {
            debug!(event = %name, payload = %payload, "Unhandled event");
            Dispatch::Ignored
        }
    }
}

fn parse<T: DeserializeOwned>(name: &str, payload: &Value) -> Option<T> {
    match T::deserialize(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event = %name, error = %e, "Failed to parse event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::logging::testing::capture;
    use crate::cloud::types::Installation;
    use serde_json::json;

    fn interpreter() -> DeviceInterpreter {
        DeviceInterpreter::new(Installation {
            id: "inst-1".to_string(),
            name: "Maison".to_string(),
        })
    }

    #[test]
    fn test_route_by_category() {
        assert_eq!(Route::from_event_name("ready"), Route::Ready);
        assert_eq!(Route::from_event_name("auth"), Route::Auth);
        assert_eq!(Route::from_event_name("DEVICE_STATE.inst-1"), Route::DeviceState);
        assert_eq!(Route::from_event_name("DEVICE_STATE_END.inst-1"), Route::DeviceStateEnd);
        assert_eq!(Route::from_event_name("DEVICES_UPDATES.inst-1.z"), Route::DevicesUpdates);
        assert_eq!(Route::from_event_name("DEVICES_UPDATES"), Route::DevicesUpdates);
        assert_eq!(Route::from_event_name("USERS.inst-1"), Route::Unhandled);
        assert_eq!(Route::from_event_name(""), Route::Unhandled);
    }

    #[test]
    fn test_dispatch_device_state_then_update() {
        let mut interpreter = interpreter();

        let outcome = dispatch(
            &mut interpreter,
            "DEVICE_STATE.inst-1",
            &json!({"device_id": "z1", "device_type": "az_zone", "status": {"name": "Salon"}}),
        );
        assert_eq!(outcome, Dispatch::Handled(Vec::new()));

        let outcome = dispatch(
            &mut interpreter,
            "DEVICES_UPDATES.inst-1",
            &json!({"device_id": "z1", "change": {"status": {"power": true}}}),
        );
        let Dispatch::Handled(notifications) = outcome else {
            panic!("Expected handled dispatch");
        };
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].message.contains("Salon"));
    }

    #[test]
    fn test_dispatch_handshake_events() {
        let mut interpreter = interpreter();
        assert_eq!(
            dispatch(&mut interpreter, "ready", &Value::Null),
            Dispatch::Handshake(Route::Ready)
        );
        assert_eq!(
            dispatch(&mut interpreter, "auth", &Value::Null),
            Dispatch::Handshake(Route::Auth)
        );
    }

    #[test]
    fn test_unmodelled_field_does_not_drop_update() {
        let mut interpreter = interpreter();
        let outcome = dispatch(
            &mut interpreter,
            "DEVICES_UPDATES.inst-1",
            &json!({"device_id": "z1", "change": {"status": {"power": true, "local_temp": {"fah": 70}}}}),
        );
        let Dispatch::Handled(notifications) = outcome else {
            panic!("Expected handled dispatch");
        };
        assert_eq!(notifications.len(), 1);
    }

    #[test]
    fn test_unhandled_event_is_logged_once() {
        let mut interpreter = interpreter();
        let (outcome, events) =
            capture(|| dispatch(&mut interpreter, "USERS.inst-1", &json!({"a": 1})));
        assert_eq!(outcome, Dispatch::Ignored);

        let debug: Vec<_> = events.iter().filter(|event| event["level"] == "DEBUG").collect();
        assert_eq!(debug.len(), 1);
        assert_eq!(debug[0]["fields"]["message"], "Unhandled event");
        assert_eq!(debug[0]["fields"]["event"], "USERS.inst-1");
        assert_eq!(debug[0]["fields"]["payload"], r#"{"a":1}"#);
    }

    #[test]
    fn test_dispatch_ignores_unknown_and_malformed() {
        let mut interpreter = interpreter();
        assert_eq!(
            dispatch(&mut interpreter, "WEBSERVER_UPDATES.x", &json!({"a": 1})),
            Dispatch::Ignored
        );
        assert_eq!(
            dispatch(&mut interpreter, "DEVICES_UPDATES.x", &json!("not an object")),
            Dispatch::Ignored
        );
        assert!(interpreter.registry().is_empty());
    }
}
