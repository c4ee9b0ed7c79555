//! Frame Protocol
//!
//! Encodes and decodes the text frames exchanged with the Airzone Cloud
//! event stream. Each frame starts with a control code, and message frames
//! carry a second character for the message type:
//!
//! ```text
//! 0{"sid":"..."}          connect
//! 2                       ping
//! 3                       pong
//! 40                      message / open
//! 42["ready"]             message / event
//! 427["auth"]             message / event with id 7
//! 430[]                   message / response to id 0
//! ```

use serde_json::Value;
use tracing::warn;

use crate::error::FrameError;

const CODE_CONNECT: char = '0';
const CODE_PING: char = '2';
const CODE_PONG: char = '3';
const CODE_MESSAGE: char = '4';

const TYPE_OPEN: char = '0';
const TYPE_EVENT: char = '2';
const TYPE_RESPONSE: char = '3';

/// Frame sent once the transport is open to complete the handshake
pub const OPEN_FRAME: &str = "40";

/// Reply to a server ping
pub const PONG_FRAME: &str = "3";

/// Kind of a message frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Open,
    Event,
    Response,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Open => write!(f, "open"),
            MessageType::Event => write!(f, "event"),
            MessageType::Response => write!(f, "response"),
        }
    }
}

/// A decoded transport frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Connection handshake, carrying the server's session parameters
    Connect(Value),
    /// Server keep-alive check
    Ping,
    /// Keep-alive answer
    Pong,
    /// Application-level message
    Message {
        kind: MessageType,
        id: Option<u64>,
        payload: Value,
    },
}

impl Frame {
    /// Split an event payload `[name, data?]` into its name and data.
    ///
    /// Returns `None` for non-event frames and for events without a name.
    pub fn event(&self) -> Option<(&str, &Value)> {
        match self {
            Frame::Message {
                kind: MessageType::Event,
                payload,
                ..
            } => {
                let items = payload.as_array()?;
                let name = items.first()?.as_str()?;
                Some((name, items.get(1).unwrap_or(&Value::Null)))
            }
            _ => None,
        }
    }
}

/// Encode an outbound event frame: `42<id><json>`
pub fn encode(id: u64, payload: &[Value]) -> String {
    format!("{CODE_MESSAGE}{TYPE_EVENT}{id}{}", Value::from(payload.to_vec()))
}

/// Encode a response frame: `43<id><json>`
pub fn encode_response(id: u64, payload: &[Value]) -> String {
    format!("{CODE_MESSAGE}{TYPE_RESPONSE}{id}{}", Value::from(payload.to_vec()))
}

/// Decode a raw text frame
pub fn decode(raw: &str) -> Result<Frame, FrameError> {
    let mut chars = raw.chars();
    let code = chars.next().ok_or(FrameError::Empty)?;

    match code {
        CODE_CONNECT => {
            let (_, payload) = split_id_and_payload(&raw[1..])?;
            Ok(Frame::Connect(payload))
        }
        CODE_PING => Ok(Frame::Ping),
        CODE_PONG => Ok(Frame::Pong),
        CODE_MESSAGE => {
            let kind = match chars.next() {
                Some(TYPE_OPEN) => MessageType::Open,
                Some(TYPE_EVENT) => MessageType::Event,
                Some(TYPE_RESPONSE) => MessageType::Response,
                Some(other) => return Err(FrameError::UnknownType(other)),
                None => return Err(FrameError::MissingType),
            };

            // Open frames carry nothing but the signal itself.
            if kind == MessageType::Open && raw.len() == 2 {
                return Ok(Frame::Message {
                    kind,
                    id: None,
                    payload: Value::Null,
                });
            }

            let (id, payload) = split_id_and_payload(&raw[2..])?;
            Ok(Frame::Message { kind, id, payload })
        }
        other => Err(FrameError::UnknownCode(other)),
    }
}

/// Split `<digits><json>` into the optional numeric id and the JSON value.
fn split_id_and_payload(rest: &str) -> Result<(Option<u64>, Value), FrameError> {
    let Some(start) = rest.find(&['[', '{'][..]) else {
        if !rest.is_empty() {
            warn!(frame = %rest, "Frame without JSON payload");
        }
        return Ok((rest.trim().parse().ok(), Value::Array(Vec::new())));
    };

    let id = match &rest[..start] {
        "" => None,
        digits => Some(
            digits
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidId(digits.to_string()))?,
        ),
    };

    let payload = serde_json::from_str(&rest[start..])?;
    Ok((id, payload))
}
