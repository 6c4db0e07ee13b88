use serde_json::Value;

use crate::constants::{PONG_TAG, REGISTRATION_ACK_TAG};
use crate::messages::{Pong, RegistrationAck};

/// An inbound frame, classified once at the transport boundary.
///
/// The producer side has never settled on a single envelope shape:
/// acknowledgements are tagged with `action` or `type` depending on the
/// backend generation, and channel payloads arrive in half a dozen forms.
/// Classification pulls out the messages the core itself consumes
/// (acknowledgements, pongs) and leaves everything else as raw JSON for
/// the channel router.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Acknowledgement of a `register` request.
    RegistrationAck(RegistrationAck),
    /// Reply to a `ping` request.
    Pong(Pong),
    /// Candidate channel payload (any other object or array).
    Data(Value),
    /// Anything that cannot carry channel data (bare string, number, ...).
    Unknown(Value),
}

impl ServerMessage {
    /// Parses a text frame and classifies it.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::classify(serde_json::from_str(text)?))
    }

    /// Classifies an already-parsed JSON value.
    pub fn classify(value: Value) -> Self {
        enum Kind {
            Ack,
            Pong,
            Data,
            Unknown,
        }

        let kind = match &value {
            Value::Object(map) => {
                let tag = map
                    .get("action")
                    .or_else(|| map.get("type"))
                    .and_then(Value::as_str);
                if tag == Some(REGISTRATION_ACK_TAG) {
                    Kind::Ack
                } else if map.get("action").and_then(Value::as_str) == Some(PONG_TAG) {
                    Kind::Pong
                } else {
                    Kind::Data
                }
            }
            Value::Array(_) => Kind::Data,
            _ => Kind::Unknown,
        };

        match kind {
            // Acks missing their correlation fields cannot be matched to
            // a registration; let them fall through to the router
            // instead.
            Kind::Ack => match serde_json::from_value::<RegistrationAck>(value.clone()) {
                Ok(ack) => ServerMessage::RegistrationAck(ack),
                Err(_) => ServerMessage::Data(value),
            },
            Kind::Pong => match serde_json::from_value::<Pong>(value.clone()) {
                Ok(pong) => ServerMessage::Pong(pong),
                Err(_) => ServerMessage::Data(value),
            },
            Kind::Data => ServerMessage::Data(value),
            Kind::Unknown => ServerMessage::Unknown(value),
        }
    }

    /// The correlation id echoed by this message, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerMessage::RegistrationAck(ack) => Some(&ack.request_id),
            ServerMessage::Pong(pong) => pong.request_id.as_deref(),
            ServerMessage::Data(value) => value.get("requestId").and_then(Value::as_str),
            ServerMessage::Unknown(_) => None,
        }
    }
}
