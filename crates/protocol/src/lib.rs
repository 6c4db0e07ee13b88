//! Wire protocol types for pulseboard client-server communication.
//!
//! All traffic is JSON text frames over a single WebSocket. Outbound
//! requests are a closed set tagged by their `action` field; inbound
//! traffic is classified once at the transport boundary into
//! [`ServerMessage`], leaving channel payloads as raw JSON for the
//! channel router to match against.

pub mod constants;
pub mod envelope;
pub mod messages;

pub use envelope::ServerMessage;
pub use messages::{
    ClientRequest, PingOptions, Pong, RegisterOptions, RegistrationAck, StreamOptions,
};
