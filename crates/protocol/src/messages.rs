use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Caller-supplied options for a stream registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// Requested update cadence, e.g. `"real-time"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Sub-topics the consumer cares about, e.g. `["queries", "connections"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Registration options as they appear on the wire: the caller's options
/// plus the correlation id the acknowledgement must echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOptions {
    #[serde(flatten)]
    pub options: StreamOptions,
    pub request_id: String,
}

/// Options for a ping request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingOptions {
    pub request_id: String,
}

/// Outbound requests, tagged by their `action` field.
///
/// Feature-specific requests (history queries and the like) are opaque to
/// the core and travel through the raw-send path instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientRequest {
    Register {
        stream: String,
        options: RegisterOptions,
    },
    Subscribe {
        channel: String,
    },
    Ping {
        options: PingOptions,
    },
}

impl ClientRequest {
    /// Builds a registration request for a stream.
    pub fn register(stream: impl Into<String>, options: StreamOptions, request_id: impl Into<String>) -> Self {
        ClientRequest::Register {
            stream: stream.into(),
            options: RegisterOptions {
                options,
                request_id: request_id.into(),
            },
        }
    }

    /// The correlation id carried by this request, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientRequest::Register { options, .. } => Some(&options.request_id),
            ClientRequest::Ping { options } => Some(&options.request_id),
            ClientRequest::Subscribe { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Acknowledgement of a `register` request, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationAck {
    pub stream: String,
    pub success: bool,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reply to a `ping` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
