//! JSON envelopes exchanged with the backend over the websocket channel and
//! the HTTP fallback endpoint.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Request body sent over either transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Assistant,
    Error,
}

/// Reply payload: a websocket text frame or the HTTP response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(rename = "type")]
    pub kind: InboundKind,
    pub content: String,
}

/// Opaque per-process session identifier sent with every outbound request so
/// the backend can correlate them. Timestamp plus a random suffix.
pub fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("session_{}_{}", millis, suffix.to_lowercase())
}
