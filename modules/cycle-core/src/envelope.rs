//! Request and response envelopes. Closed sets, pure data.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a connected TCP client. Assigned by the TCP driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything `main` can ask of the outside world.
///
/// Every driver sees every request and acts only on the variants it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Fetch `url`. The response carries `id` back as `origin_request_id`.
    Http { id: u64, url: String },
    /// Write `payload` to a connected client.
    TcpSend {
        client_id: ClientId,
        payload: Vec<u8>,
    },
    /// Close a client connection.
    TcpKick { client_id: ClientId },
    Log { message: String },
    /// Addressed to nothing. Drivers must ignore it without side effects.
    Empty,
}

/// Fieldless discriminant of [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Http,
    TcpSend,
    TcpKick,
    Log,
    Empty,
}

impl Request {
    pub fn log(message: impl Into<String>) -> Self {
        Request::Log {
            message: message.into(),
        }
    }

    /// A `TcpSend` carrying `text` followed by a newline.
    pub fn tcp_send_line(client_id: ClientId, text: impl AsRef<str>) -> Self {
        let mut payload = text.as_ref().as_bytes().to_vec();
        payload.push(b'\n');
        Request::TcpSend { client_id, payload }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Http { .. } => RequestKind::Http,
            Request::TcpSend { .. } => RequestKind::TcpSend,
            Request::TcpKick { .. } => RequestKind::TcpKick,
            Request::Log { .. } => RequestKind::Log,
            Request::Empty => RequestKind::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Request::Empty)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Everything drivers report back to `main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Http {
        origin_request_id: u64,
        content: String,
    },
    /// A fetch that failed. Reported as data, not as a driver fault.
    HttpFailed {
        origin_request_id: u64,
        reason: String,
    },
    ClientConnected {
        client_id: ClientId,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
    ClientDataReceived {
        client_id: ClientId,
        bytes: Vec<u8>,
    },
    LogAck,
}

/// Fieldless discriminant of [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Http,
    HttpFailed,
    ClientConnected,
    ClientDisconnected,
    ClientDataReceived,
    LogAck,
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Http { .. } => ResponseKind::Http,
            Response::HttpFailed { .. } => ResponseKind::HttpFailed,
            Response::ClientConnected { .. } => ResponseKind::ClientConnected,
            Response::ClientDisconnected { .. } => ResponseKind::ClientDisconnected,
            Response::ClientDataReceived { .. } => ResponseKind::ClientDataReceived,
            Response::LogAck => ResponseKind::LogAck,
        }
    }

    /// The client a TCP response belongs to. `None` for everything else.
    pub fn client_id(&self) -> Option<&ClientId> {
        match self {
            Response::ClientConnected { client_id }
            | Response::ClientDisconnected { client_id }
            | Response::ClientDataReceived { client_id, .. } => Some(client_id),
            _ => None,
        }
    }

    /// The id of the HTTP request this response answers.
    pub fn origin_request_id(&self) -> Option<u64> {
        match self {
            Response::Http {
                origin_request_id, ..
            }
            | Response::HttpFailed {
                origin_request_id, ..
            } => Some(*origin_request_id),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Http {
                origin_request_id,
                content,
            } => write!(
                f,
                "Http(origin={origin_request_id}, content_len={})",
                content.len()
            ),
            Response::HttpFailed {
                origin_request_id,
                reason,
            } => write!(f, "HttpFailed(origin={origin_request_id}, reason={reason})"),
            Response::ClientConnected { client_id } => write!(f, "ClientConnected({client_id})"),
            Response::ClientDisconnected { client_id } => {
                write!(f, "ClientDisconnected({client_id})")
            }
            Response::ClientDataReceived { client_id, bytes } => {
                write!(f, "ClientDataReceived({client_id}, {} bytes)", bytes.len())
            }
            Response::LogAck => f.write_str("LogAck"),
        }
    }
}
