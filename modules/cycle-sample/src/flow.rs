//! The sample dialogue: a TCP command server.
//!
//! Clients send lines; `bytes` and `messages` reply with per-client counters,
//! `bye` disconnects. Roster changes and the optional bootstrap fetch are
//! reported through the log driver.

use cycle_core::{
    fold_reducible, partitioned_fold, ClientId, Reducible, Request, RequestStream, Response,
    Responses,
};
use futures::future;
use futures::stream;
use futures::StreamExt;

/// Request id of the startup fetch.
pub const BOOTSTRAP_REQUEST_ID: u64 = 0;

/// Connected clients, in connection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub clients: Vec<ClientId>,
}

impl Reducible for AppState {
    fn reduce(&self, response: &Response) -> Self {
        match response {
            Response::ClientConnected { client_id } => {
                let mut clients = self.clients.clone();
                clients.push(client_id.clone());
                Self { clients }
            }
            Response::ClientDisconnected { client_id } => Self {
                clients: self
                    .clients
                    .iter()
                    .filter(|id| *id != client_id)
                    .cloned()
                    .collect(),
            },
            _ => self.clone(),
        }
    }
}

/// Per-connection counters. `last_message` is set only by the response
/// that produced this snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub id: ClientId,
    pub bytes_received: usize,
    pub messages_received: usize,
    pub last_message: Option<String>,
}

impl ClientState {
    pub fn new(id: &ClientId) -> Self {
        Self {
            id: id.clone(),
            bytes_received: 0,
            messages_received: 0,
            last_message: None,
        }
    }

    /// The reply this snapshot calls for, if its message is a command.
    pub fn command_request(&self) -> Option<Request> {
        let command = Command::parse(self.last_message.as_deref()?)?;
        Some(match command {
            Command::Bytes => Request::tcp_send_line(
                self.id.clone(),
                format!("total bytes received: {}", self.bytes_received),
            ),
            Command::Messages => Request::tcp_send_line(
                self.id.clone(),
                format!("nb of msg received: {}", self.messages_received),
            ),
            Command::Bye => Request::TcpKick {
                client_id: self.id.clone(),
            },
        })
    }
}

impl Reducible for ClientState {
    fn reduce(&self, response: &Response) -> Self {
        match response {
            Response::ClientDataReceived { bytes, .. } => Self {
                id: self.id.clone(),
                bytes_received: self.bytes_received + bytes.len(),
                messages_received: self.messages_received + 1,
                last_message: Some(String::from_utf8_lossy(bytes).into_owned()),
            },
            _ => Self {
                last_message: None,
                ..self.clone()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Bytes,
    Messages,
    Bye,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        if text.starts_with("bytes") {
            Some(Command::Bytes)
        } else if text.starts_with("messages") {
            Some(Command::Messages)
        } else if text.starts_with("bye") {
            Some(Command::Bye)
        } else {
            None
        }
    }
}

/// Build the sample's `main`.
pub fn flow(bootstrap_url: Option<String>) -> impl FnOnce(Responses) -> RequestStream {
    move |responses| {
        let bootstrap = stream::iter(bootstrap_url.map(|url| Request::Http {
            id: BOOTSTRAP_REQUEST_ID,
            url,
        }));

        let roster = fold_reducible(AppState::default(), responses.subscribe())
            .scan(0usize, |known, state| {
                let count = state.clients.len();
                let changed = count != *known;
                *known = count;
                future::ready(Some(
                    changed.then(|| Request::log(format!("{count} client(s) connected"))),
                ))
            })
            .filter_map(future::ready);

        let commands = partitioned_fold(
            |response: &Response| response.client_id().cloned(),
            ClientState::new,
            ClientState::reduce,
            |response: &Response| matches!(response, Response::ClientDisconnected { .. }),
            responses.subscribe(),
        )
        .map(|partition| {
            partition
                .states
                .filter_map(|state| future::ready(state.command_request()))
                .boxed()
        })
        .flatten_unordered(None);

        let fetched = responses.subscribe().filter_map(|response| {
            future::ready(match response {
                Response::Http {
                    origin_request_id,
                    content,
                } => Some(Request::log(format!(
                    "request {origin_request_id} fetched {} bytes",
                    content.len()
                ))),
                Response::HttpFailed {
                    origin_request_id,
                    reason,
                } => Some(Request::log(format!(
                    "request {origin_request_id} failed: {reason}"
                ))),
                _ => None,
            })
        });

        stream::select_all(vec![
            bootstrap.boxed(),
            roster.boxed(),
            commands.boxed(),
            fetched.boxed(),
        ])
        .boxed()
    }
}
