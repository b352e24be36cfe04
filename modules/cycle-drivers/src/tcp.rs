//! TCP listener driver.
//!
//! One accept task, one task per connection, one task routing requests to
//! connections. All of them stop when the driver's response stream is
//! dropped (dialogue teardown).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cycle_core::{
    ClientId, Driver, DriverStream, Request, RequestKind, RequestStream, Response, ResponseKind,
};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{DriverError, Result};

const READ_BUFFER_BYTES: usize = 4096;

type Outbox = mpsc::UnboundedSender<anyhow::Result<Response>>;
type Clients = Arc<Mutex<HashMap<ClientId, mpsc::UnboundedSender<ClientCommand>>>>;

#[derive(Debug)]
enum ClientCommand {
    Send(Vec<u8>),
    Kick,
}

/// Accepts TCP clients and relays their bytes as responses.
///
/// Emits `ClientConnected`, one `ClientDataReceived` per read, and
/// `ClientDisconnected` on EOF, read/write error, or kick. Handles
/// `TcpSend` and `TcpKick`; requests for unknown clients are ignored.
/// An accept failure faults the driver.
pub struct TcpDriver {
    listener: TcpListener,
}

impl TcpDriver {
    pub const KEY: &'static str = "tcp";

    pub async fn bind<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let label = format!("{addr:?}");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| DriverError::Bind {
                addr: label,
                source,
            })?;
        info!(addr = %listener.local_addr()?, "TCP driver listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

impl Driver for TcpDriver {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn request_kinds(&self) -> &[RequestKind] {
        &[RequestKind::TcpSend, RequestKind::TcpKick]
    }

    fn response_kinds(&self) -> &[ResponseKind] {
        &[
            ResponseKind::ClientConnected,
            ResponseKind::ClientDisconnected,
            ResponseKind::ClientDataReceived,
        ]
    }

    fn transform(self: Box<Self>, requests: RequestStream) -> DriverStream {
        let (outbox, mut inbox) = mpsc::unbounded_channel();
        let clients: Clients = Arc::default();
        let token = CancellationToken::new();

        tokio::spawn(accept_loop(
            self.listener,
            clients.clone(),
            outbox,
            token.clone(),
        ));
        tokio::spawn(route_requests(requests, clients, token.clone()));

        // Armed before the first poll: a stream dropped unpolled still frees the listener.
        let guard = token.drop_guard();
        async_stream::stream! {
            let _guard = guard;
            while let Some(item) = inbox.recv().await {
                yield item;
            }
        }
        .boxed()
    }
}

async fn accept_loop(
    listener: TcpListener,
    clients: Clients,
    outbox: Outbox,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (socket, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "TCP accept failed");
                let _ = outbox.send(Err(anyhow::Error::new(e).context("TCP accept failed")));
                break;
            }
        };

        let client_id = ClientId::new(Uuid::new_v4().to_string());
        info!(client_id = %client_id, peer = %peer, "Client connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        lock(&clients).insert(client_id.clone(), commands_tx);

        let connected = Response::ClientConnected {
            client_id: client_id.clone(),
        };
        if outbox.send(Ok(connected)).is_err() {
            break;
        }

        tokio::spawn(serve_client(
            client_id,
            socket,
            commands_rx,
            clients.clone(),
            outbox.clone(),
            token.child_token(),
        ));
    }
    debug!("TCP accept loop stopped");
}

async fn serve_client(
    client_id: ClientId,
    socket: TcpStream,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    clients: Clients,
    outbox: Outbox,
    token: CancellationToken,
) {
    let (mut reader, mut writer) = socket.into_split();
    let mut buf = vec![0u8; READ_BUFFER_BYTES];

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    let received = Response::ClientDataReceived {
                        client_id: client_id.clone(),
                        bytes: buf[..n].to_vec(),
                    };
                    if outbox.send(Ok(received)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "Client read failed");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(ClientCommand::Send(payload)) => {
                    if let Err(e) = writer.write_all(&payload).await {
                        warn!(client_id = %client_id, error = %e, "Client write failed");
                        break;
                    }
                }
                Some(ClientCommand::Kick) | None => break,
            },
        }
    }

    let _ = writer.shutdown().await;
    lock(&clients).remove(&client_id);
    info!(client_id = %client_id, "Client disconnected");
    let _ = outbox.send(Ok(Response::ClientDisconnected { client_id }));
}

async fn route_requests(mut requests: RequestStream, clients: Clients, token: CancellationToken) {
    loop {
        let request = tokio::select! {
            _ = token.cancelled() => break,
            next = requests.next() => match next {
                Some(request) => request,
                None => break,
            },
        };

        let (client_id, command) = match request {
            Request::TcpSend { client_id, payload } => (client_id, ClientCommand::Send(payload)),
            Request::TcpKick { client_id } => (client_id, ClientCommand::Kick),
            _ => continue,
        };

        let connection = lock(&clients).get(&client_id).cloned();
        match connection {
            Some(connection) => {
                let _ = connection.send(command);
            }
            None => debug!(client_id = %client_id, "Request for unknown client ignored"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
