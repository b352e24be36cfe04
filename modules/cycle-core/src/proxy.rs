//! Feedback proxy: the queue that turns main's output into the drivers' input.
//!
//! Requests published before anything reads the proxy are queued, not lost.
//! The fan-out then copies each request to one branch per driver.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::driver::RequestStream;
use crate::envelope::Request;
use crate::registry::Routing;

/// Write end of the feedback proxy.
#[derive(Debug, Clone)]
pub struct RequestSink {
    tx: mpsc::UnboundedSender<Request>,
}

impl RequestSink {
    /// Queue a request for the drivers. Returns `false` once the dialogue
    /// has stopped reading requests.
    pub fn publish(&self, request: Request) -> bool {
        self.tx.send(request).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn downgrade(&self) -> mpsc::WeakUnboundedSender<Request> {
        self.tx.downgrade()
    }

    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }
}

/// An unbounded request queue with a single reader.
pub struct FeedbackProxy {
    tx: mpsc::UnboundedSender<Request>,
    rx: mpsc::UnboundedReceiver<Request>,
}

impl FeedbackProxy {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sink(&self) -> RequestSink {
        RequestSink {
            tx: self.tx.clone(),
        }
    }

    /// Split into the write end and the queued request stream.
    pub fn into_parts(self) -> (RequestSink, RequestStream) {
        (
            RequestSink { tx: self.tx },
            UnboundedReceiverStream::new(self.rx).boxed(),
        )
    }
}

impl Default for FeedbackProxy {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Broadcasts the proxy's requests to every driver.
pub(crate) struct FanOut {
    branches: Vec<mpsc::UnboundedSender<Request>>,
    routing: Routing,
}

impl FanOut {
    pub(crate) fn new(routing: Routing) -> Self {
        Self {
            branches: Vec::new(),
            routing,
        }
    }

    /// A new driver input. Requests arriving before the driver polls it are queued.
    pub(crate) fn branch(&mut self) -> RequestStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.branches.push(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }

    /// Copy each request to every live branch until the proxy closes or the
    /// dialogue is cancelled. Dropping the branches ends every driver input.
    pub(crate) async fn run(mut self, mut requests: RequestStream, token: CancellationToken) {
        loop {
            let request = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = requests.next() => match next {
                    Some(request) => request,
                    None => {
                        debug!("Feedback proxy closed");
                        break;
                    }
                },
            };

            if request.is_empty() {
                trace!("Empty request");
            } else if self.routing.is_unrouted(&request) {
                debug!(kind = ?request.kind(), "Request matched no driver");
            }

            self.branches.retain(|branch| branch.send(request.clone()).is_ok());
        }
    }
}
