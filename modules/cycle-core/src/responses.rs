//! The merge point's output: the one response stream every consumer sees.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::driver::ResponseStream;
use crate::envelope::Response;
use crate::state::{self, StateStream};

/// A response together with the key of the driver that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged {
    pub driver: Arc<str>,
    pub response: Response,
}

/// Shared handle to the merged response stream.
///
/// Hot: a subscriber sees the responses delivered after it subscribed.
/// Subscriptions taken inside `main` (before the dialogue starts pumping)
/// therefore see everything. Delivery happens from a single task, one
/// response at a time, so subscribers never observe two drivers concurrently.
#[derive(Clone, Default)]
pub struct Responses {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Default)]
struct Hub {
    subscribers: Vec<mpsc::UnboundedSender<Tagged>>,
    closed: bool,
}

impl Responses {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ResponseStream {
        self.subscribe_tagged()
            .map(|tagged| tagged.response)
            .boxed()
    }

    /// Like [`subscribe`](Self::subscribe), keeping the originating driver key.
    pub fn subscribe_tagged(&self) -> BoxStream<'static, Tagged> {
        let mut hub = self.lock();
        if hub.closed {
            return stream::empty().boxed();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        hub.subscribers.push(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }

    /// Subscribe and fold in one step. See [`state::fold`].
    pub fn fold<S, F>(&self, initial: S, reduce: F) -> StateStream<S>
    where
        S: Clone + Send + 'static,
        F: Fn(&S, &Response) -> S + Send + 'static,
    {
        state::fold(initial, reduce, self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Hand one response to every live subscriber. Dropped subscribers are pruned.
    pub(crate) fn deliver(&self, tagged: Tagged) {
        self.lock()
            .subscribers
            .retain(|subscriber| subscriber.send(tagged.clone()).is_ok());
    }

    /// End every subscription. Later subscriptions are empty.
    pub(crate) fn close(&self) {
        let mut hub = self.lock();
        hub.closed = true;
        hub.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
