//! The circular composer.
//!
//! main → proxy → fan-out → drivers → pumps → merge → subscribers → main.
//!
//! Every edge is a channel. The merge task is the only place responses are
//! handed to subscribers, so `main` and state folds are never driven by two
//! drivers at once.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::driver::{DriverStream, RequestStream};
use crate::envelope::Request;
use crate::error::{CycleError, Result};
use crate::proxy::{FanOut, FeedbackProxy, RequestSink};
use crate::registry::Drivers;
use crate::responses::{Responses, Tagged};

/// What a driver pump hands to the merge task.
enum Merged {
    Response(Tagged),
    Fault {
        driver: Arc<str>,
        error: anyhow::Error,
    },
}

/// Start a dialogue between `main` and `drivers`.
///
/// `main` is called once, synchronously, with the merged response stream.
/// Subscriptions it takes see every response. Requests it yields (including
/// any it yields immediately) reach every driver.
///
/// Must be called from inside a Tokio runtime.
pub fn run<M>(main: M, drivers: Drivers) -> Result<Dialogue>
where
    M: FnOnce(Responses) -> RequestStream,
{
    tokio::runtime::Handle::try_current().map_err(|_| CycleError::NoRuntime)?;

    if drivers.is_empty() {
        warn!("Dialogue started without drivers; main will never see a response");
    }

    let token = CancellationToken::new();
    let (sink, proxied) = FeedbackProxy::new().into_parts();
    let mut fan_out = FanOut::new(drivers.routing());
    let responses = Responses::new();
    let (merge_tx, merge_rx) = mpsc::unbounded_channel();

    // 1. Every driver gets its own branch of the proxy.
    let mut outputs = Vec::with_capacity(drivers.len());
    for driver in drivers.into_entries() {
        let key: Arc<str> = Arc::from(driver.key());
        let input = fan_out.branch();
        debug!(driver = %key, "Starting driver");
        outputs.push((key, driver.transform(input)));
    }
    let driver_count = outputs.len();

    // 2. main subscribes before anything is pumped.
    let requests = main(responses.clone());
    let weak_sink = sink.downgrade();

    // 3. Wire the loop and let it run.
    let mut tasks = JoinSet::new();
    for (key, output) in outputs {
        tasks.spawn(pump(key, output, merge_tx.clone(), token.clone()));
    }
    drop(merge_tx);
    tasks.spawn(feed(requests, sink, token.clone()));
    tasks.spawn(fan_out.run(proxied, token.clone()));
    let merge = tokio::spawn(merge(merge_rx, responses, token.clone()));

    info!(drivers = driver_count, "Dialogue started");

    Ok(Dialogue {
        token,
        merge: Some(merge),
        tasks,
        sink: weak_sink,
    })
}

/// Forward main's requests into the proxy.
async fn feed(mut requests: RequestStream, sink: RequestSink, token: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = requests.next() => match next {
                Some(request) => {
                    trace!(kind = ?request.kind(), "main emitted request");
                    if !sink.publish(request) {
                        break;
                    }
                }
                None => {
                    debug!("main request stream completed");
                    break;
                }
            },
        }
    }
}

/// Move one driver's output into the merge channel.
async fn pump(
    driver: Arc<str>,
    mut output: DriverStream,
    merge: mpsc::UnboundedSender<Merged>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = output.next() => match next {
                Some(Ok(response)) => {
                    trace!(driver = %driver, response = %response, "Driver emitted response");
                    let tagged = Tagged { driver: driver.clone(), response };
                    if merge.send(Merged::Response(tagged)).is_err() {
                        break;
                    }
                }
                Some(Err(error)) => {
                    let _ = merge.send(Merged::Fault { driver: driver.clone(), error });
                    break;
                }
                None => {
                    debug!(driver = %driver, "Driver stream completed");
                    break;
                }
            },
        }
    }
}

/// Deliver merged responses to subscribers, one at a time.
///
/// Ends on cancellation, on the first driver fault, or when every driver
/// stream has completed. Either way all subscriptions are closed and the
/// rest of the dialogue is cancelled.
async fn merge(
    mut merged: mpsc::UnboundedReceiver<Merged>,
    responses: Responses,
    token: CancellationToken,
) -> Result<()> {
    let outcome = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break Ok(()),
            next = merged.recv() => match next {
                Some(Merged::Response(tagged)) => responses.deliver(tagged),
                Some(Merged::Fault { driver, error }) => {
                    error!(driver = %driver, error = %error, "Driver faulted, tearing down dialogue");
                    break Err(CycleError::driver_fault(&driver, error));
                }
                None => {
                    debug!("All driver streams completed");
                    break Ok(());
                }
            },
        }
    };

    responses.close();
    token.cancel();
    outcome
}

/// Handle to a running dialogue. Dropping it tears the dialogue down.
pub struct Dialogue {
    token: CancellationToken,
    merge: Option<JoinHandle<Result<()>>>,
    tasks: JoinSet<()>,
    sink: mpsc::WeakUnboundedSender<Request>,
}

impl Dialogue {
    /// Request teardown. Non-blocking; use [`join`](Self::join) to wait.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// A token that tears the dialogue down when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// True once responses have stopped flowing.
    pub fn is_finished(&self) -> bool {
        self.merge.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Write end of the feedback proxy, for requests that do not come from
    /// `main`. `None` once main's request stream has completed and no other
    /// sink is alive, even if drivers are still emitting responses.
    pub fn requests(&self) -> Option<RequestSink> {
        self.sink.upgrade().map(RequestSink::from_sender)
    }

    /// Wait for the dialogue to end and report why.
    ///
    /// Returns the first driver fault, if any. Once responses stop flowing the
    /// remaining tasks are cancelled and awaited, so every driver stream has
    /// been dropped by the time this returns.
    pub async fn join(mut self) -> Result<()> {
        let mut outcome = match self.merge.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(CycleError::TaskPanicked(e.to_string())),
            },
            None => Ok(()),
        };

        self.token.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Dialogue task panicked");
                    if outcome.is_ok() {
                        outcome = Err(CycleError::TaskPanicked(e.to_string()));
                    }
                }
            }
        }

        info!(ok = outcome.is_ok(), "Dialogue stopped");
        outcome
    }

    /// [`shutdown`](Self::shutdown) then [`join`](Self::join).
    pub async fn close(self) -> Result<()> {
        self.shutdown();
        self.join().await
    }
}

impl Drop for Dialogue {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
