//! State derived from responses.
//!
//! A fold never mutates shared state: each step builds a new snapshot from
//! the previous one and a response. Partitioned folds keep one such
//! sequence per key, in an explicit table that drops an entry the moment
//! its partition terminates.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::panic;

use futures::future;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, trace};

use crate::driver::ResponseStream;
use crate::envelope::Response;

/// Successive state snapshots, starting with the initial value.
pub type StateStream<S> = BoxStream<'static, S>;

/// State types that know how to absorb a response.
pub trait Reducible: Clone + Send + 'static {
    /// Pure: return the next snapshot, leave `self` untouched.
    fn reduce(&self, response: &Response) -> Self;
}

/// Emit `initial`, then `reduce(previous, response)` for every response.
///
/// Lazy and single-subscriber: each call is an independent fold. `reduce`
/// must not block.
pub fn fold<S, F>(initial: S, reduce: F, responses: ResponseStream) -> StateStream<S>
where
    S: Clone + Send + 'static,
    F: Fn(&S, &Response) -> S + Send + 'static,
{
    let seed = stream::once(future::ready(initial.clone()));
    let steps = responses.scan(initial, move |state, response| {
        *state = reduce(state, &response);
        future::ready(Some(state.clone()))
    });
    seed.chain(steps).boxed()
}

/// [`fold`] for a [`Reducible`] state.
pub fn fold_reducible<S: Reducible>(initial: S, responses: ResponseStream) -> StateStream<S> {
    fold(initial, S::reduce, responses)
}

/// [`fold`] with a fallible reducer. The first error is yielded and ends the fold.
pub fn try_fold<S, E, F>(
    initial: S,
    reduce: F,
    responses: ResponseStream,
) -> BoxStream<'static, Result<S, E>>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    F: Fn(&S, &Response) -> Result<S, E> + Send + 'static,
{
    let seed = stream::once(future::ready(Ok(initial.clone())));
    let steps = responses.scan(Some(initial), move |slot, response| {
        let Some(state) = slot.as_ref() else {
            return future::ready(None);
        };
        let step = match reduce(state, &response) {
            Ok(next) => {
                *slot = Some(next.clone());
                Ok(next)
            }
            Err(e) => {
                *slot = None;
                Err(e)
            }
        };
        future::ready(Some(step))
    });
    seed.chain(steps).boxed()
}

// ---------------------------------------------------------------------------
// Partitioned fold
// ---------------------------------------------------------------------------

/// One partition's lifecycle: its key and its state snapshots.
///
/// `states` ends when the partition terminates or the upstream ends.
/// Dropping it releases the partition early.
pub struct Partition<K, S> {
    pub key: K,
    pub states: StateStream<S>,
}

impl<K: fmt::Debug, S> fmt::Debug for Partition<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Group responses by key and fold each group independently.
///
/// - `key_of` picks the partition; responses without a key are skipped.
/// - A key seen for the first time (or again after termination) opens a
///   partition seeded with `initial(&key)`. The opening response is folded in.
/// - The first response of a partition for which `terminate` holds ends it.
///   No state is emitted for that response and its table entry is dropped
///   immediately. A terminating response for an unknown key opens nothing.
///
/// The table is driven by a spawned task, so partitions progress even when
/// the outer stream is not polled. Must be called inside a Tokio runtime.
/// A panic in any of the closures is re-raised by the outer stream once the
/// table is gone.
pub fn partitioned_fold<K, S, KeyOf, Init, Red, Term>(
    key_of: KeyOf,
    initial: Init,
    reduce: Red,
    terminate: Term,
    responses: ResponseStream,
) -> BoxStream<'static, Partition<K, S>>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    S: Clone + Send + 'static,
    KeyOf: Fn(&Response) -> Option<K> + Send + 'static,
    Init: Fn(&K) -> S + Send + 'static,
    Red: Fn(&S, &Response) -> S + Send + 'static,
    Term: Fn(&Response) -> bool + Send + 'static,
{
    try_partitioned_fold(
        key_of,
        initial,
        move |state: &S, response: &Response| Ok::<S, Infallible>(reduce(state, response)),
        terminate,
        responses,
    )
    .map(|partition| Partition {
        key: partition.key,
        states: partition
            .states
            .map(|step| match step {
                Ok(state) => state,
                Err(never) => match never {},
            })
            .boxed(),
    })
    .boxed()
}

/// [`partitioned_fold`] with a fallible reducer.
///
/// A reducer error is fatal to the whole table: the faulting partition yields
/// the `Err` as its last item, every other partition ends, and no further
/// partitions open.
pub fn try_partitioned_fold<K, S, E, KeyOf, Init, Red, Term>(
    key_of: KeyOf,
    initial: Init,
    reduce: Red,
    terminate: Term,
    responses: ResponseStream,
) -> BoxStream<'static, Partition<K, Result<S, E>>>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    S: Clone + Send + 'static,
    E: Send + 'static,
    KeyOf: Fn(&Response) -> Option<K> + Send + 'static,
    Init: Fn(&K) -> S + Send + 'static,
    Red: Fn(&S, &Response) -> Result<S, E> + Send + 'static,
    Term: Fn(&Response) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let table = PartitionTable {
        slots: HashMap::new(),
        key_of,
        initial,
        reduce,
        terminate,
    };
    let handle = tokio::spawn(table.run(responses, tx));

    let finished = stream::once(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                panic::resume_unwind(e.into_panic());
            }
        }
        None::<Partition<K, Result<S, E>>>
    })
    .filter_map(future::ready);

    UnboundedReceiverStream::new(rx).chain(finished).boxed()
}

struct Slot<S, E> {
    tx: mpsc::UnboundedSender<Result<S, E>>,
    state: S,
}

struct PartitionTable<K, S, E, KeyOf, Init, Red, Term> {
    slots: HashMap<K, Slot<S, E>>,
    key_of: KeyOf,
    initial: Init,
    reduce: Red,
    terminate: Term,
}

impl<K, S, E, KeyOf, Init, Red, Term> PartitionTable<K, S, E, KeyOf, Init, Red, Term>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    S: Clone + Send + 'static,
    E: Send + 'static,
    KeyOf: Fn(&Response) -> Option<K> + Send + 'static,
    Init: Fn(&K) -> S + Send + 'static,
    Red: Fn(&S, &Response) -> Result<S, E> + Send + 'static,
    Term: Fn(&Response) -> bool + Send + 'static,
{
    async fn run(
        mut self,
        mut responses: ResponseStream,
        partitions: mpsc::UnboundedSender<Partition<K, Result<S, E>>>,
    ) {
        while let Some(response) = responses.next().await {
            if let Some(key) = (self.key_of)(&response) {
                if self.absorb(key, &response, &partitions).is_break() {
                    break;
                }
            }

            if partitions.is_closed() && self.slots.is_empty() {
                trace!("No partition subscribers left");
                break;
            }
        }

        // Dropping the table drops every sender: open partitions end here.
        debug!(open = self.slots.len(), "Partitioned fold finished");
    }

    fn absorb(
        &mut self,
        key: K,
        response: &Response,
        partitions: &mpsc::UnboundedSender<Partition<K, Result<S, E>>>,
    ) -> ControlFlow<()> {
        if (self.terminate)(response) {
            if self.slots.remove(&key).is_some() {
                debug!(partition = ?key, "Partition terminated");
            }
            return ControlFlow::Continue(());
        }

        let slot = match self.slots.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = (self.initial)(&key);
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(Ok(state.clone()));
                let partition = Partition {
                    key: key.clone(),
                    states: UnboundedReceiverStream::new(rx).boxed(),
                };
                if partitions.send(partition).is_err() {
                    trace!(partition = ?key, "Partition dropped: no subscriber");
                    return ControlFlow::Continue(());
                }
                debug!(partition = ?key, "Partition opened");
                entry.insert(Slot { tx, state })
            }
        };

        match (self.reduce)(&slot.state, response) {
            Ok(next) => {
                slot.state = next.clone();
                if slot.tx.send(Ok(next)).is_err() {
                    self.slots.remove(&key);
                    debug!(partition = ?key, "Partition released by subscriber");
                }
                ControlFlow::Continue(())
            }
            Err(e) => {
                error!(partition = ?key, "Reducer failed, stopping partitioned fold");
                let _ = slot.tx.send(Err(e));
                ControlFlow::Break(())
            }
        }
    }
}
