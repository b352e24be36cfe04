//! Tests for folds and partitioned folds, standalone and inside a dialogue.

use std::time::Duration;

use cycle_core::{
    driver_fn, fold_reducible, partitioned_fold, run, try_partitioned_fold, ClientId,
    DriverStream, Drivers, Partition, Reducible, Request, RequestStream, Response,
    ResponseStream,
};
use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Test state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Client {
    id: ClientId,
    messages: usize,
    bytes: usize,
}

impl Client {
    fn new(id: &ClientId) -> Self {
        Self {
            id: id.clone(),
            messages: 0,
            bytes: 0,
        }
    }
}

impl Reducible for Client {
    fn reduce(&self, response: &Response) -> Self {
        match response {
            Response::ClientDataReceived { bytes, .. } => Self {
                id: self.id.clone(),
                messages: self.messages + 1,
                bytes: self.bytes + bytes.len(),
            },
            _ => self.clone(),
        }
    }
}

fn connected(id: &str) -> Response {
    Response::ClientConnected {
        client_id: id.into(),
    }
}

fn data(id: &str, text: &str) -> Response {
    Response::ClientDataReceived {
        client_id: id.into(),
        bytes: text.as_bytes().to_vec(),
    }
}

fn disconnected(id: &str) -> Response {
    Response::ClientDisconnected {
        client_id: id.into(),
    }
}

fn clients(responses: ResponseStream) -> futures::stream::BoxStream<'static, Partition<ClientId, Client>> {
    partitioned_fold(
        |r: &Response| r.client_id().cloned(),
        Client::new,
        Client::reduce,
        |r: &Response| matches!(r, Response::ClientDisconnected { .. }),
        responses,
    )
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn fold_reducible_tracks_every_response() {
    let responses = stream::iter(vec![connected("a"), data("a", "hey"), data("a", "!")]).boxed();
    let states: Vec<Client> = fold_reducible(Client::new(&"a".into()), responses)
        .collect()
        .await;

    assert_eq!(states.len(), 4);
    assert_eq!(states[0].messages, 0);
    assert_eq!(states[1], states[0]);
    assert_eq!(states[3].messages, 2);
    assert_eq!(states[3].bytes, 4);
}

#[tokio::test]
async fn terminated_partition_stops_while_others_continue() {
    let responses = stream::iter(vec![
        connected("A"),
        data("A", "x"),
        connected("B"),
        data("B", "y"),
        disconnected("A"),
        data("B", "z"),
    ])
    .boxed();

    let partitions: Vec<_> = timeout(WAIT, clients(responses).collect::<Vec<_>>())
        .await
        .unwrap();
    assert_eq!(partitions.len(), 2);

    let mut by_key = std::collections::HashMap::new();
    for partition in partitions {
        let states: Vec<Client> = partition.states.collect().await;
        by_key.insert(partition.key, states);
    }

    // A: initial, Connected, Data(x). Nothing for Disconnected.
    let a = &by_key[&ClientId::from("A")];
    assert_eq!(a.len(), 3);
    assert_eq!(a.last().unwrap().messages, 1);

    // B: initial, Connected, Data(y), Data(z).
    let b = &by_key[&ClientId::from("B")];
    assert_eq!(b.len(), 4);
    assert_eq!(b.last().unwrap().messages, 2);
    assert_eq!(b.last().unwrap().bytes, 2);
}

#[tokio::test]
async fn reconnecting_key_opens_a_fresh_partition() {
    let responses = stream::iter(vec![
        connected("A"),
        data("A", "first"),
        disconnected("A"),
        connected("A"),
    ])
    .boxed();

    let partitions: Vec<_> = clients(responses).collect().await;
    assert_eq!(partitions.len(), 2);

    let mut lifecycles = Vec::new();
    for partition in partitions {
        let states: Vec<Client> = partition.states.collect().await;
        lifecycles.push(states.last().unwrap().messages);
    }
    assert_eq!(lifecycles, vec![1, 0]);
}

#[tokio::test]
async fn unkeyed_and_stray_terminations_open_nothing() {
    let responses = stream::iter(vec![Response::LogAck, disconnected("ghost")]).boxed();
    let partitions: Vec<_> = clients(responses).collect().await;
    assert!(partitions.is_empty());
}

#[tokio::test]
async fn dropping_a_partition_does_not_disturb_the_others() {
    let (tx, rx) = mpsc::unbounded_channel();
    let upstream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed();
    let mut partitions = clients(upstream);

    tx.send(connected("A")).unwrap();
    tx.send(connected("B")).unwrap();
    let a = timeout(WAIT, partitions.next()).await.unwrap().unwrap();
    let mut b = timeout(WAIT, partitions.next()).await.unwrap().unwrap();
    assert_eq!(a.key, ClientId::from("A"));
    drop(a);

    tx.send(data("A", "ignored")).unwrap();
    tx.send(data("B", "kept")).unwrap();
    drop(tx);

    let mut states = Vec::new();
    while let Some(state) = timeout(WAIT, b.states.next()).await.unwrap() {
        states.push(state);
    }
    assert_eq!(states.last().unwrap().messages, 1);
}

#[tokio::test]
async fn teardown_mid_partition_ends_the_partition_quietly() {
    // A driver that reports one connection and then stays silent.
    let tcp = driver_fn("tcp", |_requests: RequestStream| -> DriverStream {
        stream::iter(vec![Ok(connected("A"))])
            .chain(stream::pending())
            .boxed()
    });

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    let dialogue = run(
        |responses| {
            let partitions = clients(responses.subscribe());
            tokio::spawn(partitions.for_each(move |partition| {
                let _ = found_tx.send(partition);
                async {}
            }));
            stream::pending::<Request>().boxed()
        },
        Drivers::new().with(tcp).unwrap(),
    )
    .unwrap();

    let mut partition = timeout(WAIT, found_rx.recv()).await.unwrap().unwrap();
    let initial = timeout(WAIT, partition.states.next()).await.unwrap().unwrap();
    let after_connect = timeout(WAIT, partition.states.next()).await.unwrap().unwrap();
    assert_eq!(initial, after_connect);

    dialogue.close().await.unwrap();

    let rest = timeout(WAIT, partition.states.next()).await.unwrap();
    assert!(rest.is_none());
}

#[tokio::test]
async fn reducer_error_ends_every_partition() {
    let responses = stream::iter(vec![
        connected("A"),
        connected("B"),
        data("A", "x"),
        data("A", "boom"),
        data("B", "late"),
        connected("C"),
    ])
    .boxed();

    let partitions: Vec<_> = timeout(
        WAIT,
        try_partitioned_fold(
            |r: &Response| r.client_id().cloned(),
            |_: &ClientId| 0usize,
            |count: &usize, r: &Response| match r {
                Response::ClientDataReceived { bytes, .. } if bytes.as_slice() == b"boom" => {
                    Err(format!("cannot absorb {r}"))
                }
                Response::ClientDataReceived { .. } => Ok(count + 1),
                _ => Ok(*count),
            },
            |r: &Response| matches!(r, Response::ClientDisconnected { .. }),
            responses,
        )
        .collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    // C never opens: the table stopped at the fault.
    let keys: Vec<ClientId> = partitions.iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec![ClientId::from("A"), ClientId::from("B")]);

    let mut partitions = partitions.into_iter();
    let a: Vec<Result<usize, String>> = partitions.next().unwrap().states.collect().await;
    assert_eq!(a.len(), 4);
    assert_eq!(a[..3], [Ok(0), Ok(0), Ok(1)]);
    assert!(matches!(&a[3], Err(reason) if reason.starts_with("cannot absorb")));

    // B ends without an error and without the response after the fault.
    let b: Vec<Result<usize, String>> = partitions.next().unwrap().states.collect().await;
    assert_eq!(b, vec![Ok(0), Ok(0)]);
}

#[tokio::test]
#[should_panic(expected = "reducer exploded")]
async fn reducer_panic_surfaces_on_the_partition_stream() {
    let responses = stream::iter(vec![connected("A"), data("A", "x")]).boxed();

    let partitions = partitioned_fold(
        |r: &Response| r.client_id().cloned(),
        |_: &ClientId| 0usize,
        |count: &usize, r: &Response| match r {
            Response::ClientDataReceived { .. } => panic!("reducer exploded"),
            _ => *count,
        },
        |r: &Response| matches!(r, Response::ClientDisconnected { .. }),
        responses,
    );

    let _ = timeout(WAIT, partitions.collect::<Vec<_>>()).await;
}
