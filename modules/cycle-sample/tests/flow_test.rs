//! The sample flow against a scripted TCP driver: no sockets.

use std::time::Duration;

use cycle_core::{driver_fn, run, DriverStream, Drivers, Request, RequestStream, Response};
use cycle_sample::flow;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn data(id: &str, text: &str) -> Response {
    Response::ClientDataReceived {
        client_id: id.into(),
        bytes: text.as_bytes().to_vec(),
    }
}

/// Plays `script` once, forwards every request it receives to `seen`.
fn scripted_driver(
    key: &'static str,
    script: Vec<Response>,
    seen: mpsc::UnboundedSender<Request>,
) -> impl cycle_core::Driver {
    driver_fn(key, move |requests: RequestStream| -> DriverStream {
        tokio::spawn(requests.for_each(move |request| {
            let _ = seen.send(request);
            async {}
        }));
        stream::iter(script.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed()
    })
}

async fn next_matching<F>(rx: &mut mpsc::UnboundedReceiver<Request>, mut pred: F) -> Request
where
    F: FnMut(&Request) -> bool,
{
    loop {
        let request = timeout(WAIT, rx.recv())
            .await
            .expect("request within deadline")
            .expect("driver still running");
        if pred(&request) {
            return request;
        }
    }
}

fn is_tcp(request: &Request) -> bool {
    matches!(request, Request::TcpSend { .. } | Request::TcpKick { .. })
}

#[tokio::test]
async fn commands_are_answered_per_client() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let script = vec![
        Response::ClientConnected {
            client_id: "a".into(),
        },
        data("a", "hello\n"),
        data("a", "bytes\n"),
        data("a", "messages\n"),
        data("a", "bye\n"),
    ];
    let drivers = Drivers::new()
        .with(scripted_driver("tcp", script, seen_tx))
        .unwrap();

    let dialogue = run(flow(None), drivers).unwrap();

    assert_eq!(
        next_matching(&mut seen, is_tcp).await,
        Request::tcp_send_line("a".into(), "total bytes received: 12")
    );
    assert_eq!(
        next_matching(&mut seen, is_tcp).await,
        Request::tcp_send_line("a".into(), "nb of msg received: 3")
    );
    assert_eq!(
        next_matching(&mut seen, is_tcp).await,
        Request::TcpKick {
            client_id: "a".into()
        }
    );

    dialogue.close().await.unwrap();
}

#[tokio::test]
async fn roster_changes_are_logged() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let script = vec![
        Response::ClientConnected {
            client_id: "a".into(),
        },
        Response::ClientConnected {
            client_id: "b".into(),
        },
        data("a", "noise"),
        Response::ClientDisconnected {
            client_id: "a".into(),
        },
    ];
    let drivers = Drivers::new()
        .with(scripted_driver("tcp", script, seen_tx))
        .unwrap();

    let dialogue = run(flow(None), drivers).unwrap();

    let mut logs = Vec::new();
    for _ in 0..3 {
        let request = next_matching(&mut seen, |r| matches!(r, Request::Log { .. })).await;
        logs.push(request);
    }
    assert_eq!(
        logs,
        vec![
            Request::log("1 client(s) connected"),
            Request::log("2 client(s) connected"),
            Request::log("1 client(s) connected"),
        ]
    );

    dialogue.close().await.unwrap();
}

#[tokio::test]
async fn bootstrap_fetch_is_requested_and_reported() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let http = scripted_driver(
        "http",
        vec![Response::Http {
            origin_request_id: 0,
            content: "abc".into(),
        }],
        seen_tx,
    );

    let dialogue = run(
        flow(Some("http://example.invalid/".into())),
        Drivers::new().with(http).unwrap(),
    )
    .unwrap();

    let bootstrap = next_matching(&mut seen, |r| matches!(r, Request::Http { .. })).await;
    assert_eq!(
        bootstrap,
        Request::Http {
            id: 0,
            url: "http://example.invalid/".into()
        }
    );

    let report = next_matching(&mut seen, |r| matches!(r, Request::Log { .. })).await;
    assert_eq!(report, Request::log("request 0 fetched 3 bytes"));

    dialogue.close().await.unwrap();
}
