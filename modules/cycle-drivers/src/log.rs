use cycle_core::{Driver, DriverStream, Request, RequestKind, RequestStream, Response, ResponseKind};
use futures::future;
use futures::StreamExt;
use tracing::info;

/// Writes `Request::Log` messages to the `cycle::log` tracing target and
/// acknowledges each one with `Response::LogAck`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDriver;

impl LogDriver {
    pub const KEY: &'static str = "log";

    pub fn new() -> Self {
        Self
    }
}

impl Driver for LogDriver {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn request_kinds(&self) -> &[RequestKind] {
        &[RequestKind::Log]
    }

    fn response_kinds(&self) -> &[ResponseKind] {
        &[ResponseKind::LogAck]
    }

    fn transform(self: Box<Self>, requests: RequestStream) -> DriverStream {
        requests
            .filter_map(|request| {
                future::ready(match request {
                    Request::Log { message } => {
                        info!(target: "cycle::log", "{message}");
                        Some(Ok(Response::LogAck))
                    }
                    _ => None,
                })
            })
            .boxed()
    }
}
