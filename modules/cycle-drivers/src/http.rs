use std::time::Duration;

use cycle_core::{Driver, DriverStream, Request, RequestKind, RequestStream, Response, ResponseKind};
use futures::future;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct HttpDriverConfig {
    pub timeout: Duration,
    /// Fetches running at once. Further requests queue behind them.
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for HttpDriverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_in_flight: 8,
            user_agent: concat!("cycle/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Turns `Request::Http` into GET requests.
///
/// A successful fetch yields `Response::Http`; a transport error or a
/// non-2xx status yields `Response::HttpFailed`. Neither faults the driver.
/// Responses come back in completion order, not request order.
pub struct HttpDriver {
    client: reqwest::Client,
    max_in_flight: usize,
}

impl HttpDriver {
    pub const KEY: &'static str = "http";

    pub fn new(config: HttpDriverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            client,
            max_in_flight: config.max_in_flight.max(1),
        })
    }
}

impl Driver for HttpDriver {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn request_kinds(&self) -> &[RequestKind] {
        &[RequestKind::Http]
    }

    fn response_kinds(&self) -> &[ResponseKind] {
        &[ResponseKind::Http, ResponseKind::HttpFailed]
    }

    fn transform(self: Box<Self>, requests: RequestStream) -> DriverStream {
        let HttpDriver {
            client,
            max_in_flight,
        } = *self;
        requests
            .filter_map(|request| {
                future::ready(match request {
                    Request::Http { id, url } => Some((id, url)),
                    _ => None,
                })
            })
            .map(move |(id, url)| fetch(client.clone(), id, url))
            .buffer_unordered(max_in_flight)
            .map(Ok)
            .boxed()
    }
}

async fn fetch(client: reqwest::Client, id: u64, url: String) -> Response {
    debug!(request_id = id, url = url.as_str(), "HTTP GET");

    let failed = |reason: String| {
        warn!(request_id = id, url = url.as_str(), reason = reason.as_str(), "HTTP request failed");
        Response::HttpFailed {
            origin_request_id: id,
            reason,
        }
    };

    let resp = match client.get(&url).send().await {
        Ok(resp) => resp,
        Err(e) => return failed(e.to_string()),
    };

    let status = resp.status();
    if !status.is_success() {
        return failed(format!("status {}", status.as_u16()));
    }

    match resp.text().await {
        Ok(content) => {
            debug!(request_id = id, bytes = content.len(), "HTTP response received");
            Response::Http {
                origin_request_id: id,
                content,
            }
        }
        Err(e) => failed(e.to_string()),
    }
}
