//! The driver contract.

use futures::stream::BoxStream;

use crate::envelope::{Request, RequestKind, Response, ResponseKind};

/// Requests flowing from `main` to the drivers.
pub type RequestStream = BoxStream<'static, Request>;

/// Responses flowing from the merge point to `main` and state folds.
pub type ResponseStream = BoxStream<'static, Response>;

/// A driver's output. An `Err` item is a fatal fault of that driver.
pub type DriverStream = BoxStream<'static, anyhow::Result<Response>>;

/// One I/O subsystem.
///
/// `transform` is called exactly once, when the dialogue starts, with the
/// broadcast request stream: every driver sees every request. A driver acts
/// on the variants it owns and ignores the rest, including `Request::Empty`.
/// It never forwards requests to another driver.
///
/// Recoverable failures belong in the response stream as data. Only yield
/// `Err` when the driver cannot go on.
pub trait Driver: Send + 'static {
    /// Unique within a [`Drivers`](crate::Drivers) registry.
    fn key(&self) -> &str;

    /// Request variants this driver acts on. Empty means undeclared.
    /// Used for diagnostics only; routing stays inside `transform`.
    fn request_kinds(&self) -> &[RequestKind] {
        &[]
    }

    /// Response variants this driver emits. Empty means undeclared.
    fn response_kinds(&self) -> &[ResponseKind] {
        &[]
    }

    fn transform(self: Box<Self>, requests: RequestStream) -> DriverStream;
}

/// A driver built from a closure. See [`driver_fn`].
pub struct FnDriver<F> {
    key: String,
    request_kinds: Vec<RequestKind>,
    response_kinds: Vec<ResponseKind>,
    transform: F,
}

/// Build a driver from a key and a transform closure.
pub fn driver_fn<F>(key: impl Into<String>, transform: F) -> FnDriver<F>
where
    F: FnOnce(RequestStream) -> DriverStream + Send + 'static,
{
    FnDriver {
        key: key.into(),
        request_kinds: Vec::new(),
        response_kinds: Vec::new(),
        transform,
    }
}

impl<F> FnDriver<F> {
    pub fn handles(mut self, kinds: &[RequestKind]) -> Self {
        self.request_kinds = kinds.to_vec();
        self
    }

    pub fn emits(mut self, kinds: &[ResponseKind]) -> Self {
        self.response_kinds = kinds.to_vec();
        self
    }
}

impl<F> Driver for FnDriver<F>
where
    F: FnOnce(RequestStream) -> DriverStream + Send + 'static,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn request_kinds(&self) -> &[RequestKind] {
        &self.request_kinds
    }

    fn response_kinds(&self) -> &[ResponseKind] {
        &self.response_kinds
    }

    fn transform(self: Box<Self>, requests: RequestStream) -> DriverStream {
        (self.transform)(requests)
    }
}
