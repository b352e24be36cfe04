//! Dialogue runtime.
//!
//! A pure `main` turns a stream of responses into a stream of requests.
//! Drivers turn requests into effects and effects into responses. [`run`]
//! closes the loop: main → feedback proxy → drivers → merge → main.
//!
//! State is derived from the response stream with [`fold`] and
//! [`partitioned_fold`], never shared mutably.

pub mod driver;
pub mod envelope;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod responses;
pub mod run;
pub mod state;

pub use driver::{driver_fn, Driver, DriverStream, FnDriver, RequestStream, ResponseStream};
pub use envelope::{ClientId, Request, RequestKind, Response, ResponseKind};
pub use error::{CycleError, Result};
pub use proxy::{FeedbackProxy, RequestSink};
pub use registry::Drivers;
pub use responses::{Responses, Tagged};
pub use run::{run, Dialogue};
pub use state::{
    fold, fold_reducible, partitioned_fold, try_fold, try_partitioned_fold, Partition, Reducible,
    StateStream,
};
