//! Concrete drivers for the dialogue runtime.
//!
//! Each driver owns a disjoint slice of the request/response schema and
//! ignores everything else, `Request::Empty` included.

pub mod error;
pub mod http;
pub mod log;
pub mod tcp;

pub use error::{DriverError, Result};
pub use http::{HttpDriver, HttpDriverConfig};
pub use log::LogDriver;
pub use tcp::TcpDriver;
