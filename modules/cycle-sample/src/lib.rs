pub mod config;
pub mod flow;

pub use config::SampleConfig;
pub use flow::{flow, AppState, ClientState, Command};
