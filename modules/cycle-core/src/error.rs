use thiserror::Error;

pub type Result<T> = std::result::Result<T, CycleError>;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("driver key already registered: {0}")]
    DuplicateDriver(String),

    /// A driver's response stream yielded an error. Fatal for the whole dialogue.
    #[error("driver '{driver}' faulted: {source}")]
    DriverFault {
        driver: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("dialogue must be started inside a Tokio runtime")]
    NoRuntime,

    #[error("dialogue task panicked: {0}")]
    TaskPanicked(String),
}

impl CycleError {
    pub(crate) fn driver_fault(driver: &str, error: anyhow::Error) -> Self {
        CycleError::DriverFault {
            driver: driver.to_string(),
            source: error.into(),
        }
    }
}
