use thiserror::Error;

/// Main error type for the TrainDeck system
#[derive(Error, Debug)]
pub enum TdError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote service error: {0}")]
    RemoteService(#[from] RemoteServiceError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TdError {
    /// Whether the caller may reasonably retry the operation with backoff.
    ///
    /// Only failures talking to the remote service qualify. Nothing in this
    /// crate retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteService(_))
    }
}

/// Malformed input supplied by the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Required field is empty: {field}")]
    EmptyField { field: String },

    #[error("Hyperparameter {name} must be a bool, number or string, got {kind}")]
    NonScalarHyperparameter { name: String, kind: String },

    #[error("Invalid metric pattern for {name}: {message}")]
    InvalidMetricPattern { name: String, message: String },

    #[error("Metric pattern for {name} must have exactly one capture group, found {groups}")]
    CaptureGroupCount { name: String, groups: usize },

    #[error("Search space has no parameters")]
    EmptySearchSpace,

    #[error("Duplicate search parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Range for {name} is empty")]
    EmptyRange { name: String },

    #[error("Range for {name} requires low < high, got [{low}, {high}]")]
    InvertedRange { name: String, low: String, high: String },

    #[error("Scaling for {name} is not valid for [{low}, {high}]: {message}")]
    InvalidScaling {
        name: String,
        low: String,
        high: String,
        message: String,
    },

    #[error("Parameter {name} is both tuned and static")]
    ParameterConflict { name: String },

    #[error("No role given and the session has no default role")]
    MissingRole,

    #[error("Instance count must be at least 1")]
    InvalidInstanceCount,

    #[error("Invalid search budget: {message}")]
    InvalidBudget { message: String },

    #[error("{message}")]
    Invalid { message: String },
}

/// Failures while talking to the remote job or search API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteServiceError {
    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Unknown job: {job_id}")]
    UnknownJob { job_id: String },

    #[error("Unknown search: {search_id}")]
    UnknownSearch { search_id: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },
}

/// A job or search did not reach a terminal state in time. The remote work
/// is left running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeoutError {
    #[error("Job {job_id} not finished after {waited_secs} seconds")]
    Job { job_id: String, waited_secs: u64 },

    #[error("Search {search_id} not finished after {waited_secs} seconds")]
    Search { search_id: String, waited_secs: u64 },
}

/// Result type alias for TrainDeck operations
pub type TdResult<T> = Result<T, TdError>;

/// Result alias for calls made against a remote service.
pub type ServiceResult<T> = Result<T, RemoteServiceError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::TdError::Validation($crate::ValidationError::Invalid {
            message: format!($($arg)*),
        })
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TdError::Config(format!($($arg)*))
    };
}
