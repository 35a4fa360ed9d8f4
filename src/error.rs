//! Error types for typeflow

use crate::engine::types::WorkflowExecutionStatus;
use crate::payload::Payload;
use thiserror::Error;

/// Result type for typeflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the orchestration engine, passed through verbatim
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    /// Execution (or run) does not exist
    #[error("workflow execution not found: {workflow_id} (run: {run_id:?})")]
    NotFound {
        workflow_id: String,
        run_id: Option<String>,
    },

    /// An execution with this ID is already running
    #[error("workflow execution already started: {workflow_id}")]
    AlreadyStarted { workflow_id: String },

    /// Send on a closed channel
    #[error("channel closed")]
    ChannelClosed,

    /// The awaited run continued into a new run and following was disabled
    #[error("workflow continued as new into run {new_run_id}")]
    ContinuedAsNew { new_run_id: String },

    /// Workflow function returned an error
    #[error("workflow execution failed: {message}")]
    WorkflowFailed { message: String },

    /// Activity function returned an error or timed out
    #[error("activity {activity_type} failed: {message}")]
    ActivityFailed {
        activity_type: String,
        message: String,
    },

    /// Execution was canceled
    #[error("workflow execution canceled")]
    Canceled,

    /// Execution was terminated
    #[error("workflow execution terminated: {reason}")]
    Terminated { reason: String },

    /// Execution or operation exceeded its timeout
    #[error("timed out: {0}")]
    TimedOut(String),

    /// No handler or worker is available for the named operation
    #[error("no worker registered for {kind} '{name}' on task queue '{task_queue}'")]
    NoWorker {
        kind: String,
        name: String,
        task_queue: String,
    },

    /// Request rejected as malformed, e.g. an unparsable list query
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Engine cannot be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Unexpected engine state
    #[error("engine internal error: {0}")]
    Internal(String),
}

/// A query was rejected by the execution's reject-condition policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRejected {
    /// Status of the execution at the time of rejection
    pub status: WorkflowExecutionStatus,
}

/// Errors that can occur when using the typed facade
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Transport or engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Value could not be converted into a payload
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// Payload present but not convertible to the expected type
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// Query rejected by execution state
    #[error("query rejected, workflow status: {:?}", .0.status)]
    QueryRejected(QueryRejected),

    /// Update result requested on a handle rebuilt from identifiers
    #[error("must have obtained handle from update start")]
    UpdateHandleNotFromStart,

    /// A workflow or activity with this name is already registered
    #[error("{kind} '{name}' is already registered")]
    AlreadyRegistered { kind: &'static str, name: String },

    /// Registration attempted after the worker started
    #[error("worker for task queue '{0}' already started")]
    WorkerStarted(String),

    /// Error raised by user workflow or activity code
    #[error("{0}")]
    Application(String),

    /// Returned by a workflow to continue as a new run
    #[error("continue as new ({workflow_type})")]
    ContinueAsNew {
        workflow_type: String,
        input: Payload,
    },

    /// The execution context was canceled
    #[error("canceled")]
    Canceled,

    /// Metric could not be created, registered or exported
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::Metrics(e.to_string())
    }
}

impl Error {
    /// Create an application error from user code
    pub fn application(message: impl Into<String>) -> Self {
        Error::Application(message.into())
    }

    /// Whether this is a query rejection
    pub fn is_query_rejected(&self) -> bool {
        matches!(self, Error::QueryRejected(_))
    }
}
