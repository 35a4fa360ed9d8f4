//! Request, response and record types exchanged with the engine

use crate::error::QueryRejected;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Lifecycle status of one run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

impl WorkflowExecutionStatus {
    /// Whether the run can still make progress
    pub fn is_open(&self) -> bool {
        matches!(self, WorkflowExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowExecutionStatus::Running => "Running",
            WorkflowExecutionStatus::Completed => "Completed",
            WorkflowExecutionStatus::Failed => "Failed",
            WorkflowExecutionStatus::Canceled => "Canceled",
            WorkflowExecutionStatus::Terminated => "Terminated",
            WorkflowExecutionStatus::ContinuedAsNew => "ContinuedAsNew",
            WorkflowExecutionStatus::TimedOut => "TimedOut",
        }
    }
}

impl std::str::FromStr for WorkflowExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(WorkflowExecutionStatus::Running),
            "Completed" => Ok(WorkflowExecutionStatus::Completed),
            "Failed" => Ok(WorkflowExecutionStatus::Failed),
            "Canceled" => Ok(WorkflowExecutionStatus::Canceled),
            "Terminated" => Ok(WorkflowExecutionStatus::Terminated),
            "ContinuedAsNew" => Ok(WorkflowExecutionStatus::ContinuedAsNew),
            "TimedOut" => Ok(WorkflowExecutionStatus::TimedOut),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// What to do when starting an ID that already has a closed run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowIdReusePolicy {
    /// A new run may start once the previous one closed
    #[default]
    AllowDuplicate,
    /// Only allow a new run if the previous one did not complete successfully
    AllowDuplicateFailedOnly,
    /// Never reuse the ID
    RejectDuplicate,
}

/// Request to start one run
#[derive(Clone, Debug)]
pub struct StartWorkflowRequest {
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub input: Payload,
    pub execution_timeout: Option<Duration>,
    pub id_reuse_policy: WorkflowIdReusePolicy,
    pub header: HashMap<String, Payload>,
    pub identity: String,
}

/// Identifiers of a run returned at start
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartedRun {
    pub workflow_id: String,
    pub run_id: String,
}

/// Request to signal a running execution, starting it first if needed
#[derive(Clone, Debug)]
pub struct SignalWithStartRequest {
    pub start: StartWorkflowRequest,
    pub signal_name: String,
    pub signal_input: Payload,
}

/// Request to deliver a signal
#[derive(Clone, Debug)]
pub struct SignalRequest {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub signal_name: String,
    pub input: Payload,
    pub identity: String,
}

/// When a query should be rejected instead of answered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryRejectCondition {
    /// Always answer
    #[default]
    None,
    /// Reject if the run is closed
    NotOpen,
    /// Reject if the run closed with anything other than success
    NotCompletedCleanly,
}

/// Request to run a query handler
#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub query_type: String,
    pub input: Payload,
    pub reject_condition: QueryRejectCondition,
}

/// Engine answer to a query
#[derive(Clone, Debug)]
pub enum QueryResponse {
    Answered(Payload),
    Rejected(QueryRejected),
}

/// Request to run an update handler
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    pub update_id: String,
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub first_execution_run_id: Option<String>,
    pub update_name: String,
    pub input: Payload,
}

/// Request to cancel a run
#[derive(Clone, Debug)]
pub struct CancelRequest {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub identity: String,
}

/// Request to terminate a run
#[derive(Clone, Debug)]
pub struct TerminateRequest {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub reason: String,
    pub details: Vec<Payload>,
    pub identity: String,
}

/// Request for one page of history
#[derive(Clone, Debug)]
pub struct HistoryRequest {
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub page_size: usize,
    pub next_page_token: Vec<u8>,
}

/// One page of history
#[derive(Clone, Debug, Default)]
pub struct HistoryPage {
    pub events: Vec<HistoryEvent>,
    pub next_page_token: Vec<u8>,
}

/// Ordered events of one run
#[derive(Clone, Debug, Default)]
pub struct History {
    pub events: Vec<HistoryEvent>,
}

/// A recorded event
#[derive(Clone, Debug)]
pub struct HistoryEvent {
    pub event_id: u64,
    pub time: SystemTime,
    pub kind: HistoryEventKind,
}

/// What a history event recorded
#[derive(Clone, Debug)]
pub enum HistoryEventKind {
    WorkflowExecutionStarted {
        workflow_type: String,
        task_queue: String,
        input: Payload,
    },
    WorkflowExecutionSignaled {
        signal_name: String,
        input: Payload,
        identity: String,
    },
    ActivityTaskScheduled {
        activity_id: String,
        activity_type: String,
    },
    ActivityTaskCompleted {
        activity_id: String,
    },
    ActivityTaskFailed {
        activity_id: String,
        message: String,
    },
    TimerStarted {
        timer_id: String,
        duration: Duration,
    },
    TimerFired {
        timer_id: String,
    },
    UpdateCompleted {
        update_id: String,
        update_name: String,
    },
    WorkflowExecutionCancelRequested {
        identity: String,
    },
    WorkflowExecutionCompleted {
        result: Payload,
    },
    WorkflowExecutionFailed {
        message: String,
    },
    WorkflowExecutionCanceled,
    WorkflowExecutionTerminated {
        reason: String,
        identity: String,
    },
    WorkflowExecutionContinuedAsNew {
        new_run_id: String,
    },
    WorkflowExecutionTimedOut,
}

/// Summary of one run
#[derive(Clone, Debug)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: WorkflowExecutionStatus,
    pub start_time: SystemTime,
    pub close_time: Option<SystemTime>,
    pub history_length: u64,
}

/// Point-in-time description of one run
#[derive(Clone, Debug)]
pub struct WorkflowExecutionDescription {
    pub execution: WorkflowExecution,
    pub first_execution_run_id: String,
    pub continued_from_run_id: Option<String>,
    pub pending_activities: usize,
}

/// Request for one page of matching executions
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub query: String,
    pub page_size: usize,
    pub next_page_token: Vec<u8>,
}

/// One page of matching executions
#[derive(Clone, Debug, Default)]
pub struct ListResponse {
    pub executions: Vec<WorkflowExecution>,
    pub next_page_token: Vec<u8>,
}

/// Capabilities advertised by the orchestration service
///
/// Parsed from JSON with unknown fields ignored so that newer services can
/// add capabilities without breaking older workers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub signal_and_query_header: bool,
    pub internal_error_differentiation: bool,
    pub activity_failure_include_heartbeat: bool,
    pub supports_schedules: bool,
    pub encoded_failure_attributes: bool,
    pub upsert_memo: bool,
    pub eager_workflow_start: bool,
    pub sdk_metadata: bool,
}

/// Options for one on-demand worker invocation
#[derive(Clone, Debug, Default)]
pub struct SingleRunOptions {
    /// Capabilities supplied by the caller; defaults when absent
    pub server_capabilities: Option<ServerCapabilities>,
    /// Upper bound on how long the run waits for dispatched work
    pub deadline: Option<Duration>,
}

/// Metadata of the current run, visible from workflow code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowInfo {
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub first_execution_run_id: String,
    pub continued_from_run_id: Option<String>,
}

/// Options for scheduling an activity from a workflow
#[derive(Clone, Debug, Default)]
pub struct ActivityOptions {
    /// Explicit activity ID; generated when absent
    pub activity_id: Option<String>,
    /// Maximum time a single attempt may run
    pub start_to_close_timeout: Option<Duration>,
}

impl ActivityOptions {
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }
}

/// Metadata of the current activity attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityInfo {
    pub activity_id: String,
    pub activity_type: String,
    pub workflow_id: String,
    pub workflow_run_id: String,
    pub task_queue: String,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_ignore_unknown_fields() {
        let body = r#"{"signalAndQueryHeader": true, "somethingNew": 42}"#;
        let caps: ServerCapabilities = serde_json::from_str(body).unwrap();
        assert!(caps.signal_and_query_header);
        assert!(!caps.upsert_memo);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            WorkflowExecutionStatus::Running,
            WorkflowExecutionStatus::ContinuedAsNew,
            WorkflowExecutionStatus::Terminated,
        ] {
            assert_eq!(status.as_str().parse::<WorkflowExecutionStatus>(), Ok(status));
        }
        assert!("Sleeping".parse::<WorkflowExecutionStatus>().is_err());
    }
}
