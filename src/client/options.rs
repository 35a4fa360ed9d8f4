use crate::descriptor::Signal;
use crate::engine::types::{QueryRejectCondition, StartWorkflowRequest, WorkflowIdReusePolicy};
use crate::error::Error;
use crate::payload::Payload;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Options for starting a workflow execution.
#[derive(Clone, Debug, Default)]
pub struct StartWorkflowOptions {
    /// Workflow ID; a random one is generated when absent
    pub id: Option<String>,

    /// Task queue the execution is routed to
    pub task_queue: String,

    /// Limit on the whole execution, including continued runs
    pub execution_timeout: Option<Duration>,

    pub id_reuse_policy: WorkflowIdReusePolicy,

    /// Values readable from workflow code through `Context::value`
    pub header: HashMap<String, Payload>,
}

impl StartWorkflowOptions {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn with_id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.id_reuse_policy = policy;
        self
    }

    /// Attach a header value, encoded like any other payload.
    pub fn with_header<T: Serialize + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, Error> {
        self.header.insert(key.into(), Payload::encode(value)?);
        Ok(self)
    }

    pub(crate) fn into_request(
        self,
        workflow_type: &str,
        input: Payload,
        identity: &str,
    ) -> StartWorkflowRequest {
        StartWorkflowRequest {
            workflow_id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            workflow_type: workflow_type.to_string(),
            task_queue: self.task_queue,
            input,
            execution_timeout: self.execution_timeout,
            id_reuse_policy: self.id_reuse_policy,
            header: self.header,
            identity: identity.to_string(),
        }
    }
}

/// Options for signal-with-start.
pub struct SignalWithStartOptions<'a, S> {
    pub start_options: StartWorkflowOptions,
    pub signal: &'a Signal<S>,
    pub signal_arg: S,
}

/// Identifiers of an existing execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowHandleOptions {
    pub id: String,
    /// Targets the latest run when absent
    pub run_id: Option<String>,
    pub first_execution_run_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkflowResultOptions {
    /// Report `EngineError::ContinuedAsNew` instead of following the chain
    pub disable_following_runs: bool,
}

#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct WorkflowCancelOptions {}

#[derive(Clone, Debug, Default)]
pub struct WorkflowTerminateOptions {
    pub reason: String,
    pub details: Vec<Payload>,
}

impl WorkflowTerminateOptions {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: Vec::new(),
        }
    }

    /// Attach a free-form detail value.
    pub fn with_detail<T: Serialize + ?Sized>(mut self, detail: &T) -> Result<Self, Error> {
        self.details.push(Payload::encode(detail)?);
        Ok(self)
    }
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowHistoryOptions {
    /// Events requested per page; engine default when zero
    pub page_size: usize,
}

#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct WorkflowDescribeOptions {}

#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct WorkflowSignalOptions {}

#[derive(Clone, Debug, Default)]
pub struct WorkflowQueryOptions {
    pub reject_condition: QueryRejectCondition,
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowUpdateOptions {
    /// Update ID; a random one is generated when absent
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct WorkflowUpdateResultOptions {}

#[derive(Clone, Debug, Default)]
pub struct WorkflowListOptions {
    /// Visibility query, e.g. `WorkflowType = 'SayHello'`; empty lists all
    pub query: String,
    /// Executions requested per page; engine default when zero
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_options_generate_missing_id() {
        let request = StartWorkflowOptions::new("queue").into_request("Greet", Payload::unit(), "me");
        assert!(!request.workflow_id.is_empty());
        assert_eq!(request.task_queue, "queue");

        let request = StartWorkflowOptions::new("queue")
            .with_id("fixed")
            .into_request("Greet", Payload::unit(), "me");
        assert_eq!(request.workflow_id, "fixed");
    }

    #[test]
    fn test_header_values_are_encoded() {
        let options = StartWorkflowOptions::new("queue")
            .with_header("tenant", "acme")
            .unwrap();
        assert_eq!(options.header["tenant"].decode::<String>().unwrap(), "acme");
    }
}
