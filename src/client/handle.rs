use super::options::{
    WorkflowCancelOptions, WorkflowDescribeOptions, WorkflowHistoryOptions,
    WorkflowResultOptions, WorkflowTerminateOptions,
};
use super::Client;
use crate::engine::types::{
    CancelRequest, History, HistoryRequest, TerminateRequest, WorkflowExecutionDescription,
};
use crate::error::Error;
use serde::de::DeserializeOwned;
use slog::debug;
use std::marker::PhantomData;
use std::ops::Deref;

/// Anything that identifies a workflow execution
pub trait WorkflowRunRef {
    fn client(&self) -> &Client;

    fn id(&self) -> &str;

    /// Targeted run; `None` means the latest
    fn run_id(&self) -> Option<&str>;

    fn first_execution_run_id(&self) -> Option<&str>;
}

/// Reference to a workflow execution
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    pub client: Client,
    pub id: String,
    pub run_id: Option<String>,
    pub first_execution_run_id: Option<String>,
}

impl WorkflowRunRef for WorkflowRun {
    fn client(&self) -> &Client {
        &self.client
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    fn first_execution_run_id(&self) -> Option<&str> {
        self.first_execution_run_id.as_deref()
    }
}

impl WorkflowRun {
    /// Request cancellation of the execution
    pub async fn cancel(&self, _options: WorkflowCancelOptions) -> Result<(), Error> {
        self.client
            .engine()
            .cancel_workflow(CancelRequest {
                workflow_id: self.id.clone(),
                run_id: self.run_id.clone(),
                identity: self.client.identity().to_string(),
            })
            .await
    }

    /// Forcefully stop the execution
    pub async fn terminate(&self, options: WorkflowTerminateOptions) -> Result<(), Error> {
        self.client
            .engine()
            .terminate_workflow(TerminateRequest {
                workflow_id: self.id.clone(),
                run_id: self.run_id.clone(),
                reason: options.reason,
                details: options.details,
                identity: self.client.identity().to_string(),
            })
            .await
    }

    /// Fetch the complete history, draining every page into memory
    pub async fn fetch_history(&self, options: WorkflowHistoryOptions) -> Result<History, Error> {
        let mut history = History::default();
        let mut next_page_token = Vec::new();
        loop {
            let page = self
                .client
                .engine()
                .get_workflow_history(HistoryRequest {
                    workflow_id: self.id.clone(),
                    run_id: self.run_id.clone(),
                    page_size: options.page_size,
                    next_page_token,
                })
                .await?;
            history.events.extend(page.events);
            if page.next_page_token.is_empty() {
                break;
            }
            next_page_token = page.next_page_token;
        }
        debug!(self.client.logger(), "Fetched workflow history";
            "workflow_id" => &self.id, "events" => history.events.len());
        Ok(history)
    }

    pub async fn describe(
        &self,
        _options: WorkflowDescribeOptions,
    ) -> Result<WorkflowExecutionDescription, Error> {
        self.client
            .engine()
            .describe_workflow_execution(&self.id, self.run_id.as_deref())
            .await
    }
}

/// Typed handle to a workflow execution whose result decodes to `Out`
pub struct WorkflowHandle<Out> {
    run: WorkflowRun,
    /// Run whose result `get_result` waits for; `None` means the latest
    pub result_run_id: Option<String>,
    _marker: PhantomData<fn() -> Out>,
}

impl<Out> WorkflowHandle<Out> {
    pub fn new(run: WorkflowRun, result_run_id: Option<String>) -> Self {
        Self {
            run,
            result_run_id,
            _marker: PhantomData,
        }
    }

    pub fn run(&self) -> &WorkflowRun {
        &self.run
    }
}

impl<Out: DeserializeOwned> WorkflowHandle<Out> {
    /// Wait for the execution to close and decode its result
    pub async fn get_result(&self, options: WorkflowResultOptions) -> Result<Out, Error> {
        self.run
            .client
            .engine()
            .get_workflow_result(
                &self.run.id,
                self.result_run_id.as_deref(),
                !options.disable_following_runs,
            )
            .await?
            .decode()
    }
}

impl<Out> Deref for WorkflowHandle<Out> {
    type Target = WorkflowRun;

    fn deref(&self) -> &Self::Target {
        &self.run
    }
}

impl<Out> WorkflowRunRef for WorkflowHandle<Out> {
    fn client(&self) -> &Client {
        &self.run.client
    }

    fn id(&self) -> &str {
        &self.run.id
    }

    fn run_id(&self) -> Option<&str> {
        self.run.run_id.as_deref()
    }

    fn first_execution_run_id(&self) -> Option<&str> {
        self.run.first_execution_run_id.as_deref()
    }
}

impl<Out> Clone for WorkflowHandle<Out> {
    fn clone(&self) -> Self {
        Self::new(self.run.clone(), self.result_run_id.clone())
    }
}

impl<Out> std::fmt::Debug for WorkflowHandle<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("id", &self.run.id)
            .field("run_id", &self.run.run_id)
            .field("first_execution_run_id", &self.run.first_execution_run_id)
            .field("result_run_id", &self.result_run_id)
            .finish()
    }
}
