use super::require_name;
use crate::client::{
    Client, SignalWithStartOptions, StartWorkflowOptions, WorkflowHandle, WorkflowHandleOptions,
    WorkflowResultOptions, WorkflowRun,
};
use crate::engine::types::{SignalWithStartRequest, StartedRun};
use crate::error::Error;
use crate::payload::Payload;
use crate::worker::{Worker, WorkflowFunction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::info;
use std::borrow::Cow;
use std::marker::PhantomData;

/// A workflow type taking `In` and producing `Out`
pub struct Workflow<In, Out> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Workflow<In, Out> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for an existing execution
    pub fn get_handle(&self, client: &Client, options: WorkflowHandleOptions) -> WorkflowHandle<Out> {
        WorkflowHandle::new(
            WorkflowRun {
                client: client.clone(),
                id: options.id,
                run_id: options.run_id.clone(),
                first_execution_run_id: options.first_execution_run_id,
            },
            options.run_id,
        )
    }

    fn started_handle(&self, client: &Client, started: StartedRun) -> WorkflowHandle<Out> {
        WorkflowHandle::new(
            WorkflowRun {
                client: client.clone(),
                id: started.workflow_id,
                run_id: None,
                first_execution_run_id: Some(started.run_id.clone()),
            },
            Some(started.run_id),
        )
    }
}

impl<In, Out> Workflow<In, Out>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
{
    /// Register the implementation of this workflow on a worker
    ///
    /// # Panics
    ///
    /// Panics if the workflow has no name.
    pub fn register<F>(&self, worker: &Worker, f: F) -> Result<(), Error>
    where
        F: WorkflowFunction<In, Out>,
    {
        require_name("workflow", &self.name);
        worker.register_workflow(&self.name, f)
    }
}

impl<In: Serialize, Out> Workflow<In, Out> {
    /// Start a new execution
    pub async fn start(
        &self,
        client: &Client,
        arg: In,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowHandle<Out>, Error> {
        require_name("workflow", &self.name);
        let input = Payload::encode(&arg)?;
        let request = options.into_request(&self.name, input, client.identity());
        let started = client.engine().start_workflow(request).await?;
        info!(client.logger(), "Started workflow";
            "workflow_type" => self.name.as_ref(),
            "workflow_id" => &started.workflow_id,
            "run_id" => &started.run_id);
        Ok(self.started_handle(client, started))
    }

    /// Signal the running execution, starting it first if none is running
    pub async fn signal_with_start<S: Serialize>(
        &self,
        client: &Client,
        arg: In,
        options: SignalWithStartOptions<'_, S>,
    ) -> Result<WorkflowHandle<Out>, Error> {
        require_name("workflow", &self.name);
        require_name("signal", options.signal.name());
        let input = Payload::encode(&arg)?;
        let signal_input = Payload::encode(&options.signal_arg)?;
        let request = SignalWithStartRequest {
            start: options
                .start_options
                .into_request(&self.name, input, client.identity()),
            signal_name: options.signal.name().to_string(),
            signal_input,
        };
        let started = client.engine().signal_with_start_workflow(request).await?;
        Ok(self.started_handle(client, started))
    }

    /// Build the error a workflow returns to continue as a new run with `input`
    pub fn continue_as_new(&self, input: &In) -> Error {
        match Payload::encode(input) {
            Ok(input) => Error::ContinueAsNew {
                workflow_type: self.name.to_string(),
                input,
            },
            Err(e) => e,
        }
    }
}

impl<In: Serialize, Out: DeserializeOwned> Workflow<In, Out> {
    /// Start a new execution and wait for its result
    pub async fn execute(
        &self,
        client: &Client,
        arg: In,
        options: StartWorkflowOptions,
    ) -> Result<Out, Error> {
        self.start(client, arg, options)
            .await?
            .get_result(WorkflowResultOptions::default())
            .await
    }
}

impl<In, Out> Clone for Workflow<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> std::fmt::Debug for Workflow<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow").field("name", &self.name).finish()
    }
}
