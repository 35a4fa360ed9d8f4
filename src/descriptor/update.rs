use super::require_name;
use crate::client::{
    WorkflowRunRef, WorkflowUpdateHandle, WorkflowUpdateOptions, WorkflowUpdateResultOptions,
};
use crate::engine::types::UpdateRequest;
use crate::engine::RawUpdateHandler;
use crate::error::Error;
use crate::payload::Payload;
use crate::workflow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::debug;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

/// A state-changing update taking `In` and answering `Out`
pub struct Update<In, Out> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Update<In, Out> {
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
}

impl<In, Out> Update<In, Out>
where
    In: DeserializeOwned + 'static,
    Out: Serialize + 'static,
{
    /// Serve this update from workflow code
    pub fn set_handler<F>(&self, ctx: &Context, handler: F) -> Result<(), Error>
    where
        F: Fn(In) -> Result<Out, Error> + Send + Sync + 'static,
    {
        require_name("update", &self.name);
        let raw: RawUpdateHandler = Arc::new(move |input: Payload| {
            let output = handler(input.decode()?)?;
            Payload::encode(&output)
        });
        ctx.raw().set_update_handler(&self.name, raw)
    }
}

impl<In: Serialize, Out> Update<In, Out> {
    /// Send the update and return a handle to its outcome
    pub async fn start(
        &self,
        run: &impl WorkflowRunRef,
        arg: In,
        options: WorkflowUpdateOptions,
    ) -> Result<WorkflowUpdateHandle<Out>, Error> {
        require_name("update", &self.name);
        let client = run.client();
        let raw = client
            .engine()
            .update_workflow(UpdateRequest {
                update_id: options.id.unwrap_or_default(),
                workflow_id: run.id().to_string(),
                run_id: run.run_id().map(str::to_string),
                first_execution_run_id: run.first_execution_run_id().map(str::to_string),
                update_name: self.name.to_string(),
                input: Payload::encode(&arg)?,
            })
            .await?;
        debug!(client.logger(), "Update accepted";
            "update" => self.name.as_ref(), "update_id" => raw.update_id());
        Ok(WorkflowUpdateHandle::from_raw(raw))
    }
}

impl<In: Serialize, Out: DeserializeOwned> Update<In, Out> {
    /// Send the update and wait for its result
    pub async fn execute(
        &self,
        run: &impl WorkflowRunRef,
        arg: In,
        options: WorkflowUpdateOptions,
    ) -> Result<Out, Error> {
        self.start(run, arg, options)
            .await?
            .get_result(WorkflowUpdateResultOptions::default())
            .await
    }
}

impl<In, Out> Clone for Update<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> std::fmt::Debug for Update<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Update").field("name", &self.name).finish()
    }
}
