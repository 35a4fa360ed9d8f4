use super::require_name;
use crate::client::{WorkflowRunRef, WorkflowSignalOptions};
use crate::engine::types::SignalRequest;
use crate::error::Error;
use crate::payload::Payload;
use crate::workflow::{Context, ReceiveChannel};
use serde::Serialize;
use std::borrow::Cow;
use std::marker::PhantomData;

/// A signal carrying `In`
pub struct Signal<In> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn(In)>,
}

impl<In> Signal<In> {
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

    /// Channel on which this signal arrives inside the workflow
    pub fn channel(&self, ctx: &Context) -> ReceiveChannel<In> {
        require_name("signal", &self.name);
        ReceiveChannel::from_raw(ctx.raw().signal_channel(&self.name))
    }
}

impl<In: Serialize> Signal<In> {
    /// Deliver the signal to an execution
    pub async fn send(
        &self,
        run: &impl WorkflowRunRef,
        arg: In,
        _options: WorkflowSignalOptions,
    ) -> Result<(), Error> {
        require_name("signal", &self.name);
        let client = run.client();
        client
            .engine()
            .signal_workflow(SignalRequest {
                workflow_id: run.id().to_string(),
                run_id: run.run_id().map(str::to_string),
                signal_name: self.name.to_string(),
                input: Payload::encode(&arg)?,
                identity: client.identity().to_string(),
            })
            .await
    }
}

impl<In> Clone for Signal<In> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In> std::fmt::Debug for Signal<In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("name", &self.name).finish()
    }
}
