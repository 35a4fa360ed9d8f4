use super::require_name;
use crate::client::{WorkflowQueryOptions, WorkflowRunRef};
use crate::engine::types::{QueryRequest, QueryResponse};
use crate::engine::RawQueryHandler;
use crate::error::Error;
use crate::payload::Payload;
use crate::workflow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

/// A read-only query taking `In` and answering `Out`
pub struct Query<In, Out> {
    name: Cow<'static, str>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Query<In, Out> {
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

impl<In, Out> Query<In, Out>
where
    In: DeserializeOwned + 'static,
    Out: Serialize + 'static,
{
    /// Answer this query from workflow code
    ///
    /// The handler must not block or mutate workflow state.
    pub fn set_handler<F>(&self, ctx: &Context, handler: F) -> Result<(), Error>
    where
        F: Fn(In) -> Result<Out, Error> + Send + Sync + 'static,
    {
        require_name("query", &self.name);
        let raw: RawQueryHandler = Arc::new(move |input: Payload| {
            let output = handler(input.decode()?)?;
            Payload::encode(&output)
        });
        ctx.raw().set_query_handler(&self.name, raw)
    }
}

impl<In: Serialize, Out: DeserializeOwned> Query<In, Out> {
    /// Query an execution
    ///
    /// A rejection is reported as [`Error::QueryRejected`].
    pub async fn execute(
        &self,
        run: &impl WorkflowRunRef,
        arg: In,
        options: WorkflowQueryOptions,
    ) -> Result<Out, Error> {
        require_name("query", &self.name);
        let response = run
            .client()
            .engine()
            .query_workflow(QueryRequest {
                workflow_id: run.id().to_string(),
                run_id: run.run_id().map(str::to_string),
                query_type: self.name.to_string(),
                input: Payload::encode(&arg)?,
                reject_condition: options.reject_condition,
            })
            .await?;
        match response {
            QueryResponse::Answered(payload) => payload.decode(),
            QueryResponse::Rejected(rejected) => Err(Error::QueryRejected(rejected)),
        }
    }
}

impl<In, Out> Clone for Query<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> std::fmt::Debug for Query<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("name", &self.name).finish()
    }
}
