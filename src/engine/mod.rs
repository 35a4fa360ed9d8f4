//! Engine interface
//!
//! The orchestration engine is an external collaborator. This module names
//! the untyped primitives the typed facade is built on:
//! - Execution-scoped primitives: [`EngineContext`], [`RawChannel`],
//!   [`RawFuture`], [`RawSettable`] and the raw select cases
//! - Client-side RPCs: [`EngineClient`], [`RawUpdateHandle`]
//!
//! [`local::LocalEngine`] is an in-process implementation of both sides.

pub mod local;
pub mod types;

use crate::error::Error;
use crate::payload::Payload;
use crate::worker::Registry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;
use types::{
    ActivityOptions, CancelRequest, HistoryPage, HistoryRequest, ListRequest, ListResponse,
    QueryRequest, QueryResponse, SignalRequest, SignalWithStartRequest, SingleRunOptions,
    StartWorkflowRequest, StartedRun, TerminateRequest, UpdateRequest,
    WorkflowExecutionDescription, WorkflowInfo,
};

/// Untyped query handler registered by workflow code
pub type RawQueryHandler = Arc<dyn Fn(Payload) -> Result<Payload, Error> + Send + Sync>;

/// Untyped update handler registered by workflow code
pub type RawUpdateHandler = Arc<dyn Fn(Payload) -> Result<Payload, Error> + Send + Sync>;

/// Outcome of a non-suspending receive
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawReceive {
    Value(Payload),
    Empty,
    Closed,
}

/// Untyped message channel bound to one execution
#[async_trait]
pub trait RawChannel: Send + Sync {
    /// Send, suspending until a receiver or buffer slot takes the value
    async fn send(&self, ctx: &dyn EngineContext, value: Payload) -> Result<(), Error>;

    /// Send only if it would not suspend; `Ok(false)` means it would
    fn try_send(&self, value: &Payload) -> Result<bool, Error>;

    /// Receive, suspending until a value arrives; `None` once closed and drained
    async fn receive(&self, ctx: &dyn EngineContext) -> Option<Payload>;

    /// Receive without suspending
    fn try_receive(&self) -> RawReceive;

    /// Count a receiver waiting on this channel from inside a select
    ///
    /// While counted, a send on an unbuffered channel is accepted without
    /// suspending. Every call is paired with [`RawChannel::unpark_receiver`].
    fn park_receiver(&self) {}

    fn unpark_receiver(&self) {}

    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Number of buffered, undelivered values
    fn len(&self) -> usize;
}

/// Read side of an untyped single-assignment future
#[async_trait]
pub trait RawFuture: Send + Sync {
    async fn get(&self, ctx: &dyn EngineContext) -> Result<Payload, Error>;

    fn is_ready(&self) -> bool;
}

/// Write side of an untyped single-assignment future
pub trait RawSettable: Send + Sync {
    fn set(&self, result: Result<Payload, Error>);
}

/// One case handed to the engine's multiplexer
#[derive(Clone)]
pub enum RawSelectCase {
    Receive(Arc<dyn RawChannel>),
    Send(Arc<dyn RawChannel>, Payload),
    Future(Arc<dyn RawFuture>),
    Default,
}

/// The case the engine's multiplexer chose
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawSelected {
    /// A receive case fired; `value` is `None` when the channel was closed
    Received { index: usize, value: Option<Payload> },
    /// A send case delivered its value
    Sent { index: usize },
    /// A future case became ready
    FutureReady { index: usize },
    /// Nothing else was ready
    Default { index: usize },
}

impl RawSelected {
    pub fn index(&self) -> usize {
        match self {
            RawSelected::Received { index, .. }
            | RawSelected::Sent { index }
            | RawSelected::FutureReady { index }
            | RawSelected::Default { index } => *index,
        }
    }
}

/// Opaque handle to the current cooperative execution frame
#[async_trait]
pub trait EngineContext: Send + Sync {
    fn info(&self) -> WorkflowInfo;

    fn logger(&self) -> Logger;

    /// Zero-payload channel closed when cancellation is requested
    fn done(&self) -> Arc<dyn RawChannel>;

    fn is_canceled(&self) -> bool;

    /// Header value supplied at start
    fn header(&self, key: &str) -> Option<Payload>;

    fn new_channel(&self, capacity: usize) -> Arc<dyn RawChannel>;

    fn new_future(&self) -> (Arc<dyn RawFuture>, Arc<dyn RawSettable>);

    fn new_timer(&self, duration: Duration) -> Arc<dyn RawFuture>;

    /// Inbound channel for the named signal
    fn signal_channel(&self, name: &str) -> Arc<dyn RawChannel>;

    fn set_query_handler(&self, name: &str, handler: RawQueryHandler) -> Result<(), Error>;

    fn set_update_handler(&self, name: &str, handler: RawUpdateHandler) -> Result<(), Error>;

    fn execute_activity(
        &self,
        activity_type: &str,
        input: Payload,
        options: ActivityOptions,
    ) -> Arc<dyn RawFuture>;

    /// Run a coroutine within the same execution
    fn spawn(&self, coroutine: BoxFuture<'static, ()>);

    /// Suspend until one case is ready and report which
    async fn select(&self, cases: &[RawSelectCase]) -> Result<RawSelected, Error>;
}

/// Update accepted by the engine
#[async_trait]
pub trait RawUpdateHandle: Send + Sync {
    fn update_id(&self) -> &str;

    fn workflow_id(&self) -> &str;

    fn run_id(&self) -> &str;

    async fn get(&self) -> Result<Payload, Error>;
}

/// Connection to the orchestration service
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<StartedRun, Error>;

    async fn signal_with_start_workflow(
        &self,
        request: SignalWithStartRequest,
    ) -> Result<StartedRun, Error>;

    /// Wait for a run to close and return its result
    async fn get_workflow_result(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        follow_runs: bool,
    ) -> Result<Payload, Error>;

    async fn signal_workflow(&self, request: SignalRequest) -> Result<(), Error>;

    async fn query_workflow(&self, request: QueryRequest) -> Result<QueryResponse, Error>;

    async fn update_workflow(
        &self,
        request: UpdateRequest,
    ) -> Result<Arc<dyn RawUpdateHandle>, Error>;

    async fn cancel_workflow(&self, request: CancelRequest) -> Result<(), Error>;

    async fn terminate_workflow(&self, request: TerminateRequest) -> Result<(), Error>;

    async fn get_workflow_history(&self, request: HistoryRequest) -> Result<HistoryPage, Error>;

    async fn describe_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<WorkflowExecutionDescription, Error>;

    async fn list_workflow(&self, request: ListRequest) -> Result<ListResponse, Error>;

    /// Serve the task queue with the given registry until detached
    fn attach_worker(&self, task_queue: &str, registry: Arc<Registry>) -> Result<(), Error>;

    fn detach_worker(&self, task_queue: &str);

    /// Process the currently pending work on the task queue once
    async fn execute_single_run(
        &self,
        task_queue: &str,
        registry: Arc<Registry>,
        options: SingleRunOptions,
    ) -> Result<(), Error>;
}
