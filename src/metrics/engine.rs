use super::ClientMetrics;
use crate::engine::types::{
    CancelRequest, HistoryPage, HistoryRequest, ListRequest, ListResponse, QueryRequest,
    QueryResponse, SignalRequest, SignalWithStartRequest, SingleRunOptions, StartWorkflowRequest,
    StartedRun, TerminateRequest, UpdateRequest, WorkflowExecutionDescription,
};
use crate::engine::{EngineClient, RawUpdateHandle};
use crate::error::Error;
use crate::payload::Payload;
use crate::worker::Registry;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Engine connection that records the latency of every request
pub struct MeteredEngine {
    inner: Arc<dyn EngineClient>,
    metrics: ClientMetrics,
}

impl MeteredEngine {
    pub fn new(inner: Arc<dyn EngineClient>, metrics: ClientMetrics) -> Self {
        Self { inner, metrics }
    }

    async fn timed<T>(&self, operation: &str, request: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let result = request.await;
        self.metrics.observe(operation, started.elapsed());
        result
    }
}

#[async_trait]
impl EngineClient for MeteredEngine {
    async fn start_workflow(&self, request: StartWorkflowRequest) -> Result<StartedRun, Error> {
        self.timed("start_workflow", self.inner.start_workflow(request))
            .await
    }

    async fn signal_with_start_workflow(
        &self,
        request: SignalWithStartRequest,
    ) -> Result<StartedRun, Error> {
        self.timed(
            "signal_with_start_workflow",
            self.inner.signal_with_start_workflow(request),
        )
        .await
    }

    async fn get_workflow_result(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        follow_runs: bool,
    ) -> Result<Payload, Error> {
        self.timed(
            "get_workflow_result",
            self.inner
                .get_workflow_result(workflow_id, run_id, follow_runs),
        )
        .await
    }

    async fn signal_workflow(&self, request: SignalRequest) -> Result<(), Error> {
        self.timed("signal_workflow", self.inner.signal_workflow(request))
            .await
    }

    async fn query_workflow(&self, request: QueryRequest) -> Result<QueryResponse, Error> {
        self.timed("query_workflow", self.inner.query_workflow(request))
            .await
    }

    async fn update_workflow(
        &self,
        request: UpdateRequest,
    ) -> Result<Arc<dyn RawUpdateHandle>, Error> {
        self.timed("update_workflow", self.inner.update_workflow(request))
            .await
    }

    async fn cancel_workflow(&self, request: CancelRequest) -> Result<(), Error> {
        self.timed("cancel_workflow", self.inner.cancel_workflow(request))
            .await
    }

    async fn terminate_workflow(&self, request: TerminateRequest) -> Result<(), Error> {
        self.timed("terminate_workflow", self.inner.terminate_workflow(request))
            .await
    }

    async fn get_workflow_history(&self, request: HistoryRequest) -> Result<HistoryPage, Error> {
        self.timed(
            "get_workflow_history",
            self.inner.get_workflow_history(request),
        )
        .await
    }

    async fn describe_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<WorkflowExecutionDescription, Error> {
        self.timed(
            "describe_workflow_execution",
            self.inner.describe_workflow_execution(workflow_id, run_id),
        )
        .await
    }

    async fn list_workflow(&self, request: ListRequest) -> Result<ListResponse, Error> {
        self.timed("list_workflow", self.inner.list_workflow(request))
            .await
    }

    fn attach_worker(&self, task_queue: &str, registry: Arc<Registry>) -> Result<(), Error> {
        self.inner.attach_worker(task_queue, registry)
    }

    fn detach_worker(&self, task_queue: &str) {
        self.inner.detach_worker(task_queue)
    }

    async fn execute_single_run(
        &self,
        task_queue: &str,
        registry: Arc<Registry>,
        options: SingleRunOptions,
    ) -> Result<(), Error> {
        self.timed(
            "execute_single_run",
            self.inner.execute_single_run(task_queue, registry, options),
        )
        .await
    }
}
