//! Client side of the facade: handles, options and listing

mod handle;
mod list;
mod options;
mod update_handle;

pub use handle::{WorkflowHandle, WorkflowRun, WorkflowRunRef};
pub use list::{list_workflows, WorkflowExecutionIterator};
pub use options::{
    SignalWithStartOptions, StartWorkflowOptions, WorkflowCancelOptions, WorkflowDescribeOptions,
    WorkflowHandleOptions, WorkflowHistoryOptions, WorkflowListOptions, WorkflowQueryOptions,
    WorkflowResultOptions, WorkflowSignalOptions, WorkflowTerminateOptions,
    WorkflowUpdateOptions, WorkflowUpdateResultOptions,
};
pub use update_handle::WorkflowUpdateHandle;

use crate::config::ClientOptions;
use crate::engine::local::LocalEngine;
use crate::engine::EngineClient;
use crate::metrics::{ClientMetrics, MeteredEngine};
use slog::{o, Logger};
use std::sync::Arc;

/// Connection to the orchestration engine
///
/// Cheap to clone; all clones share one engine connection.
#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn EngineClient>,
    options: Arc<ClientOptions>,
    logger: Logger,
}

impl Client {
    pub fn new(engine: Arc<dyn EngineClient>, options: ClientOptions, logger: Logger) -> Self {
        let logger = logger.new(o!("namespace" => options.namespace.clone()));
        Self {
            engine,
            options: Arc::new(options),
            logger,
        }
    }

    /// Client backed by a fresh in-process engine
    pub fn local(options: ClientOptions, logger: Logger) -> Self {
        let engine = LocalEngine::new(options.namespace.clone(), logger.clone());
        Self::new(Arc::new(engine), options, logger)
    }

    /// Record the latency of every engine request in `metrics`
    pub fn with_metrics(mut self, metrics: ClientMetrics) -> Self {
        self.engine = Arc::new(MeteredEngine::new(self.engine, metrics));
        self
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    pub fn identity(&self) -> &str {
        &self.options.identity
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Iterate executions matching the options' query
    pub fn list_workflows(&self, options: WorkflowListOptions) -> WorkflowExecutionIterator {
        list_workflows(self, options)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("namespace", &self.options.namespace)
            .field("identity", &self.options.identity)
            .finish()
    }
}
