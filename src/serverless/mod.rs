//! On-demand worker adapter for serverless platforms
//!
//! Each invocation runs whatever is queued on the worker's task queue and
//! returns. The invocation body may carry the orchestration service's
//! capabilities as JSON.

mod http;

pub use http::router;

use crate::engine::types::{ServerCapabilities, SingleRunOptions};
use crate::error::Error;
use crate::worker::Worker;
use futures::future::BoxFuture;
use slog::{debug, info, o, Logger};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors returned by [`OnDemandWorkerHandler::handle_request`]
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request body was not a capabilities document
    #[error("failed reading body as capabilities: {0}")]
    InvalidCapabilities(String),

    /// The worker run failed
    #[error(transparent)]
    Worker(#[from] Error),
}

/// Runs a worker once per incoming request
pub struct OnDemandWorkerHandler {
    worker: Worker,
    logger: Logger,
}

impl OnDemandWorkerHandler {
    pub fn new(worker: Worker) -> Self {
        let logger = worker.logger().new(o!("component" => "on_demand"));
        Self { worker, logger }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Parse the capabilities in `body` and run the worker once
    ///
    /// An empty body means default capabilities.
    pub async fn handle_request(&self, body: &[u8]) -> Result<(), HandlerError> {
        let capabilities = parse_capabilities(body)?;
        debug!(self.logger, "Handling on-demand request";
            "body_len" => body.len(),
            "eager_workflow_start" => capabilities.eager_workflow_start);
        self.worker
            .execute_single_run(SingleRunOptions {
                server_capabilities: Some(capabilities),
                deadline: None,
            })
            .await?;
        info!(self.logger, "On-demand run finished");
        Ok(())
    }
}

impl std::fmt::Debug for OnDemandWorkerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDemandWorkerHandler")
            .field("worker", &self.worker)
            .finish()
    }
}

fn parse_capabilities(body: &[u8]) -> Result<ServerCapabilities, HandlerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ServerCapabilities::default());
    }
    serde_json::from_slice(body).map_err(|e| HandlerError::InvalidCapabilities(e.to_string()))
}

type HandlerFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<OnDemandWorkerHandler, Error>> + Send + Sync>;

/// Process-wide handler built on the first request and reused afterwards
pub struct SharedHandler {
    cell: OnceCell<Arc<OnDemandWorkerHandler>>,
    factory: HandlerFactory,
}

impl SharedHandler {
    /// Build the handler lazily with `factory`
    ///
    /// A failed build is retried by the next request.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<OnDemandWorkerHandler, Error>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(move || {
                Box::pin(factory()) as BoxFuture<'static, Result<OnDemandWorkerHandler, Error>>
            }),
        }
    }

    /// Wrap an already built handler
    pub fn ready(handler: OnDemandWorkerHandler) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(handler))),
            factory: Box::new(|| {
                Box::pin(async {
                    Err(Error::application("on-demand handler was supplied prebuilt"))
                }) as BoxFuture<'static, Result<OnDemandWorkerHandler, Error>>
            }),
        }
    }

    pub async fn get(&self) -> Result<Arc<OnDemandWorkerHandler>, Error> {
        self.cell
            .get_or_try_init(|| async { (self.factory)().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Stop the worker if it was ever built
    pub fn close(&self) {
        if let Some(handler) = self.cell.get() {
            handler.worker().stop();
        }
    }
}

impl std::fmt::Debug for SharedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandler")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
