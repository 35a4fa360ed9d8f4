use super::channel::ReceiveChannel;
use crate::engine::types::WorkflowInfo;
use crate::engine::EngineContext;
use crate::error::Error;
use serde::de::DeserializeOwned;
use slog::Logger;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic execution context passed to workflow code
///
/// Cheap to clone; every clone refers to the same execution.
#[derive(Clone)]
pub struct Context {
    raw: Arc<dyn EngineContext>,
}

impl Context {
    /// Wrap the engine's untyped context
    pub fn from_raw(raw: Arc<dyn EngineContext>) -> Self {
        Self { raw }
    }

    /// The engine's untyped context
    pub fn raw(&self) -> &Arc<dyn EngineContext> {
        &self.raw
    }

    /// Channel closed when cancellation of this execution is requested
    pub fn done(&self) -> ReceiveChannel<()> {
        ReceiveChannel::from_raw(self.raw.done())
    }

    /// `Some(Error::Canceled)` once cancellation was requested
    pub fn err(&self) -> Option<Error> {
        self.raw.is_canceled().then_some(Error::Canceled)
    }

    /// Header value supplied when the execution was started
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        self.raw
            .header(key)
            .map(|payload| payload.decode())
            .transpose()
    }

    pub fn info(&self) -> WorkflowInfo {
        self.raw.info()
    }

    pub fn logger(&self) -> Logger {
        self.raw.logger()
    }

    /// Durable sleep; returns `Error::Canceled` if the execution is canceled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Error> {
        let timer = self.raw.new_timer(duration);
        timer.get(self.raw.as_ref()).await.map(|_| ())
    }

    /// Run `f` as a coroutine of this execution
    pub fn go<F, Fut>(&self, f: F)
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.raw.spawn(Box::pin(f(self.clone())));
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.raw.info();
        f.debug_struct("Context")
            .field("workflow_id", &info.workflow_id)
            .field("run_id", &info.run_id)
            .field("workflow_type", &info.workflow_type)
            .finish()
    }
}
