//! Workers host workflow and activity implementations for one task queue
//!
//! A worker either attaches to the engine for its whole lifetime
//! ([`Worker::start`]) or processes whatever is queued and returns
//! ([`Worker::execute_single_run`]), which is how the serverless adapter
//! drives it.

mod registry;

pub use registry::{
    ActivityFunction, BoxedActivityFunction, BoxedWorkflowFunction, Registry, WorkflowFunction,
};

use crate::client::Client;
use crate::config::WorkerOptions;
use crate::engine::types::SingleRunOptions;
use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::{info, o, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Polls one task queue and runs the registered implementations
pub struct Worker {
    client: Client,
    options: WorkerOptions,
    registry: Mutex<Registry>,
    started: AtomicBool,
    logger: Logger,
}

impl Worker {
    pub fn new(client: &Client, options: WorkerOptions) -> Self {
        let identity = options
            .identity
            .clone()
            .unwrap_or_else(|| client.identity().to_string());
        let logger = client.logger().new(o!(
            "task_queue" => options.task_queue.clone(),
            "worker_identity" => identity,
        ));
        Self {
            client: client.clone(),
            options,
            registry: Mutex::new(Registry::new()),
            started: AtomicBool::new(false),
            logger,
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.options.task_queue
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_not_started(&self) -> Result<(), Error> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::WorkerStarted(self.options.task_queue.clone()));
        }
        Ok(())
    }

    pub(crate) fn register_workflow<I, O, F>(&self, name: &str, function: F) -> Result<(), Error>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: WorkflowFunction<I, O>,
    {
        self.ensure_not_started()?;
        self.registry().register_workflow(name, function)?;
        info!(self.logger, "Registered workflow"; "workflow_type" => name);
        Ok(())
    }

    pub(crate) fn register_activity<I, O, F>(&self, name: &str, function: F) -> Result<(), Error>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: ActivityFunction<I, O>,
    {
        self.ensure_not_started()?;
        self.registry().register_activity(name, function)?;
        info!(self.logger, "Registered activity"; "activity_type" => name);
        Ok(())
    }

    /// Copy of the current registrations, as handed to the engine
    pub fn registry_snapshot(&self) -> Arc<Registry> {
        Arc::new(self.registry().clone())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Attach to the engine and serve the task queue until [`Worker::stop`]
    ///
    /// Registration is closed once the worker has started.
    pub fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::WorkerStarted(self.options.task_queue.clone()));
        }
        let registry = self.registry_snapshot();
        if let Err(e) = self
            .client
            .engine()
            .attach_worker(&self.options.task_queue, Arc::clone(&registry))
        {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!(self.logger, "Worker started";
            "workflows" => registry.list_workflows().len(),
            "activities" => registry.list_activities().len());
        Ok(())
    }

    pub fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.client.engine().detach_worker(&self.options.task_queue);
            info!(self.logger, "Worker stopped");
        }
    }

    /// Run everything currently queued for the task queue, then return
    pub async fn execute_single_run(&self, options: SingleRunOptions) -> Result<(), Error> {
        let registry = self.registry_snapshot();
        self.client
            .engine()
            .execute_single_run(&self.options.task_queue, registry, options)
            .await
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("task_queue", &self.options.task_queue)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;
    use crate::workflow::Context;
    use slog::Discard;

    fn test_worker() -> Worker {
        let logger = Logger::root(Discard, o!());
        let client = Client::local(ClientOptions::default(), logger);
        Worker::new(&client, WorkerOptions::new("tests"))
    }

    async fn echo(_ctx: Context, input: String) -> Result<String, Error> {
        Ok(input)
    }

    #[tokio::test]
    async fn test_registration_closed_after_start() {
        let worker = test_worker();
        worker.register_workflow("Echo", echo).unwrap();
        worker.start().unwrap();

        let err = worker.register_workflow("Other", echo).unwrap_err();
        assert!(matches!(err, Error::WorkerStarted(ref q) if q == "tests"));
        assert!(worker.start().is_err());

        worker.stop();
        assert!(!worker.is_started());
        worker.register_workflow("Other", echo).unwrap();
    }

    #[tokio::test]
    async fn test_second_worker_on_same_queue_rejected() {
        let first = test_worker();
        first.register_workflow("Echo", echo).unwrap();
        first.start().unwrap();

        let second = Worker::new(first.client(), WorkerOptions::new("tests"));
        assert!(second.start().is_err());
        assert!(!second.is_started());
    }
}
