#![allow(dead_code)]

use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::{o, Drain, Logger};
use typeflow::client::StartWorkflowOptions;
use std::future::Future;
use typeflow::{Client, ClientOptions, Context, Error, Worker, WorkerOptions, Workflow};

pub const TASK_QUEUE: &str = "tests";

pub fn test_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

pub fn local_client() -> Client {
    Client::local(ClientOptions::default().with_identity("tests@typeflow"), test_logger())
}

/// Client plus a started worker on [`TASK_QUEUE`], with `setup` run before start
pub fn client_with_worker(setup: impl FnOnce(&Worker)) -> (Client, Worker) {
    let client = local_client();
    let worker = Worker::new(&client, WorkerOptions::new(TASK_QUEUE));
    setup(&worker);
    worker.start().unwrap();
    (client, worker)
}

/// Register `f` as a one-off workflow and run it to completion
pub async fn run_workflow<I, O, F, Fut>(name: &'static str, input: I, f: F) -> Result<O, Error>
where
    I: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Error>> + Send + 'static,
{
    let workflow = Workflow::<I, O>::new(name);
    let (client, _worker) = client_with_worker(|worker| workflow.register(worker, f).unwrap());
    workflow
        .execute(&client, input, StartWorkflowOptions::new(TASK_QUEUE))
        .await
}
