//! Say-hello sample workflow driven by the `typeflow` binary

use crate::descriptor::Workflow;
use crate::error::Error;
use crate::worker::Worker;
use crate::workflow::Context;
use slog::info;
use std::time::Duration;

/// Task queue the sample runs on unless told otherwise
pub const TASK_QUEUE: &str = "typeflow-sample";

/// How long the sample workflow sleeps before answering
pub const GREETING_DELAY: Duration = Duration::from_secs(5);

pub static SAY_HELLO: Workflow<String, String> = Workflow::new("SayHelloWorkflow");

async fn say_hello(ctx: Context, name: String) -> Result<String, Error> {
    info!(ctx.logger(), "Saying hello"; "name" => &name);
    ctx.sleep(GREETING_DELAY).await?;
    Ok(format!("Hello, {}!", name))
}

/// Register the sample workflow on `worker`
pub fn register(worker: &Worker) -> Result<(), Error> {
    SAY_HELLO.register(worker, say_hello)
}
