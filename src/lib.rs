//! Type-safe workflows over a deterministic orchestration engine
//!
//! Workflows, activities, signals, queries and updates are declared once as
//! typed descriptors and used from both the workflow implementation and its
//! callers, so argument and result types are checked at compile time while
//! the engine only ever sees [`Payload`]s.

pub mod client;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod sample;
pub mod serverless;
pub mod worker;
pub mod workflow;

pub use client::{Client, WorkflowHandle, WorkflowRun, WorkflowRunRef, WorkflowUpdateHandle};
pub use config::{ClientOptions, WorkerOptions};
pub use descriptor::{Activity, ActivityContext, Query, Signal, Update, Workflow};
pub use engine::local::LocalEngine;
pub use engine::types::{ActivityOptions, WorkflowExecution, WorkflowExecutionStatus};
pub use error::{EngineError, Error, QueryRejected, Result};
pub use payload::Payload;
pub use worker::Worker;
pub use workflow::{select, Channel, Context, Future, ReceiveChannel, SelectCase, SendChannel};
