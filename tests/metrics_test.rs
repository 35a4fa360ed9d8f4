mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{test_logger, TASK_QUEUE};
use prometheus::Registry;
use std::sync::Arc;
use tower::ServiceExt;
use typeflow::client::StartWorkflowOptions;
use typeflow::metrics::{self, ClientMetrics, REQUEST_LATENCY};
use typeflow::{Client, ClientOptions, Context, Error, Worker, WorkerOptions, Workflow};

static ECHO: Workflow<String, String> = Workflow::new("Echo");

async fn echo(_ctx: Context, text: String) -> Result<String, Error> {
    Ok(text)
}

#[tokio::test]
async fn test_engine_requests_are_timed_and_exported() {
    let registry = Arc::new(Registry::new());
    let metrics = ClientMetrics::new(&registry).unwrap();
    let client = Client::local(ClientOptions::default(), test_logger()).with_metrics(metrics.clone());
    let worker = Worker::new(&client, WorkerOptions::new(TASK_QUEUE));
    ECHO.register(&worker, echo).unwrap();
    worker.start().unwrap();

    let echoed = ECHO
        .execute(&client, "ping".to_string(), StartWorkflowOptions::new(TASK_QUEUE))
        .await
        .unwrap();
    assert_eq!(echoed, "ping");
    assert_eq!(metrics.request_count("start_workflow"), 1);
    assert_eq!(metrics.request_count("get_workflow_result"), 1);
    assert_eq!(metrics.request_count("signal_workflow"), 0);

    let response = metrics::router(registry)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(REQUEST_LATENCY), "{}", text);
    assert!(text.contains("operation=\"start_workflow\""), "{}", text);
}
