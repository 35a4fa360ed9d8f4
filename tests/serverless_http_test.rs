mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{local_client, TASK_QUEUE};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use typeflow::client::{StartWorkflowOptions, WorkflowResultOptions};
use typeflow::serverless::{router, OnDemandWorkerHandler, SharedHandler};
use typeflow::{Client, Context, Error, Worker, WorkerOptions, Workflow};

static SHOUT: Workflow<String, String> = Workflow::new("Shout");

async fn shout(_ctx: Context, text: String) -> Result<String, Error> {
    Ok(text.to_uppercase())
}

fn shared_handler(client: &Client) -> Arc<SharedHandler> {
    let client = client.clone();
    Arc::new(SharedHandler::new(move || {
        let client = client.clone();
        async move {
            let worker = Worker::new(&client, WorkerOptions::new(TASK_QUEUE));
            SHOUT.register(&worker, shout)?;
            Ok::<_, Error>(OnDemandWorkerHandler::new(worker))
        }
    }))
}

fn invocation(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let client = local_client();
    let app = router(shared_handler(&client));

    let response = app.oneshot(invocation("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let message = String::from_utf8(body.to_vec()).unwrap();
    assert!(message.starts_with("failed reading body as capabilities"), "{}", message);
}

#[tokio::test]
async fn test_invocation_runs_queued_workflows() {
    let client = local_client();
    let handle = SHOUT
        .start(&client, "quiet".to_string(), StartWorkflowOptions::new(TASK_QUEUE))
        .await
        .unwrap();

    let shared = shared_handler(&client);
    let response = router(Arc::clone(&shared))
        .oneshot(invocation(r#"{"eagerWorkflowStart": true, "brandNew": 1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        handle.get_result(WorkflowResultOptions::default()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result, "QUIET");

    // The handler is built once and reused
    let first = shared.get().await.unwrap();
    let response = router(Arc::clone(&shared)).oneshot(invocation("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(Arc::ptr_eq(&first, &shared.get().await.unwrap()));
}

#[tokio::test]
async fn test_factory_failure_is_server_error() {
    let shared = Arc::new(SharedHandler::new(|| async {
        Err::<OnDemandWorkerHandler, _>(Error::application("no credentials"))
    }));
    let response = router(Arc::clone(&shared)).oneshot(invocation("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!shared.is_initialized());
}
