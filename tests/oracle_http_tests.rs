// tests/oracle_http_tests.rs

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use quiz_grading::grading::{
    ChatCompletionClient, CompletionModel, GradeRequest, GradeSource, Grader, OracleError,
    OracleGrader,
};
use serde_json::{Value, json};

const API_KEY: &str = "sk-test-key";

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    content: &'static str,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

async fn chat_completions(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stub.calls.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", API_KEY).as_str());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "invalid api key" } })),
        );
    }
    if body["messages"].as_array().is_none_or(|m| m.len() != 2) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad messages" })));
    }

    if !stub.delay.is_zero() {
        tokio::time::sleep(stub.delay).await;
    }
    if !stub.status.is_success() {
        return (stub.status, Json(json!({ "error": "upstream failure" })));
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-1",
            "model": body["model"],
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": stub.content },
                "finish_reason": "stop"
            }]
        })),
    )
}

/// Starts a local stand-in for the chat-completions endpoint and returns its base URL.
async fn spawn_oracle(status: StatusCode, content: &'static str, delay: Duration) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let stub = Stub {
        status,
        content,
        delay,
        calls: calls.clone(),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{}/v1/", port), calls)
}

fn request(answer: &str) -> GradeRequest<'_> {
    GradeRequest {
        question: "Why do leaves change color in autumn?",
        answer,
        reference: Some("chlorophyll breaks down and reveals other pigments"),
        max_points: 5,
    }
}

#[tokio::test]
async fn client_returns_completion_text() {
    let (base, calls) = spawn_oracle(StatusCode::OK, "SCORE: 4", Duration::ZERO).await;
    let client = ChatCompletionClient::new(&base, API_KEY, "grader-model", Duration::from_secs(5)).unwrap();

    let text = client.complete("grade this").await.unwrap();
    assert_eq!(text, "SCORE: 4");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_maps_rejected_key_to_auth_error() {
    let (base, _) = spawn_oracle(StatusCode::OK, "SCORE: 4", Duration::ZERO).await;
    let client = ChatCompletionClient::new(&base, "wrong-key", "grader-model", Duration::from_secs(5)).unwrap();

    let err = client.complete("grade this").await.unwrap_err();
    assert!(matches!(err, OracleError::Auth(401)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn client_reports_timeout() {
    let (base, _) = spawn_oracle(StatusCode::OK, "SCORE: 4", Duration::from_secs(2)).await;
    let client = ChatCompletionClient::new(&base, API_KEY, "grader-model", Duration::from_millis(200)).unwrap();

    let err = client.complete("grade this").await.unwrap_err();
    assert!(matches!(err, OracleError::Timeout));
}

#[tokio::test]
async fn grader_scores_through_http_oracle() {
    let (base, _) = spawn_oracle(
        StatusCode::OK,
        "FEEDBACK: Names chlorophyll but not the other pigments.\nSCORE: 3\nCONFIDENCE: 88\nSUGGESTIONS: mention carotenoids",
        Duration::ZERO,
    )
    .await;
    let client = ChatCompletionClient::new(&base, API_KEY, "grader-model", Duration::from_secs(5)).unwrap();
    let grader = OracleGrader::new(Arc::new(client));

    let grade = grader.grade(request("The chlorophyll goes away.")).await.unwrap();
    assert_eq!(grade.source, GradeSource::Oracle);
    assert_eq!(grade.score, 3);
    assert_eq!(grade.confidence, 88);
    assert_eq!(grade.rationale, "Names chlorophyll but not the other pigments.");
}

#[tokio::test]
async fn grader_retries_server_errors_then_falls_back() {
    let (base, calls) = spawn_oracle(StatusCode::SERVICE_UNAVAILABLE, "", Duration::ZERO).await;
    let client = ChatCompletionClient::new(&base, API_KEY, "grader-model", Duration::from_secs(5)).unwrap();
    let grader = OracleGrader::new(Arc::new(client)).with_retries(2, Duration::from_millis(5));

    let grade = grader.grade(request("The chlorophyll goes away.")).await.unwrap();
    assert_eq!(grade.source, GradeSource::Fallback);
    // 26 characters: the 60% band of 5 points
    assert_eq!(grade.score, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn grader_surfaces_http_error_without_fallback() {
    let (base, _) = spawn_oracle(StatusCode::INTERNAL_SERVER_ERROR, "", Duration::ZERO).await;
    let client = ChatCompletionClient::new(&base, API_KEY, "grader-model", Duration::from_secs(5)).unwrap();
    let grader = OracleGrader::new(Arc::new(client))
        .with_retries(0, Duration::ZERO)
        .with_fallback(false);

    let result = grader.grade(request("The chlorophyll goes away.")).await;
    assert!(matches!(result, Err(OracleError::Http { status: 500, .. })));
}
