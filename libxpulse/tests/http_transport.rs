//! reqwest transports against local axum servers
//!
//! Covers the X API transport (envelopes, error mapping, rate-limit headers
//! driving the executor's reset hint) and the scheduling service client.

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use libxpulse::api::http::HttpXApi;
use libxpulse::api::XApi;
use libxpulse::config::AuthMode;
use libxpulse::{
    ApiError, RateLimitedExecutor, RetryConfig, ScheduleRequest, ScheduledStatus,
    SchedulerClient, SchedulerError, XpulseClient, XpulseError,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct Hits {
    count: Arc<AtomicUsize>,
}

impl Hits {
    fn bump(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str())
}

fn x_api(addr: SocketAddr) -> HttpXApi {
    HttpXApi::new(
        &format!("http://{}/2", addr),
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn scheduler(addr: SocketAddr) -> SchedulerClient {
    SchedulerClient::new(
        &format!("http://{}", addr),
        SecretString::from(TOKEN.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

// ============================================================================
// X API transport
// ============================================================================

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "title": "Unauthorized" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "id": "1000",
                "name": "Ada",
                "username": "ada",
                "public_metrics": {
                    "followers_count": 42,
                    "following_count": 7,
                    "tweet_count": 300,
                    "listed_count": 1
                }
            }
        })),
    )
}

async fn user_by_username(Path(username): Path<String>) -> impl IntoResponse {
    Json(json!({
        "errors": [{
            "title": "Not Found Error",
            "detail": format!("Could not find user with username: [{}].", username),
            "type": "https://api.twitter.com/2/problems/resource-not-found"
        }]
    }))
}

async fn search(
    State(hits): State<Hits>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let n = hits.bump();
    if n == 1 {
        let reset = (Utc::now().timestamp() + 2).to_string();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("x-rate-limit-limit", "180".to_string()),
                ("x-rate-limit-remaining", "0".to_string()),
                ("x-rate-limit-reset", reset),
            ],
            Json(json!({ "title": "Too Many Requests", "status": 429 })),
        )
            .into_response();
    }

    let query = params.get("query").cloned().unwrap_or_default();
    Json(json!({
        "data": [
            { "id": "1", "text": format!("about {}", query), "author_id": "1000" }
        ],
        "includes": { "users": [{ "id": "1000", "name": "Ada", "username": "ada" }] },
        "meta": { "result_count": 1 }
    }))
    .into_response()
}

async fn create_tweet(Json(body): Json<Value>) -> impl IntoResponse {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    let id = if body["reply"]["in_reply_to_tweet_id"].is_string() {
        "201"
    } else {
        "200"
    };
    (
        StatusCode::CREATED,
        Json(json!({ "data": { "id": id, "text": text } })),
    )
}

async fn broken_tweet(State(hits): State<Hits>) -> impl IntoResponse {
    hits.bump();
    (StatusCode::SERVICE_UNAVAILABLE, "upstream overloaded")
}

fn x_router(hits: Hits) -> Router {
    Router::new()
        .route("/2/users/me", get(me))
        .route("/2/users/by/username/{username}", get(user_by_username))
        .route("/2/tweets/search/recent", get(search))
        .route("/2/tweets", post(create_tweet))
        .route("/2/tweets/{id}", get(broken_tweet))
        .with_state(hits)
}

#[tokio::test]
async fn test_envelope_decoding_and_auth_header() -> Result<()> {
    let addr = serve(x_router(Hits::default())).await;
    let api = x_api(addr);

    let response = api.me().await?;
    let user = response.data.unwrap();
    assert_eq!(user.username, "ada");
    assert_eq!(user.public_metrics.unwrap().followers_count, 42);

    Ok(())
}

#[tokio::test]
async fn test_wrong_token_is_an_authentication_error() {
    let addr = serve(x_router(Hits::default())).await;
    let api = HttpXApi::new(
        &format!("http://{}/2", addr),
        SecretString::from("wrong".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    let err = api.me().await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("HTTP 401: Unauthorized"));
}

#[tokio::test]
async fn test_errors_only_envelope_becomes_problem() {
    let addr = serve(x_router(Hits::default())).await;
    let api = x_api(addr);

    let err = api.user_by_username("ghost").await.unwrap_err();
    match err {
        XpulseError::Api(ApiError::Problem(message)) => {
            assert!(message.contains("Could not find user with username: [ghost]"));
        }
        other => panic!("expected problem error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_tweet_sends_reply_target() -> Result<()> {
    let addr = serve(x_router(Hits::default())).await;
    let api = x_api(addr);

    let plain = api.create_tweet("hello", None).await?.data.unwrap();
    assert_eq!(plain.id, "200");
    assert_eq!(plain.text, "hello");

    let reply = api.create_tweet("re", Some("200")).await?.data.unwrap();
    assert_eq!(reply.id, "201");

    Ok(())
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let hits = Hits::default();
    let addr = serve(x_router(hits.clone())).await;
    let client = XpulseClient::new(
        Arc::new(x_api(addr)),
        RateLimitedExecutor::new(RetryConfig::default()),
        AuthMode::AppOnly,
    );

    let err = client.tweet("123").await.unwrap_err();
    assert_eq!(hits.get(), 1);
    assert_eq!(err.exit_code(), 1);
    assert!(err
        .to_string()
        .contains("HTTP 503: Service Unavailable - upstream overloaded"));
}

#[tokio::test]
async fn test_rate_limit_reset_header_drives_the_wait() -> Result<()> {
    let hits = Hits::default();
    let addr = serve(x_router(hits.clone())).await;

    // A base delay this long would blow the test's time bound: only the
    // reset header can produce a short wait
    let config = RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_secs(120),
        hint_buffer: Duration::from_millis(100),
        ..Default::default()
    };
    let client = XpulseClient::new(
        Arc::new(x_api(addr)),
        RateLimitedExecutor::new(config),
        AuthMode::AppOnly,
    );

    let started = Instant::now();
    let tweets = client.search("rust", 10, 1).await?;
    let elapsed = started.elapsed();

    assert_eq!(hits.get(), 2);
    assert_eq!(tweets.len(), 1);
    assert_eq!(tweets[0].author_username.as_deref(), Some("ada"));
    assert!(elapsed >= Duration::from_secs(1), "waited {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "waited {:?}", elapsed);

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_headers_are_attached_to_the_error() {
    let hits = Hits::default();
    let addr = serve(x_router(hits)).await;
    let api = x_api(addr);

    let page = libxpulse::api::PageRequest::default();
    let err = api.search_recent("rust", &page).await.unwrap_err();
    match err {
        XpulseError::Api(ApiError::Http {
            status, rate_limit, ..
        }) => {
            assert_eq!(status, 429);
            let headers = rate_limit.unwrap();
            assert_eq!(headers.limit, Some(180));
            assert_eq!(headers.remaining, Some(0));
            assert!(headers.reset.is_some());
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

const ECHOED_ID: &str = "1742942900123456789";

async fn tweet_gone(State(hits): State<Hits>, Path(id): Path<String>) -> impl IntoResponse {
    hits.bump();
    (
        StatusCode::NOT_FOUND,
        format!("Could not find tweet with id: [{}].", id),
    )
}

async fn tweet_problem(State(hits): State<Hits>, Path(id): Path<String>) -> impl IntoResponse {
    hits.bump();
    Json(json!({
        "errors": [{
            "title": "Not Found Error",
            "detail": format!("Could not find tweet with id: [{}].", id)
        }]
    }))
}

#[tokio::test]
async fn test_echoed_ids_are_not_rate_limits() {
    for (route, kind) in [
        (get(tweet_gone), "not found"),
        (get(tweet_problem), "errors-only envelope"),
    ] {
        let hits = Hits::default();
        let app = Router::new()
            .route("/2/tweets/{id}", route)
            .with_state(hits.clone());
        let addr = serve(app).await;
        let client = XpulseClient::new(
            Arc::new(x_api(addr)),
            RateLimitedExecutor::new(RetryConfig::default()),
            AuthMode::AppOnly,
        );

        let err = client.tweet(ECHOED_ID).await.unwrap_err();
        assert!(err.to_string().contains(ECHOED_ID), "{}: {}", kind, err);
        assert_eq!(hits.get(), 1, "{} was retried", kind);
        assert!(client.rate_limits().is_empty(), "{} touched state", kind);
    }
}

// ============================================================================
// Scheduling service
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn schedule(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing or invalid api key").into_response();
    }
    if body["text"].as_str().unwrap_or_default().contains("forbidden") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"content rejected"}"#,
        )
            .into_response();
    }
    Json(json!({
        "id": "sched-1",
        "text": body["text"],
        "scheduled_at": body["scheduled_at"],
        "status": "pending"
    }))
    .into_response()
}

async fn schedule_batch(Json(body): Json<Value>) -> impl IntoResponse {
    let posts: Vec<Value> = body["posts"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, post)| json!({ "id": format!("b{}", i), "text": post["text"], "status": "pending" }))
        .collect();
    Json(json!({ "posts": posts }))
}

async fn schedule_thread(Json(body): Json<Value>) -> impl IntoResponse {
    let posts: Vec<Value> = body["posts"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            json!({
                "id": format!("t{}", i),
                "text": text,
                "thread_id": "thread-1",
                "scheduled_at": body["scheduled_at"],
                "status": "pending"
            })
        })
        .collect();
    Json(Value::Array(posts))
}

async fn list_posts(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let all = vec![
        json!({ "id": "a", "text": "one", "status": "pending" }),
        json!({ "id": "b", "text": "two", "status": "posted", "tweet_id": "555" }),
    ];
    let posts: Vec<Value> = match params.get("status") {
        Some(status) => all
            .into_iter()
            .filter(|post| post["status"] == status.as_str())
            .collect(),
        None => all,
    };
    Json(json!({ "posts": posts }))
}

async fn cancel(Json(body): Json<Value>) -> impl IntoResponse {
    match body["id"].as_str() {
        Some("a") => (StatusCode::OK, Json(json!({ "id": "a", "cancelled": true }))),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such post" }))),
    }
}

fn scheduler_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/schedule", post(schedule))
        .route("/schedule-batch", post(schedule_batch))
        .route("/schedule-thread", post(schedule_thread))
        .route("/posts", get(list_posts))
        .route("/cancel", post(cancel))
}

#[tokio::test]
async fn test_scheduler_health() -> Result<()> {
    let addr = serve(scheduler_router()).await;
    let health = scheduler(addr).health().await?;
    assert_eq!(health["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_scheduler_schedule_roundtrip() -> Result<()> {
    let addr = serve(scheduler_router()).await;
    let at = Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap();

    let post = scheduler(addr)
        .schedule(&ScheduleRequest {
            text: "later".to_string(),
            scheduled_at: at,
            reply_to: None,
        })
        .await?;

    assert_eq!(post.id, "sched-1");
    assert_eq!(post.text, "later");
    assert_eq!(post.scheduled_at, Some(at));
    assert_eq!(post.status, Some(ScheduledStatus::Pending));

    Ok(())
}

#[tokio::test]
async fn test_scheduler_http_error_carries_request_details() {
    let addr = serve(scheduler_router()).await;
    let at = Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap();

    let err = scheduler(addr)
        .schedule(&ScheduleRequest {
            text: "forbidden words".to_string(),
            scheduled_at: at,
            reply_to: None,
        })
        .await
        .unwrap_err();

    match &err {
        XpulseError::Scheduler(SchedulerError::Http {
            method,
            path,
            status,
            body,
        }) => {
            assert_eq!(method, "POST");
            assert_eq!(path, "/schedule");
            assert_eq!(*status, 422);
            assert_eq!(body, r#"{"error":"content rejected"}"#);
        }
        other => panic!("expected scheduler HTTP error, got {:?}", other),
    }
    assert!(err
        .to_string()
        .contains("POST /schedule failed with status 422"));
}

#[tokio::test]
async fn test_scheduler_rejects_bad_key() {
    let addr = serve(scheduler_router()).await;
    let client = SchedulerClient::new(
        &format!("http://{}", addr),
        SecretString::from("nope".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    let err = client
        .schedule(&ScheduleRequest {
            text: "x".to_string(),
            scheduled_at: Utc::now(),
            reply_to: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
    assert!(err.to_string().contains("missing or invalid api key"));
}

#[tokio::test]
async fn test_scheduler_batch_and_thread() -> Result<()> {
    let addr = serve(scheduler_router()).await;
    let client = scheduler(addr);
    let at = Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap();

    let batch = client
        .schedule_batch(&[
            ScheduleRequest {
                text: "a".to_string(),
                scheduled_at: at,
                reply_to: None,
            },
            ScheduleRequest {
                text: "b".to_string(),
                scheduled_at: at,
                reply_to: None,
            },
        ])
        .await?;
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].text, "b");

    let thread = client
        .schedule_thread(&["first".to_string(), "second".to_string()], at)
        .await?;
    assert_eq!(thread.len(), 2);
    assert!(thread
        .iter()
        .all(|post| post.thread_id.as_deref() == Some("thread-1")));

    Ok(())
}

#[tokio::test]
async fn test_scheduler_list_and_cancel() -> Result<()> {
    let addr = serve(scheduler_router()).await;
    let client = scheduler(addr);

    assert_eq!(client.list_posts(None).await?.len(), 2);

    let posted = client.list_posts(Some(ScheduledStatus::Posted)).await?;
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].tweet_id.as_deref(), Some("555"));

    let cancelled = client.cancel("a").await?;
    assert_eq!(cancelled["cancelled"], true);

    let err = client.cancel("zzz").await.unwrap_err();
    assert!(err
        .to_string()
        .contains("POST /cancel failed with status 404"));

    Ok(())
}
