//! Integration tests for the HTTP gateway
//!
//! Runs `ApiClient` against an in-process axum server that records every
//! request it receives.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::Router;
use eldercare_core::config::ApiConfig;
use eldercare_core::dispatch::{Registration, BULK_HEART_RATE_PATH};
use eldercare_core::{
    ApiClient, Endpoint, Error, Gateway, HeartRateSample, Session, SessionStore,
};
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

async fn backend(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    log.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: header(AUTHORIZATION),
        content_type: header(CONTENT_TYPE),
        body: body.clone(),
    });

    match uri.path() {
        "/api/HeartRate/createHeartRate" => (StatusCode::OK, "created".to_string()),
        "/api/HeartRate/createHighHeartRate" => (StatusCode::CREATED, "created".to_string()),
        "/api/HeartRate/bulkHeartRate" => (StatusCode::OK, "bulk ok".to_string()),
        "/api/SuddenMovement/createSuddenMovement" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "database unavailable".to_string(),
        ),
        "/api/Account/login" => {
            let creds: Value = serde_json::from_str(&body).unwrap_or_default();
            if creds["username"] == "ana" && creds["password"] == "secret" {
                (StatusCode::OK, json!({"token": "tok-abc"}).to_string())
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    json!({"message": "Invalid credentials"}).to_string(),
                )
            }
        }
        "/api/Account/register" => (
            StatusCode::BAD_REQUEST,
            json!({"message": "Username taken"}).to_string(),
        ),
        "/api/HeartRate/getRecentHeartRate" => (
            StatusCode::OK,
            json!([
                {"measurement": 71.0, "timestamp": "2024-01-01T08:00:00Z"},
                {"measurement": 74.0, "timestamp": "2024-01-01T08:05:00Z"}
            ])
            .to_string(),
        ),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

struct Stub {
    addr: SocketAddr,
    log: Log,
}

impl Stub {
    async fn start() -> Self {
        let log: Log = Arc::default();
        let app = Router::new().fallback(backend).with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, log }
    }

    fn client(&self, sessions: Arc<SessionStore>) -> ApiClient {
        let config = ApiConfig {
            base_url: format!("http://{}/", self.addr),
            timeout_secs: 5,
        };
        ApiClient::new(&config, sessions).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }
}

fn logged_in() -> Arc<SessionStore> {
    let sessions = SessionStore::in_memory();
    sessions
        .save(Session {
            username: "ana".to_string(),
            token: "tok-123".to_string(),
        })
        .unwrap();
    Arc::new(sessions)
}

// ============================================
// Gateway
// ============================================

#[tokio::test]
async fn test_single_without_session_has_no_bearer() {
    let stub = Stub::start().await;
    let client = stub.client(Arc::new(SessionStore::in_memory()));

    let body = client
        .send_single(
            Endpoint::HeartRate,
            json!({"measurement": 72.0, "timestamp": "t1"}),
        )
        .await
        .unwrap();
    assert_eq!(body, "created");

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/api/HeartRate/createHeartRate");
    assert_eq!(requests[0].authorization, None);
    assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
    let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(sent, json!({"measurement": 72.0, "timestamp": "t1"}));
}

#[tokio::test]
async fn test_single_with_session_sends_bearer() {
    let stub = Stub::start().await;
    let client = stub.client(logged_in());

    client
        .send_single(Endpoint::HeartRate, json!({"measurement": 72.0, "timestamp": "t1"}))
        .await
        .unwrap();

    assert_eq!(
        stub.requests()[0].authorization.as_deref(),
        Some("Bearer tok-123")
    );
}

#[tokio::test]
async fn test_non_200_is_an_api_error_with_body() {
    let stub = Stub::start().await;
    let client = stub.client(logged_in());

    let err = client
        .send_single(Endpoint::SuddenMovement, json!({"timestamp": "12:00"}))
        .await
        .unwrap_err();
    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("expected API error, got {other:?}"),
    }

    // Only exactly 200 counts as success
    let err = client
        .send_single(Endpoint::HighHeartRate, json!({"measurement": 150.0}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 201, .. }));
}

#[tokio::test]
async fn test_bulk_posts_sample_array() {
    let stub = Stub::start().await;
    let client = stub.client(logged_in());

    let body = client
        .send_bulk(vec![
            HeartRateSample::new(70.0, "t1"),
            HeartRateSample::new(71.5, "t2"),
        ])
        .await
        .unwrap();
    assert_eq!(body, "bulk ok");

    let requests = stub.requests();
    let request = &requests[0];
    assert_eq!(request.path, BULK_HEART_RATE_PATH);
    let sent: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        sent,
        json!([
            {"measurement": 70.0, "timestamp": "t1"},
            {"measurement": 71.5, "timestamp": "t2"}
        ])
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_an_http_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ApiConfig {
        base_url: format!("http://{}", addr),
        timeout_secs: 2,
    };
    let client = ApiClient::new(&config, Arc::new(SessionStore::in_memory())).unwrap();

    let err = client.send_bulk(vec![]).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}

#[tokio::test]
async fn test_truncated_success_body_is_an_http_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Promise more body than is sent, then hang up
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n{\"tok")
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let config = ApiConfig {
        base_url: format!("http://{}", addr),
        timeout_secs: 5,
    };
    let client = ApiClient::new(&config, Arc::new(SessionStore::in_memory())).unwrap();

    let err = client.login("ana", "secret").await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "got {err:?}");
    assert!(client.sessions().current().is_none());
}

// ============================================
// Account
// ============================================

#[tokio::test]
async fn test_login_persists_session() {
    let stub = Stub::start().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let client = stub.client(Arc::new(SessionStore::open(&path).unwrap()));

    let session = client.login("ana", "secret").await.unwrap();
    assert_eq!(session.token, "tok-abc");
    assert_eq!(client.sessions().token().as_deref(), Some("tok-abc"));

    let reopened = SessionStore::open(&path).unwrap();
    assert_eq!(reopened.current(), Some(session));

    // Subsequent requests carry the new token
    client
        .send_single(Endpoint::HeartRate, json!({"measurement": 72.0, "timestamp": "t"}))
        .await
        .unwrap();
    assert_eq!(
        stub.requests().last().unwrap().authorization.as_deref(),
        Some("Bearer tok-abc")
    );

    client.logout().unwrap();
    assert!(SessionStore::open(&path).unwrap().token().is_none());
}

#[tokio::test]
async fn test_rejected_login_surfaces_message() {
    let stub = Stub::start().await;
    let client = stub.client(Arc::new(SessionStore::in_memory()));

    let err = client.login("ana", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));
    assert_eq!(err.diagnostic(), "Invalid credentials");
    assert!(client.sessions().current().is_none());
}

#[tokio::test]
async fn test_rejected_registration_surfaces_message() {
    let stub = Stub::start().await;
    let client = stub.client(Arc::new(SessionStore::in_memory()));

    let registration = Registration {
        username: "ana".to_string(),
        password: "secret".to_string(),
        first_name: "Ana".to_string(),
        last_name: "Petrova".to_string(),
        email: "ana@example.com".to_string(),
        date_of_birth: "1950-04-12".to_string(),
    };
    let err = client.register(&registration).await.unwrap_err();
    assert_eq!(err.diagnostic(), "Username taken");

    let sent: Value = serde_json::from_str(&stub.requests()[0].body).unwrap();
    assert_eq!(sent["firstName"], "Ana");
    assert_eq!(sent["dateOfBirth"], "1950-04-12");
}

#[tokio::test]
async fn test_recent_heart_rate_query() {
    let stub = Stub::start().await;
    let client = stub.client(logged_in());

    let samples = client
        .recent_heart_rate("2024-01-01T00:00:00Z", "2024-01-01T12:00:00+02:00")
        .await
        .unwrap();
    assert_eq!(
        samples,
        vec![
            HeartRateSample::new(71.0, "2024-01-01T08:00:00Z"),
            HeartRateSample::new(74.0, "2024-01-01T08:05:00Z"),
        ]
    );

    let requests = stub.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/api/HeartRate/getRecentHeartRate");
    assert_eq!(
        request.query.as_deref(),
        Some("from=2024-01-01T00%3A00%3A00Z&to=2024-01-01T12%3A00%3A00%2B02%3A00")
    );
    assert_eq!(request.authorization.as_deref(), Some("Bearer tok-123"));
}
