#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use playvault::auth::issue_session;
use playvault::server::{AppState, create_router};
use playvault::store::{SqliteStore, Store};
use playvault::types::{Role, User};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub store: Arc<dyn Store>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = SqliteStore::in_memory().expect("open in-memory store");
        store.initialize().expect("initialize schema");
        let store: Arc<dyn Store> = Arc::new(store);
        let state = Arc::new(AppState::new(store.clone(), Some(chrono::Duration::days(30))));
        Self {
            store,
            router: create_router(state),
        }
    }

    /// Creates a user and returns it with a fresh session token.
    pub fn user(&self, username: &str, role: Role) -> (User, String) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).expect("create user");
        let (_, token) = issue_session(self.store.as_ref(), &user.id, None).expect("issue session");
        (user, token)
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("send request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    /// Creates a playground with one `main.sql` file and returns its hash and
    /// first commit id.
    pub async fn create_playground(&self, token: Option<&str>, body: Value) -> (String, String) {
        let (status, json) = self.post("/api/playgrounds", token, body).await;
        assert_eq!(status, StatusCode::CREATED, "create playground: {json}");
        (
            json["data"]["playground_hash"]
                .as_str()
                .expect("playground hash")
                .to_string(),
            json["data"]["commit_id"]
                .as_str()
                .expect("commit id")
                .to_string(),
        )
    }
}

pub fn sql_files(content: &str) -> Value {
    serde_json::json!([{ "path": "main.sql", "content": content }])
}

/// A server listening on a real socket, for exercising the HTTP client.
pub struct LiveServer {
    pub store: Arc<dyn Store>,
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl LiveServer {
    pub async fn start() -> Self {
        let app = TestApp::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let router = app.router.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });

        Self {
            store: app.store,
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub fn session_for(&self, username: &str, role: Role) -> String {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).expect("create user");
        let (_, token) = issue_session(self.store.as_ref(), &user.id, None).expect("issue session");
        token
    }
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
