#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{
        Request, Response,
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
};
use canteen::app::{AppState, router};
use canteen::config::{ChatConfig, Config};
use canteen::store::Database;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "root";
pub const ADMIN_PASSWORD: &str = "toor";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_chat(None)
    }

    pub fn with_chat(chat: Option<ChatConfig>) -> Self {
        Self::with_config(|config| config.chat = chat)
    }

    /// Start from the test defaults and let `configure` adjust them
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            data_dir: dir.path().to_path_buf(),
            admin: Some((ADMIN_USERNAME.to_string(), ADMIN_PASSWORD.to_string())),
            ..Config::default()
        };
        configure(&mut config);
        let db = Database::open(&config.data_dir).unwrap();
        let state = AppState::new(&config, db).unwrap();

        Self {
            router: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn signup(&self, username: &str, password: &str) -> Response<Body> {
        self.send(form("/signup", &format!("username={username}&password={password}")))
            .await
    }

    /// Log in through `login_path` and return the `Cookie` header value
    pub async fn login_at(&self, login_path: &str, username: &str, password: &str) -> String {
        let response = self
            .send(form(login_path, &format!("username={username}&password={password}")))
            .await;
        assert!(
            response.status().is_redirection(),
            "login failed: {}",
            response.status()
        );
        session_cookie(&response)
    }

    /// Sign up a fresh user and return their session cookie
    pub async fn user(&self, username: &str) -> String {
        let response = self.signup(username, "s3cret").await;
        assert!(response.status().is_redirection());
        self.login_at("/login", username, "s3cret").await
    }

    pub async fn admin(&self) -> String {
        self.login_at("/admin/login", ADMIN_USERNAME, ADMIN_PASSWORD)
            .await
    }
}

pub fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    json_request("GET", uri, cookie, None)
}

pub fn session_cookie(response: &Response<Body>) -> String {
    let header = response
        .headers()
        .get(SET_COOKIE)
        .expect("no Set-Cookie header")
        .to_str()
        .unwrap();
    header.split(';').next().unwrap().to_string()
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
