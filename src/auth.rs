use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form, Json,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::MAX_SESSION_HOURS;
use crate::error::AppError;
use crate::models::{Credential, Principal, Role};
use crate::store::Database;

pub const SESSION_COOKIE: &str = "session";
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;

lazy_static! {
    static ref USERNAME_CHARS: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();
}

/// Login and signup form data
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    /// Plaintext, only ever hashed or verified
    pub password: String,
}

/// Password change request from a logged-in user
#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
    /// Must match `new_password`
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PageMessage {
    pub registered: Option<bool>,
}

#[derive(Debug, Clone)]
struct Session {
    principal: Principal,
    expires_at: SystemTime,
}

/// Server-side sessions keyed by an opaque random id
///
/// The id is the only thing the browser holds; the principal it maps to is
/// never taken from the client.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionStore {
    /// Lifetimes past `MAX_SESSION_HOURS` are cut down to it
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: ttl.min(Duration::from_secs(MAX_SESSION_HOURS * 60 * 60)),
            secure_cookies: false,
        }
    }

    /// Issue session cookies with the `Secure` attribute
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// The cookie carrying `session_id` back to the browser
    pub fn cookie(&self, session_id: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, session_id))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Start a session and return its id
    pub fn create(&self, principal: Principal) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();

        // A clock near the end of time gets an already-expired session.
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            session_id.clone(),
            Session {
                principal,
                expires_at,
            },
        );

        session_id
    }

    /// The principal behind a live session, if any
    pub fn validate(&self, session_id: &str) -> Option<Principal> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.principal.clone())
    }

    pub fn revoke(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

/// Check a signup username against the naming rules
///
/// # Errors
/// * `AppError::Validation` describing the first rule broken
pub fn validate_username(username: &str) -> Result<(), AppError> {
    let length = username.chars().count();
    if length < MIN_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if length > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if !USERNAME_CHARS.is_match(username) {
        return Err(AppError::Validation(
            "username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Register a new user account
///
/// The username is trimmed and validated, the password is hashed, and the
/// record is inserted only if no user with that name exists.
///
/// # Errors
/// * `AppError::Validation` for a bad username or an empty password
/// * `AppError::UsernameTaken` if the name is already registered
pub fn register_user(db: &Database, username: &str, password: &str) -> Result<Credential, AppError> {
    register(db, Role::User, username, password)
}

fn register(db: &Database, role: Role, username: &str, password: &str) -> Result<Credential, AppError> {
    let username = username.trim();
    validate_username(username)?;
    if password.is_empty() {
        return Err(AppError::Validation("password cannot be empty".to_string()));
    }

    let credential = Credential {
        username: username.to_string(),
        password_hash: hash_password(password)?,
        created_at: Utc::now(),
    };
    db.insert_credential(role, credential.clone())?;

    info!(username = %credential.username, ?role, "Account registered");
    Ok(credential)
}

/// Create the configured admin account unless it already exists
pub fn ensure_admin(db: &Database, username: &str, password: &str) -> Result<(), AppError> {
    match register(db, Role::Admin, username, password) {
        Ok(_) | Err(AppError::UsernameTaken) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Verify credentials against the `role` collection
///
/// The username must match exactly, case included.
pub fn verify_user(db: &Database, role: Role, username: &str, password: &str) -> Result<bool, AppError> {
    match db.find_credential(role, username)? {
        Some(credential) => Ok(verify_password(password, &credential.password_hash)),
        None => Ok(false),
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::Hashing)
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

// Web handlers below

pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageMessage>,
) -> Result<Html<String>, AppError> {
    let message = params
        .registered
        .filter(|registered| *registered)
        .map(|_| "Account created, please log in.");
    state.pages.render(
        "login",
        &json!({
            "title": "User login",
            "action": "/login",
            "signup": true,
            "message": message,
        }),
    )
}

pub async fn serve_admin_login_page(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, AppError> {
    state.pages.render(
        "login",
        &json!({ "title": "Admin login", "action": "/admin/login" }),
    )
}

pub async fn serve_signup_page(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, AppError> {
    state
        .pages
        .render("signup", &json!({ "min_username": MIN_USERNAME_LEN }))
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Result<(CookieJar, Redirect), AppError> {
    login(&state, jar, Role::User, &credentials, "/orders")
}

pub async fn handle_admin_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Result<(CookieJar, Redirect), AppError> {
    login(&state, jar, Role::Admin, &credentials, "/admin")
}

fn login(
    state: &AppState,
    jar: CookieJar,
    role: Role,
    credentials: &UserCredentials,
    landing: &str,
) -> Result<(CookieJar, Redirect), AppError> {
    if !verify_user(&state.db, role, &credentials.username, &credentials.password)? {
        warn!(username = %credentials.username, ?role, "Login rejected");
        return Err(AppError::InvalidCredentials);
    }

    let session_id = state.sessions.create(Principal {
        username: credentials.username.clone(),
        role,
    });
    info!(username = %credentials.username, ?role, "Logged in");

    Ok((jar.add(state.sessions.cookie(session_id)), Redirect::to(landing)))
}

pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<UserCredentials>,
) -> Result<Redirect, AppError> {
    register_user(&state.db, &credentials.username, &credentials.password)?;
    Ok(Redirect::to("/login?registered=true"))
}

pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.revoke(cookie.value());
    }

    let removal = Cookie::build(SESSION_COOKIE).path("/").build();
    (jar.remove(removal), Redirect::to("/login"))
}

pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(change_req): Json<PasswordChangeRequest>,
) -> Result<StatusCode, AppError> {
    if !verify_user(&state.db, principal.role, &principal.username, &change_req.old_password)? {
        return Err(AppError::Validation("invalid old password".to_string()));
    }
    if change_req.new_password.is_empty() {
        return Err(AppError::Validation("password cannot be empty".to_string()));
    }
    if change_req.new_password != change_req.confirm_password {
        return Err(AppError::Validation("new passwords don't match".to_string()));
    }

    let hash = hash_password(&change_req.new_password)?;
    state.db.update_password(principal.role, &principal.username, hash)?;
    info!(username = %principal.username, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// Let only logged-in users through, with their `Principal` attached
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    authorize(&state, &jar, request, next, Role::User, "/login").await
}

/// Let only logged-in admins through, with their `Principal` attached
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    authorize(&state, &jar, request, next, Role::Admin, "/admin/login").await
}

async fn authorize(
    state: &AppState,
    jar: &CookieJar,
    mut request: Request,
    next: Next,
    role: Role,
    login_page: &str,
) -> Response {
    let principal = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.validate(cookie.value()));

    match principal {
        Some(principal) if principal.role == role => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Some(_) => AppError::Forbidden.into_response(),
        // API callers get a status, browsers get sent to the login form.
        None if request.uri().path().starts_with("/api/") => {
            AppError::Unauthenticated.into_response()
        }
        None => Redirect::to(login_page).into_response(),
    }
}
