use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{self, SessionStore};
use crate::catalog;
use crate::chat::{self, ChatRelay};
use crate::config::Config;
use crate::orders;
use crate::pages::Pages;
use crate::store::Database;

pub struct AppState {
    pub db: Database,
    pub sessions: SessionStore,
    pub pages: Pages,
    pub relay: ChatRelay,
}

impl AppState {
    /// Wire up shared state from configuration around an opened store
    ///
    /// Creates the configured admin account if it is missing.
    pub fn new(config: &Config, db: Database) -> Result<Arc<Self>, Box<dyn Error>> {
        if let Some((username, password)) = &config.admin {
            auth::ensure_admin(&db, username, password)?;
            info!(%username, "Admin account ready");
        }

        Ok(Arc::new(Self {
            db,
            sessions: SessionStore::new(config.session_ttl)
                .with_secure_cookies(config.secure_cookies),
            pages: Pages::new()?,
            relay: ChatRelay::new(config.chat.clone())?,
        }))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let user_routes = Router::new()
        .route("/orders", get(orders::serve_orders_page))
        .route("/history", get(orders::serve_history_page))
        .route(
            "/api/orders",
            get(orders::list_my_orders).post(orders::handle_place_order),
        )
        .route("/api/account/password", post(auth::handle_change_password))
        .route_layer(from_fn_with_state(state.clone(), auth::require_user));

    let admin_routes = Router::new()
        .route("/admin", get(catalog::serve_admin_page))
        .route(
            "/api/admin/canteens/:canteen/items",
            post(catalog::handle_create_item),
        )
        .route(
            "/api/admin/canteens/:canteen/items/:id",
            put(catalog::handle_update_item).delete(catalog::handle_delete_item),
        )
        .route("/api/admin/orders", get(orders::list_canteen_orders))
        .route("/api/admin/orders/:id", delete(orders::handle_delete_order))
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/", get(catalog::serve_home))
        .route("/login", get(auth::serve_login_page).post(auth::handle_login))
        .route(
            "/admin/login",
            get(auth::serve_admin_login_page).post(auth::handle_admin_login),
        )
        .route("/signup", get(auth::serve_signup_page).post(auth::handle_signup))
        .route("/logout", post(auth::handle_logout))
        .route("/api/canteens", get(catalog::list_canteens))
        .route("/api/canteens/:canteen/items", get(catalog::list_items))
        .route("/api/chatbot", post(chat::handle_message))
        .merge(user_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    info!("Opening document store...");
    let db = Database::open(&config.data_dir)?;
    let state = AppState::new(&config, db)?;

    let app = router(state);

    let address = config.address();
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
