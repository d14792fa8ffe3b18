mod auth;
mod db;
mod handlers;
mod models;
mod presence;
mod state;
mod storage;
mod store;

use crate::auth::{admin_login, get_user_data, login, logout, register, update_user};
use crate::db::DatabasePool;
use crate::handlers::{
    admin::{
        adjust_wallet, delete_user, get_admin_profile, list_users, list_withdrawals,
        put_admin_profile, update_user_record, update_withdrawal,
    },
    chat::{admin_threads, get_conversation, get_typing, send_message, set_typing},
    events::change_feed,
    notifications::{list_notifications, mark_notification_read},
    wallet::{deposit, get_linked_account, list_transactions, put_linked_account, withdraw},
};
use crate::presence::PresenceMap;
use crate::state::{spawn_reload_task, AppState, SharedState};
use crate::storage::{LocalStore, DEFAULT_QUOTA_BYTES};
use axum::http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderValue, Method};
use axum::{
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use std::sync::Arc;
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_rusqlite_store::RusqliteStore;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument
    let args: Vec<String> = std::env::args().collect();
    let mut log_level = Level::INFO;
    if args.len() >= 2 {
        log_level = match args[1].as_str() {
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
    }

    // Initalize dotenv so we can read .env file
    dotenv::dotenv().ok();

    let data_dir = dotenv::var("DATA_DIR").unwrap_or_else(|_| ".".to_string());

    // Initialize our session store as a SQLite database
    let conn = Connection::open(format!("{}{}", data_dir, "/sessions.db"))?;
    let session_store = RusqliteStore::new(conn.into());
    session_store.migrate().await?;

    // Start a task to delete expired sessions every minute
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );

    // Create session layer with some configuration
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/");

    let origin = dotenv::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

    // Initialize CORS layer
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(vec![ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE]);

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    // Initialize database pool and warm the in-memory mirrors
    let pool = DatabasePool::new(&format!("{}{}", data_dir, "/tradechat.db"))?;

    let shared = Arc::new(SharedState::new());
    {
        let conn = pool.0.lock().await;
        shared.load(&conn)?;
    }
    let reload_task = spawn_reload_task(shared.clone(), pool.clone());

    let app_state = AppState {
        pool,
        shared,
        presence: Arc::new(PresenceMap::new()),
        device: Arc::new(LocalStore::open(
            format!("{}{}", data_dir, "/device_store.json"),
            DEFAULT_QUOTA_BYTES,
        )),
    };

    // Build application with routes
    let app = Router::new()
        // Auth routes
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/user", get(get_user_data).put(update_user))
        // Chat routes
        .route("/messages", get(get_conversation).post(send_message))
        .route("/typing", post(set_typing))
        .route("/typing/:user_id", get(get_typing))
        // Wallet routes
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/withdraw", post(withdraw))
        .route("/transactions", get(list_transactions))
        // Notification routes
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route(
            "/profile/linked-account",
            get(get_linked_account).put(put_linked_account),
        )
        // Change feed
        .route("/events", get(change_feed))
        // Admin routes
        .route("/admin/login", post(admin_login))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", put(update_user_record).delete(delete_user))
        .route("/admin/messages", get(admin_threads))
        .route("/admin/wallet", post(adjust_wallet))
        .route("/admin/withdrawals", get(list_withdrawals))
        .route("/admin/withdrawals/:id", put(update_withdrawal))
        .route(
            "/admin/profile",
            get(get_admin_profile).put(put_admin_profile),
        )
        // Application state
        .with_state(app_state)
        // Session, CORS, and tracing layers
        .layer(session_layer)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        );

    // Run server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;

    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    reload_task.abort();
    deletion_task.await??;

    Ok(())
}
