// src/lib.rs
pub mod auth;
pub mod db;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod state;
pub mod storage;
pub mod store;

// Re-export commonly used items
pub use db::DatabasePool;
pub use models::*;
pub use state::{AppState, SharedState};
