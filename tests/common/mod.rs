use rusqlite::Connection;
use tradechat_backend::auth::generate_trading_id;
use tradechat_backend::db::create_tables;
use tradechat_backend::models::User;
use tradechat_backend::store;

/// Fresh in-memory database with the full schema.
pub fn setup_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to open in-memory database");
    create_tables(&conn).expect("Failed to create tables");
    conn
}

/// Inserts a user with the given balance and sensible defaults.
pub fn seed_user(conn: &Connection, id: &str, balance: i64) -> User {
    let user = User {
        id: id.to_string(),
        full_name: "Test User".to_string(),
        email: format!("{}@example.com", id),
        phone: "09170000000".to_string(),
        amount_invested: 1000,
        trading_id: generate_trading_id(),
        balance,
        profile_photo: None,
        dark_mode: false,
        notifications: true,
        created_at: 0,
    };
    store::insert_user(conn, &user).expect("Failed to insert user");
    user
}
