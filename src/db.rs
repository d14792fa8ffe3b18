use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct DatabasePool(pub Arc<Mutex<rusqlite::Connection>>);

impl DatabasePool {
    /// Open the database at `path` and make sure the schema exists.
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        create_tables(&conn)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }
}

/// Creates the four collections. Timestamps are unix milliseconds so
/// the ordering the mirrors rely on is a plain integer sort.
pub fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            amount_invested INTEGER NOT NULL,
            trading_id TEXT NOT NULL,
            balance INTEGER NOT NULL,
            profile_photo TEXT,
            dark_mode INTEGER NOT NULL,
            notifications INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            content TEXT NOT NULL,
            kind TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            read INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            reference_number TEXT,
            bank_details TEXT,
            company_message TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            kind TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            read INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    Ok(())
}
