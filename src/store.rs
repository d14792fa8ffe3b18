//! Row-level access to the four collections, plus the multi-row
//! business operations. Anything that touches a balance together with
//! a transaction or notification row runs inside a single SQLite
//! transaction so partial failure cannot leave the balance debited
//! without its paper trail.

use crate::models::{
    format_amount, BankDetails, Message, Notification, NotificationKind, Transaction,
    TransactionKind, TransactionStatus, User, UserUpdate, WithdrawRequest,
};
use chrono::Utc;
use rusqlite::{params, Connection};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("account {0} not found")]
    UserNotFound(String),
    #[error("transaction {0} not found")]
    TransactionNotFound(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("invalid amount")]
    InvalidAmount,
}

const USER_COLUMNS: &str = "id, full_name, email, phone, amount_invested, trading_id, balance, \
                            profile_photo, dark_mode, notifications, created_at";

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        amount_invested: row.get(4)?,
        trading_id: row.get(5)?,
        balance: row.get(6)?,
        profile_photo: row.get(7)?,
        dark_mode: row.get(8)?,
        notifications: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, full_name, email, phone, amount_invested, trading_id, balance,
                            profile_photo, dark_mode, notifications, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user.id,
            user.full_name,
            user.email,
            user.phone,
            user.amount_invested,
            user.trading_id,
            user.balance,
            user.profile_photo,
            user.dark_mode,
            user.notifications,
            user.created_at,
        ],
    )?;
    Ok(())
}

/// Insert-or-replace, used by the optimistic profile update path.
pub fn upsert_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, full_name, email, phone, amount_invested, trading_id,
                                       balance, profile_photo, dark_mode, notifications, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user.id,
            user.full_name,
            user.email,
            user.phone,
            user.amount_invested,
            user.trading_id,
            user.balance,
            user.profile_photo,
            user.dark_mode,
            user.notifications,
            user.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))?;
    let mut rows = stmt.query_map([id], user_from_row)?;
    rows.next().transpose()
}

/// Login lookup: the identifier is an email or a trading id.
pub fn find_user_by_identifier(conn: &Connection, identifier: &str) -> rusqlite::Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE email = ?1 OR trading_id = ?1",
        USER_COLUMNS
    ))?;
    let mut rows = stmt.query_map([identifier], user_from_row)?;
    rows.next().transpose()
}

pub fn list_users(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC",
        USER_COLUMNS
    ))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.collect()
}

/// Merge a partial update into the stored row. Returns the merged user,
/// or `None` when the id is unknown.
pub fn update_user_fields(
    conn: &Connection,
    id: &str,
    updates: &UserUpdate,
) -> rusqlite::Result<Option<User>> {
    let Some(mut user) = find_user(conn, id)? else {
        return Ok(None);
    };
    user.apply_update(updates);
    upsert_user(conn, &user)?;
    Ok(Some(user))
}

pub fn delete_user(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM users WHERE id = ?", [id])?;
    Ok(())
}

fn message_from_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        timestamp: row.get(5)?,
        read: row.get(6)?,
    })
}

/// Messages are kept oldest-first; that is the order chat threads
/// render in.
pub fn load_messages(conn: &Connection) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, content, kind, timestamp, read
         FROM messages ORDER BY timestamp ASC",
    )?;
    let rows = stmt.query_map([], message_from_row)?;
    rows.collect()
}

pub fn insert_message(conn: &Connection, message: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, content, kind, timestamp, read)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            message.id,
            message.sender_id,
            message.receiver_id,
            message.content,
            message.kind,
            message.timestamp,
            message.read,
        ],
    )?;
    Ok(())
}

fn transaction_from_row(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        amount: row.get(3)?,
        status: row.get(4)?,
        timestamp: row.get(5)?,
        reference_number: row.get(6)?,
        // A corrupted JSON column reads as "no bank details" rather
        // than failing the whole load.
        bank_details: row
            .get::<_, Option<String>>(7)?
            .and_then(|raw| serde_json::from_str(&raw).ok()),
        company_message: row.get(8)?,
    })
}

/// Transactions are kept newest-first.
pub fn load_transactions(conn: &Connection) -> rusqlite::Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, amount, status, timestamp, reference_number, bank_details,
                company_message
         FROM transactions ORDER BY timestamp DESC",
    )?;
    let rows = stmt.query_map([], transaction_from_row)?;
    rows.collect()
}

pub fn find_transaction(conn: &Connection, id: &str) -> rusqlite::Result<Option<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, amount, status, timestamp, reference_number, bank_details,
                company_message
         FROM transactions WHERE id = ?",
    )?;
    let mut rows = stmt.query_map([id], transaction_from_row)?;
    rows.next().transpose()
}

fn insert_transaction(conn: &Connection, transaction: &Transaction) -> rusqlite::Result<()> {
    let bank_details = transaction
        .bank_details
        .as_ref()
        .and_then(|details| serde_json::to_string(details).ok());
    conn.execute(
        "INSERT INTO transactions (id, user_id, kind, amount, status, timestamp, reference_number,
                                   bank_details, company_message)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            transaction.id,
            transaction.user_id,
            transaction.kind,
            transaction.amount,
            transaction.status,
            transaction.timestamp,
            transaction.reference_number,
            bank_details,
            transaction.company_message,
        ],
    )?;
    Ok(())
}

fn notification_from_row(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        timestamp: row.get(5)?,
        read: row.get(6)?,
    })
}

/// Notifications are kept newest-first.
pub fn load_notifications(conn: &Connection) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, message, kind, timestamp, read
         FROM notifications ORDER BY timestamp DESC",
    )?;
    let rows = stmt.query_map([], notification_from_row)?;
    rows.collect()
}

pub fn insert_notification(conn: &Connection, notification: &Notification) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, title, message, kind, timestamp, read)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            notification.id,
            notification.user_id,
            notification.title,
            notification.message,
            notification.kind,
            notification.timestamp,
            notification.read,
        ],
    )?;
    Ok(())
}

/// Flips `read` to true. Idempotent: an already-read notification
/// matches no row, so no write happens and `false` comes back.
pub fn mark_notification_read(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ? AND read = 0",
        [id],
    )?;
    Ok(changed > 0)
}

fn balance_of(conn: &Connection, user_id: &str) -> Result<i64, StoreError> {
    conn.query_row("SELECT balance FROM users WHERE id = ?", [user_id], |row| {
        row.get(0)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::UserNotFound(user_id.to_string()),
        e => StoreError::Database(e),
    })
}

/// Creates a withdrawal request: debit the balance, record the pending
/// transaction, queue the notification. The debit happens now, not when
/// the withdrawal is later completed.
pub fn create_withdrawal(
    conn: &mut Connection,
    user_id: &str,
    request: &WithdrawRequest,
) -> Result<(Transaction, Notification, i64), StoreError> {
    if request.amount <= 0 {
        return Err(StoreError::InvalidAmount);
    }

    let tx = conn.transaction()?;

    let balance = balance_of(&tx, user_id)?;
    if request.amount > balance {
        return Err(StoreError::InsufficientBalance);
    }

    let new_balance = balance - request.amount;
    tx.execute(
        "UPDATE users SET balance = ? WHERE id = ?",
        params![new_balance, user_id],
    )?;

    let now = Utc::now().timestamp_millis();
    let reference_number = format!("WD-{}", now);
    let record = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: TransactionKind::Withdrawal,
        amount: request.amount,
        status: TransactionStatus::Pending,
        timestamp: now,
        reference_number: Some(reference_number.clone()),
        bank_details: Some(BankDetails {
            bank: request.bank.clone(),
            account_number: request.account_number.clone(),
            account_name: request.account_name.clone(),
        }),
        company_message: None,
    };
    insert_transaction(&tx, &record)?;

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: "Withdrawal Pending".to_string(),
        message: format!(
            "Your withdrawal of ₱{} is being processed. Reference: {}",
            format_amount(request.amount),
            reference_number
        ),
        kind: NotificationKind::Withdrawal,
        timestamp: now,
        read: false,
    };
    insert_notification(&tx, &notification)?;

    tx.commit()?;

    Ok((record, notification, new_balance))
}

/// Administrative credit/debit. A debit floors at zero instead of going
/// negative. The resulting transaction is already `completed`.
pub fn adjust_balance(
    conn: &mut Connection,
    user_id: &str,
    credit: bool,
    amount: i64,
    reason: Option<&str>,
) -> Result<(Transaction, Notification, i64), StoreError> {
    if amount <= 0 {
        return Err(StoreError::InvalidAmount);
    }

    let tx = conn.transaction()?;

    let balance = balance_of(&tx, user_id)?;
    let new_balance = if credit {
        balance + amount
    } else {
        (balance - amount).max(0)
    };
    tx.execute(
        "UPDATE users SET balance = ? WHERE id = ?",
        params![new_balance, user_id],
    )?;

    let now = Utc::now().timestamp_millis();
    let reason = reason.unwrap_or("").trim();
    let company_message = if reason.is_empty() {
        if credit {
            "Credited by company".to_string()
        } else {
            "Debited by company".to_string()
        }
    } else {
        reason.to_string()
    };
    let record = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: if credit {
            TransactionKind::Credit
        } else {
            TransactionKind::Debit
        },
        amount,
        status: TransactionStatus::Completed,
        timestamp: now,
        reference_number: Some(format!("{}-{}", if credit { "CR" } else { "DB" }, now)),
        bank_details: None,
        company_message: Some(company_message),
    };
    insert_transaction(&tx, &record)?;

    let mut message = format!(
        "₱{} has been {} your account.",
        format_amount(amount),
        if credit { "added to" } else { "deducted from" }
    );
    if !reason.is_empty() {
        message.push(' ');
        message.push_str(reason);
    }
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: format!("Balance {}", if credit { "Credited" } else { "Debited" }),
        message,
        kind: NotificationKind::Balance,
        timestamp: now,
        read: false,
    };
    insert_notification(&tx, &notification)?;

    tx.commit()?;

    Ok((record, notification, new_balance))
}

/// Writes a new status and company message onto an existing withdrawal
/// and notifies the owner. Balance is untouched here: it was already
/// debited when the withdrawal was created.
pub fn set_withdrawal_status(
    conn: &mut Connection,
    id: &str,
    status: TransactionStatus,
    admin_message: &str,
) -> Result<(Transaction, Notification), StoreError> {
    let tx = conn.transaction()?;

    let Some(mut record) = find_transaction(&tx, id)? else {
        return Err(StoreError::TransactionNotFound(id.to_string()));
    };

    record.status = status;
    record.company_message = Some(admin_message.to_string());
    tx.execute(
        "UPDATE transactions SET status = ?, company_message = ? WHERE id = ?",
        params![record.status, record.company_message, id],
    )?;

    let mut message = format!(
        "Your withdrawal of ₱{} has been {}.",
        format_amount(record.amount),
        status.as_str()
    );
    let admin_message = admin_message.trim();
    if !admin_message.is_empty() {
        message.push(' ');
        message.push_str(admin_message);
    }
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: record.user_id.clone(),
        title: format!("Withdrawal {}", status.label()),
        message,
        kind: NotificationKind::Withdrawal,
        timestamp: Utc::now().timestamp_millis(),
        read: false,
    };
    insert_notification(&tx, &notification)?;

    tx.commit()?;

    Ok((record, notification))
}
