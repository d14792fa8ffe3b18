//! In-memory mirrors of the three live collections. The database is
//! the source of truth; the mirrors exist so reads never touch it and
//! so change events can fan out to connected clients. A mirror is
//! updated optimistically right after a write commits, and a
//! background task re-fetches the whole collection on every change
//! event to re-establish consistency.

use crate::db::DatabasePool;
use crate::models::{Message, Notification, Transaction, TransactionStatus};
use crate::presence::PresenceMap;
use crate::storage::LocalStore;
use crate::store;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Everything the handlers need, injected through axum state.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub shared: Arc<SharedState>,
    pub presence: Arc<PresenceMap>,
    pub device: Arc<LocalStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Messages,
    Transactions,
    Notifications,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Messages => "messages",
            Collection::Transactions => "transactions",
            Collection::Notifications => "notifications",
        }
    }
}

pub struct SharedState {
    messages: RwLock<Vec<Message>>,
    transactions: RwLock<Vec<Transaction>>,
    notifications: RwLock<Vec<Notification>>,
    events: broadcast::Sender<Collection>,
}

impl SharedState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        SharedState {
            messages: RwLock::new(Vec::new()),
            transactions: RwLock::new(Vec::new()),
            notifications: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Collection> {
        self.events.subscribe()
    }

    fn notify(&self, collection: Collection) {
        // Nobody listening is fine.
        let _ = self.events.send(collection);
    }

    /// Bulk load at startup, replacing every mirror wholesale.
    pub fn load(&self, conn: &Connection) -> rusqlite::Result<()> {
        *self.messages.write().unwrap() = store::load_messages(conn)?;
        *self.transactions.write().unwrap() = store::load_transactions(conn)?;
        *self.notifications.write().unwrap() = store::load_notifications(conn)?;
        Ok(())
    }

    /// Re-fetches one collection and reconciles it with the mirror.
    ///
    /// The rule is merge-by-id: the database snapshot wins for every
    /// row it contains, and mirror rows missing from the snapshot are
    /// kept (they committed after the snapshot was read). The result
    /// is then restored to the collection's canonical order, so the
    /// outcome does not depend on which async completion landed last.
    pub fn reload(&self, conn: &Connection, collection: Collection) -> rusqlite::Result<()> {
        match collection {
            Collection::Messages => {
                let rows = store::load_messages(conn)?;
                let mut mirror = self.messages.write().unwrap();
                let mut merged = merge_by_id(rows, &mirror, |m| m.id.as_str());
                merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
                *mirror = merged;
            }
            Collection::Transactions => {
                let rows = store::load_transactions(conn)?;
                let mut mirror = self.transactions.write().unwrap();
                let mut merged = merge_by_id(rows, &mirror, |t| t.id.as_str());
                merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
                *mirror = merged;
            }
            Collection::Notifications => {
                let rows = store::load_notifications(conn)?;
                let mut mirror = self.notifications.write().unwrap();
                let mut merged = merge_by_id(rows, &mirror, |n| n.id.as_str());
                merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
                *mirror = merged;
            }
        }
        Ok(())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().unwrap().clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.read().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().unwrap().clone()
    }

    /// Appends a committed message. Callers only get here after the
    /// insert succeeded, so a failed write never reaches the mirror.
    pub fn add_message(&self, message: Message) {
        self.messages.write().unwrap().push(message);
        self.notify(Collection::Messages);
    }

    /// Prepends a committed transaction, keeping newest-first order.
    pub fn add_transaction(&self, transaction: Transaction) {
        self.transactions.write().unwrap().insert(0, transaction);
        self.notify(Collection::Transactions);
    }

    /// Prepends a committed notification, keeping newest-first order.
    pub fn add_notification(&self, notification: Notification) {
        self.notifications.write().unwrap().insert(0, notification);
        self.notify(Collection::Notifications);
    }

    pub fn apply_transaction_update(
        &self,
        id: &str,
        status: TransactionStatus,
        company_message: Option<String>,
    ) {
        {
            let mut transactions = self.transactions.write().unwrap();
            if let Some(transaction) = transactions.iter_mut().find(|t| t.id == id) {
                transaction.status = status;
                transaction.company_message = company_message;
            }
        }
        self.notify(Collection::Transactions);
    }

    pub fn apply_notification_read(&self, id: &str) {
        {
            let mut notifications = self.notifications.write().unwrap();
            if let Some(notification) = notifications.iter_mut().find(|n| n.id == id) {
                notification.read = true;
            }
        }
        self.notify(Collection::Notifications);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_by_id<T: Clone>(mut rows: Vec<T>, mirror: &[T], id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let seen: HashSet<String> = rows.iter().map(|row| id_of(row).to_string()).collect();
    for row in mirror {
        if !seen.contains(id_of(row)) {
            rows.push(row.clone());
        }
    }
    rows
}

/// Listens on the change feed and re-fetches the affected collection,
/// the reload-on-change-event half of the synchronization scheme.
pub fn spawn_reload_task(
    shared: Arc<SharedState>,
    pool: DatabasePool,
) -> tokio::task::JoinHandle<()> {
    let mut rx = shared.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(collection) => {
                    let conn = pool.0.lock().await;
                    if let Err(e) = shared.reload(&conn, collection) {
                        tracing::error!("Error reloading {}: {}", collection.as_str(), e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Change feed lagged by {} events, reloading everything", skipped);
                    let conn = pool.0.lock().await;
                    if let Err(e) = shared.load(&conn) {
                        tracing::error!("Error reloading state: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_tables;
    use crate::models::{MessageKind, NotificationKind, TransactionKind};

    fn test_message(id: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "admin".to_string(),
            content: "hello".to_string(),
            kind: MessageKind::Text,
            timestamp,
            read: false,
        }
    }

    fn test_notification(id: &str, timestamp: i64) -> Notification {
        Notification {
            id: id.to_string(),
            user_id: "u1".to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            kind: NotificationKind::Message,
            timestamp,
            read: false,
        }
    }

    #[test]
    fn test_transactions_prepend_keeps_newest_first() {
        let state = SharedState::new();
        for (id, ts) in [("a", 1), ("b", 2), ("c", 3)] {
            state.add_transaction(Transaction {
                id: id.to_string(),
                user_id: "u1".to_string(),
                kind: TransactionKind::Credit,
                amount: 10,
                status: crate::models::TransactionStatus::Completed,
                timestamp: ts,
                reference_number: None,
                bank_details: None,
                company_message: None,
            });
        }
        let ids: Vec<String> = state.transactions().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn test_add_message_broadcasts_change_event() {
        let state = SharedState::new();
        let mut rx = state.subscribe();
        state.add_message(test_message("m1", 1));
        assert!(matches!(rx.try_recv(), Ok(Collection::Messages)));
    }

    #[test]
    fn test_reload_merges_by_id_and_keeps_unseen_mirror_rows() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let state = SharedState::new();
        // Row only in the database.
        store::insert_message(&conn, &test_message("db-only", 1)).unwrap();
        // Row committed after the reload's snapshot would have been
        // taken: present in the mirror, absent from the database.
        state.add_message(test_message("mirror-only", 2));

        state.reload(&conn, Collection::Messages).unwrap();

        let ids: Vec<String> = state.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["db-only", "mirror-only"]);
    }

    #[test]
    fn test_reload_prefers_database_row_over_mirror_copy() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let state = SharedState::new();
        let mut stale = test_notification("n1", 5);
        state.add_notification(stale.clone());
        stale.read = true;
        store::insert_notification(&conn, &stale).unwrap();

        state.reload(&conn, Collection::Notifications).unwrap();

        let notifications = state.notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].read, "database copy wins");
    }

    #[test]
    fn test_apply_notification_read_patches_in_place() {
        let state = SharedState::new();
        state.add_notification(test_notification("n1", 1));
        state.apply_notification_read("n1");
        assert!(state.notifications()[0].read);
    }
}
