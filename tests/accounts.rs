mod common;

use common::{seed_user, setup_conn};
use tradechat_backend::handlers::chat::{build_welcome_message, WELCOME_MESSAGE};
use tradechat_backend::models::{MessageKind, Notification, NotificationKind, ADMIN_ID};
use tradechat_backend::store;

#[test]
fn test_new_accounts_start_empty() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 0);

    // A fresh registration: zero balance, no conversation yet.
    let stored = store::find_user(&conn, &user.id).unwrap().unwrap();
    assert_eq!(stored.balance, 0);
    assert_eq!(stored.amount_invested, 1000);
    assert!(store::load_messages(&conn).unwrap().is_empty());
}

#[test]
fn test_first_chat_open_seeds_welcome_message() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 0);

    let welcome = build_welcome_message(&user.id);
    store::insert_message(&conn, &welcome).unwrap();

    let messages = store::load_messages(&conn).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_id, ADMIN_ID);
    assert_eq!(messages[0].receiver_id, user.id);
    assert_eq!(messages[0].content, WELCOME_MESSAGE);
    assert_eq!(messages[0].kind, MessageKind::Text);
    assert!(!messages[0].read);
}

#[test]
fn test_login_lookup_by_email_or_trading_id() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 0);

    let by_email = store::find_user_by_identifier(&conn, &user.email)
        .unwrap()
        .expect("email lookup");
    assert_eq!(by_email.id, user.id);

    let by_trading_id = store::find_user_by_identifier(&conn, &user.trading_id)
        .unwrap()
        .expect("trading id lookup");
    assert_eq!(by_trading_id.id, user.id);

    assert!(store::find_user_by_identifier(&conn, "unknown")
        .unwrap()
        .is_none());
}

#[test]
fn test_mark_notification_read_is_idempotent() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 0);

    let notification = Notification {
        id: "n1".to_string(),
        user_id: user.id.clone(),
        title: "Login Alert".to_string(),
        message: "You have successfully logged in".to_string(),
        kind: NotificationKind::Login,
        timestamp: 1,
        read: false,
    };
    store::insert_notification(&conn, &notification).unwrap();

    // First read flips the flag and reports a write.
    assert!(store::mark_notification_read(&conn, "n1").unwrap());
    // Second read finds nothing to write.
    assert!(!store::mark_notification_read(&conn, "n1").unwrap());

    let stored = store::load_notifications(&conn).unwrap();
    assert!(stored[0].read);
}

#[test]
fn test_user_update_merges_partial_fields() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 700);

    let updates = tradechat_backend::models::UserUpdate {
        phone: Some("09998887766".to_string()),
        dark_mode: Some(true),
        ..Default::default()
    };
    let merged = store::update_user_fields(&conn, &user.id, &updates)
        .unwrap()
        .expect("user exists");

    assert_eq!(merged.phone, "09998887766");
    assert!(merged.dark_mode);
    // Untouched fields survive, including the balance.
    assert_eq!(merged.full_name, user.full_name);
    assert_eq!(merged.balance, 700);
}

#[test]
fn test_delete_user_removes_the_row() {
    let conn = setup_conn();
    let user = seed_user(&conn, "u1", 0);

    store::delete_user(&conn, &user.id).unwrap();
    assert!(store::find_user(&conn, &user.id).unwrap().is_none());
}
