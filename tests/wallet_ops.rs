mod common;

use common::{seed_user, setup_conn};
use tradechat_backend::models::{
    NotificationKind, TransactionKind, TransactionStatus, WithdrawRequest,
};
use tradechat_backend::store::{self, StoreError};

fn withdraw_request(amount: i64) -> WithdrawRequest {
    WithdrawRequest {
        bank: "BDO".to_string(),
        account_number: "001234567890".to_string(),
        account_name: "Test User".to_string(),
        amount,
    }
}

#[test]
fn test_withdrawal_debits_balance_exactly() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 1000);

    let (transaction, notification, new_balance) =
        store::create_withdrawal(&mut conn, &user.id, &withdraw_request(500))
            .expect("withdrawal should succeed");

    assert_eq!(new_balance, 500);
    assert_eq!(transaction.kind, TransactionKind::Withdrawal);
    assert_eq!(transaction.status, TransactionStatus::Pending);
    assert_eq!(transaction.amount, 500);
    assert!(transaction
        .reference_number
        .as_deref()
        .unwrap()
        .starts_with("WD-"));
    assert_eq!(notification.kind, NotificationKind::Withdrawal);
    assert_eq!(notification.user_id, user.id);

    // The stored balance matches: pre-balance minus amount, exactly.
    let stored = store::find_user(&conn, &user.id).unwrap().unwrap();
    assert_eq!(stored.balance, 500);
}

#[test]
fn test_withdrawal_never_exceeds_balance() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 1000);

    let result = store::create_withdrawal(&mut conn, &user.id, &withdraw_request(1500));
    assert!(matches!(result, Err(StoreError::InsufficientBalance)));

    // Nothing was written: no debit, no transaction, no notification.
    let stored = store::find_user(&conn, &user.id).unwrap().unwrap();
    assert_eq!(stored.balance, 1000);
    assert!(store::load_transactions(&conn).unwrap().is_empty());
    assert!(store::load_notifications(&conn).unwrap().is_empty());
}

#[test]
fn test_withdrawal_rejects_non_positive_amounts() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 1000);

    for amount in [0, -5] {
        let result = store::create_withdrawal(&mut conn, &user.id, &withdraw_request(amount));
        assert!(matches!(result, Err(StoreError::InvalidAmount)));
    }
}

#[test]
fn test_withdrawal_for_unknown_user_fails() {
    let mut conn = setup_conn();
    let result = store::create_withdrawal(&mut conn, "nobody", &withdraw_request(100));
    assert!(matches!(result, Err(StoreError::UserNotFound(_))));
}

#[test]
fn test_credit_adds_to_balance() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 500);

    let (transaction, notification, new_balance) =
        store::adjust_balance(&mut conn, &user.id, true, 300, None)
            .expect("credit should succeed");

    assert_eq!(new_balance, 800);
    assert_eq!(transaction.kind, TransactionKind::Credit);
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.amount, 300);
    assert_eq!(
        transaction.company_message.as_deref(),
        Some("Credited by company")
    );
    assert_eq!(notification.kind, NotificationKind::Balance);
    assert_eq!(
        store::find_user(&conn, &user.id).unwrap().unwrap().balance,
        800
    );
}

#[test]
fn test_debit_floors_at_zero() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 200);

    let (transaction, _, new_balance) =
        store::adjust_balance(&mut conn, &user.id, false, 500, Some("Adjustment"))
            .expect("debit should succeed");

    assert_eq!(new_balance, 0);
    assert_eq!(transaction.kind, TransactionKind::Debit);
    assert_eq!(transaction.company_message.as_deref(), Some("Adjustment"));
    assert_eq!(
        store::find_user(&conn, &user.id).unwrap().unwrap().balance,
        0
    );
}

#[test]
fn test_withdrawal_status_update_leaves_balance_alone() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 1000);
    let (transaction, _, _) =
        store::create_withdrawal(&mut conn, &user.id, &withdraw_request(500)).unwrap();

    let (updated, notification) = store::set_withdrawal_status(
        &mut conn,
        &transaction.id,
        TransactionStatus::Rejected,
        "insufficient documents",
    )
    .expect("status update should succeed");

    assert_eq!(updated.status, TransactionStatus::Rejected);
    assert_eq!(
        updated.company_message.as_deref(),
        Some("insufficient documents")
    );
    assert_eq!(notification.title, "Withdrawal Rejected");
    assert!(notification.message.contains("insufficient documents"));
    assert_eq!(notification.user_id, user.id);

    // The rejection does not refund or touch the balance; the debit
    // happened at creation time.
    assert_eq!(
        store::find_user(&conn, &user.id).unwrap().unwrap().balance,
        500
    );

    // And the stored row reflects the update.
    let stored = store::find_transaction(&conn, &transaction.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Rejected);
}

#[test]
fn test_status_update_on_unknown_transaction_fails() {
    let mut conn = setup_conn();
    let result = store::set_withdrawal_status(
        &mut conn,
        "missing",
        TransactionStatus::Approved,
        "",
    );
    assert!(matches!(result, Err(StoreError::TransactionNotFound(_))));
}

#[test]
fn test_withdrawal_keeps_bank_details() {
    let mut conn = setup_conn();
    let user = seed_user(&conn, "u1", 1000);
    let (transaction, _, _) =
        store::create_withdrawal(&mut conn, &user.id, &withdraw_request(250)).unwrap();

    let stored = store::find_transaction(&conn, &transaction.id)
        .unwrap()
        .unwrap();
    let details = stored.bank_details.expect("bank details survive the round trip");
    assert_eq!(details.bank, "BDO");
    assert_eq!(details.account_number, "001234567890");
    assert_eq!(details.account_name, "Test User");
}
