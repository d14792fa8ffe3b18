use crate::auth::{validate_session, SessionUser, SESSION_KEY};
use crate::models::{
    format_amount, DepositRequest, LinkedAccount, Message, MessageKind, Transaction,
    WithdrawRequest, ADMIN_ID, BANKS,
};
use crate::state::AppState;
use crate::storage::LocalStore;
use crate::store::{self, StoreError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tower_sessions::Session;
use uuid::Uuid;

/// A deposit request is not a transaction: it is a chat message asking
/// the administrator to arrange the deposit.
pub async fn deposit(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, Json<String>)> {
    let user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    if request.amount <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("Invalid deposit amount".to_string()),
        ));
    }
    if !BANKS.contains(&request.bank.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("Unknown bank or wallet".to_string()),
        ));
    }

    let message = Message {
        id: Uuid::new_v4().to_string(),
        sender_id: user.id.clone(),
        receiver_id: ADMIN_ID.to_string(),
        content: format!(
            "Deposit Request: ₱{} via {}",
            format_amount(request.amount),
            request.bank
        ),
        kind: MessageKind::Text,
        timestamp: Utc::now().timestamp_millis(),
        read: false,
    };

    {
        let conn = app.pool.0.lock().await;
        store::insert_message(&conn, &message).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?;
    }
    app.shared.add_message(message.clone());

    Ok((StatusCode::CREATED, Json(message)))
}

/// Request a withdrawal. The balance is debited now, together with the
/// pending transaction and its notification, in one database
/// transaction.
#[axum::debug_handler]
pub async fn withdraw(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, Json<String>)> {
    let mut user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    if !BANKS.contains(&request.bank.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("Unknown bank or wallet".to_string()),
        ));
    }
    if request.account_number.trim().is_empty() || request.account_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("All bank details are required".to_string()),
        ));
    }

    let result = {
        let mut conn = app.pool.0.lock().await;
        store::create_withdrawal(&mut conn, &user.id, &request)
    };
    let (transaction, notification, new_balance) = result.map_err(|e| match e {
        StoreError::InvalidAmount => (
            StatusCode::BAD_REQUEST,
            Json("Invalid withdrawal amount".to_string()),
        ),
        StoreError::InsufficientBalance => (
            StatusCode::BAD_REQUEST,
            Json("Insufficient balance".to_string()),
        ),
        StoreError::UserNotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(format!("Account {} not found", id)),
        ),
        e => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("Database error: {}", e)),
        ),
    })?;

    app.shared.add_transaction(transaction.clone());
    app.shared.add_notification(notification);

    // Keep the session snapshot's balance current.
    user.balance = new_balance;
    if let Err(e) = session
        .insert(
            SESSION_KEY,
            &SessionUser {
                user: Some(user),
                is_admin: false,
            },
        )
        .await
    {
        tracing::error!("Error inserting session: {:?}", e);
    }

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// The session user's transactions, newest first, straight from the
/// mirror.
pub async fn list_transactions(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Transaction>>), (StatusCode, Json<String>)> {
    let user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let transactions: Vec<Transaction> = app
        .shared
        .transactions()
        .into_iter()
        .filter(|transaction| transaction.user_id == user.id)
        .collect();

    Ok((StatusCode::OK, Json(transactions)))
}

pub async fn get_linked_account(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<LinkedAccount>), (StatusCode, Json<String>)> {
    let user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let account: LinkedAccount = app
        .device
        .get_or_default(&LocalStore::linked_account_key(&user.id));

    Ok((StatusCode::OK, Json(account)))
}

pub async fn put_linked_account(
    State(app): State<AppState>,
    session: Session,
    Json(account): Json<LinkedAccount>,
) -> Result<(StatusCode, Json<LinkedAccount>), (StatusCode, Json<String>)> {
    let user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    app.device
        .safe_set(&LocalStore::linked_account_key(&user.id), &account)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Storage error: {}", e)),
            )
        })?;

    Ok((StatusCode::OK, Json(account)))
}
