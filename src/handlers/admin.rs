use crate::auth::require_admin;
use crate::models::{
    AdjustAction, AdminProfile, Transaction, TransactionKind, User, UserUpdate,
    WalletAdjustRequest, WalletAdjustResponse, WithdrawalStatusUpdate,
};
use crate::state::AppState;
use crate::store::{self, StoreError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tower_sessions::Session;

const ADMIN_PROFILE_KEY: &str = "adminProfile";

/// All registered users, newest first. Admin only.
pub async fn list_users(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<User>>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let conn = app.pool.0.lock().await;
    let users = store::list_users(&conn).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("Database error: {}", e)),
        )
    })?;

    Ok((StatusCode::OK, Json(users)))
}

/// Edit a user's profile fields. Balance changes do not go through
/// here; they have their own audited path below.
pub async fn update_user_record(
    State(app): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(updates): Json<UserUpdate>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let updated = {
        let conn = app.pool.0.lock().await;
        store::update_user_fields(&conn, &id, &updates).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?
    };

    match updated {
        Some(user) => Ok((StatusCode::OK, Json(user))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(format!("User {} not found", id)),
        )),
    }
}

pub async fn delete_user(
    State(app): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let conn = app.pool.0.lock().await;
    store::delete_user(&conn, &id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("Database error: {}", e)),
        )
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Credit or debit a user's balance. One database transaction covers
/// the balance write, the completed transaction record, and the
/// notification.
#[axum::debug_handler]
pub async fn adjust_wallet(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<WalletAdjustRequest>,
) -> Result<(StatusCode, Json<WalletAdjustResponse>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let credit = matches!(request.action, AdjustAction::Add);
    let result = {
        let mut conn = app.pool.0.lock().await;
        store::adjust_balance(
            &mut conn,
            &request.user_id,
            credit,
            request.amount,
            request.reason.as_deref(),
        )
    };
    let (transaction, notification, new_balance) = result.map_err(|e| match e {
        StoreError::InvalidAmount => (
            StatusCode::BAD_REQUEST,
            Json("Invalid amount".to_string()),
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

    Ok((
        StatusCode::OK,
        Json(WalletAdjustResponse {
            new_balance,
            transaction,
        }),
    ))
}

/// Every withdrawal transaction, newest first. Admin only.
pub async fn list_withdrawals(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Transaction>>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let withdrawals: Vec<Transaction> = app
        .shared
        .transactions()
        .into_iter()
        .filter(|transaction| transaction.kind == TransactionKind::Withdrawal)
        .collect();

    Ok((StatusCode::OK, Json(withdrawals)))
}

/// Set a withdrawal's status and company message, and notify the
/// owner. The owner's balance is untouched: it was debited when the
/// withdrawal was created.
pub async fn update_withdrawal(
    State(app): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(update): Json<WithdrawalStatusUpdate>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let result = {
        let mut conn = app.pool.0.lock().await;
        store::set_withdrawal_status(
            &mut conn,
            &id,
            update.status,
            update.message.as_deref().unwrap_or(""),
        )
    };
    let (transaction, notification) = result.map_err(|e| match e {
        StoreError::TransactionNotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(format!("Transaction {} not found", id)),
        ),
        e => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("Database error: {}", e)),
        ),
    })?;

    app.shared.apply_transaction_update(
        &transaction.id,
        transaction.status,
        transaction.company_message.clone(),
    );
    app.shared.add_notification(notification);

    Ok((StatusCode::OK, Json(transaction)))
}

pub async fn get_admin_profile(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<AdminProfile>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let profile: AdminProfile = app.device.get_or_default(ADMIN_PROFILE_KEY);
    Ok((StatusCode::OK, Json(profile)))
}

pub async fn put_admin_profile(
    State(app): State<AppState>,
    session: Session,
    Json(profile): Json<AdminProfile>,
) -> Result<(StatusCode, Json<AdminProfile>), (StatusCode, Json<String>)> {
    require_admin(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    app.device.safe_set(ADMIN_PROFILE_KEY, &profile).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("Storage error: {}", e)),
        )
    })?;

    Ok((StatusCode::OK, Json(profile)))
}
