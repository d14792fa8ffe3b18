use crate::models::{
    AdminLoginRequest, LoginRequest, Notification, NotificationKind, RegisterRequest,
    TRADING_ID_PREFIX, User, UserUpdate,
};
use crate::state::AppState;
use crate::store;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Json;
use chrono::{Local, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use tower_sessions::Session;
use uuid::Uuid;

pub const SESSION_KEY: &str = "SESSION";

/// What the session cookie resolves to: a snapshot of the logged-in
/// user, or the administrator flag. The default (no user, not admin)
/// means unauthenticated.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct SessionUser {
    pub user: Option<User>,
    pub is_admin: bool,
}

/// Fixed prefix plus six random digits. Uniqueness against existing
/// rows is deliberately not checked.
pub fn generate_trading_id() -> String {
    let mut rng = rand::rng();
    format!("{}{}", TRADING_ID_PREFIX, rng.random_range(100_000..1_000_000))
}

/// Validate the session and return the logged-in user if any.
pub async fn validate_session(session: &Session) -> Result<User, StatusCode> {
    let sess: SessionUser = session.get(SESSION_KEY).await.unwrap().unwrap_or_default();
    sess.user.ok_or(StatusCode::UNAUTHORIZED)
}

/// Validate that the session belongs to the administrator.
pub async fn require_admin(session: &Session) -> Result<(), StatusCode> {
    let sess: SessionUser = session.get(SESSION_KEY).await.unwrap().unwrap_or_default();
    if sess.is_admin {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn current_session(session: &Session) -> SessionUser {
    session.get(SESSION_KEY).await.unwrap().unwrap_or_default()
}

/// Create an account. The balance always starts at zero; funds only
/// arrive through administrative credits.
pub async fn register(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<String>)> {
    if request.full_name.trim().is_empty()
        || request.email.trim().is_empty()
        || request.phone.trim().is_empty()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("All fields are required".to_string()),
        ));
    }

    let now = Utc::now().timestamp_millis();
    let user = User {
        id: Uuid::new_v4().to_string(),
        full_name: request.full_name.trim().to_string(),
        email: request.email.trim().to_string(),
        phone: request.phone.trim().to_string(),
        amount_invested: request.amount_invested,
        trading_id: generate_trading_id(),
        balance: 0,
        profile_photo: None,
        dark_mode: false,
        notifications: true,
        created_at: now,
    };

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        title: "Account Created Successfully".to_string(),
        message: format!(
            "Welcome to TradeChat! Your Trading ID is {}. Your account has been successfully created.",
            user.trading_id
        ),
        kind: NotificationKind::Message,
        timestamp: now,
        read: false,
    };

    {
        let conn = app.pool.0.lock().await;
        store::insert_user(&conn, &user).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?;
        store::insert_notification(&conn, &notification).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?;
    }
    app.shared.add_notification(notification);

    if let Err(e) = session
        .insert(
            SESSION_KEY,
            &SessionUser {
                user: Some(user.clone()),
                is_admin: false,
            },
        )
        .await
    {
        tracing::error!("Error inserting session: {:?}", e);
    }

    Ok((StatusCode::CREATED, Json(user)))
}

/// Log in by trading id or email. There is no password on user
/// accounts; hardening that is an explicit non-goal.
pub async fn login(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<String>)> {
    let found = {
        let conn = app.pool.0.lock().await;
        store::find_user_by_identifier(&conn, request.identifier.trim()).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?
    };

    let Some(user) = found else {
        return Err((
            StatusCode::NOT_FOUND,
            Json("Account not found. Please check your Trading ID or Email.".to_string()),
        ));
    };

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        title: "Login Alert".to_string(),
        message: format!(
            "You have successfully logged in to your account at {}",
            Local::now().format("%m/%d/%Y, %I:%M:%S %p")
        ),
        kind: NotificationKind::Login,
        timestamp: Utc::now().timestamp_millis(),
        read: false,
    };
    // A failed login notification is logged and swallowed; it never
    // blocks the login itself.
    let inserted = {
        let conn = app.pool.0.lock().await;
        store::insert_notification(&conn, &notification)
    };
    match inserted {
        Ok(()) => app.shared.add_notification(notification),
        Err(e) => tracing::error!("Error adding notification: {}", e),
    }

    if let Err(e) = session
        .insert(
            SESSION_KEY,
            &SessionUser {
                user: Some(user.clone()),
                is_admin: false,
            },
        )
        .await
    {
        tracing::error!("Error inserting session: {:?}", e);
    }

    Ok((StatusCode::OK, Json(user)))
}

/// Administrator login. The access code is verified server-side
/// against a SHA-256 digest from the environment; the plaintext never
/// lives in the codebase.
pub async fn admin_login(
    session: Session,
    Json(request): Json<AdminLoginRequest>,
) -> Result<(StatusCode, Json<SessionUser>), (StatusCode, Json<String>)> {
    let expected = match env::var("ADMIN_ACCESS_CODE_SHA256") {
        Ok(digest) => digest,
        Err(_) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Admin access is not configured".to_string()),
            ));
        }
    };

    let digest = format!("{:x}", Sha256::digest(request.access_code.as_bytes()));
    if !digest.eq_ignore_ascii_case(expected.trim()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json("Invalid access code".to_string()),
        ));
    }

    let sess = SessionUser {
        user: None,
        is_admin: true,
    };
    if let Err(e) = session.insert(SESSION_KEY, &sess).await {
        tracing::error!("Error inserting session: {:?}", e);
    }

    Ok((StatusCode::OK, Json(sess)))
}

/// Logout the user by removing the session.
pub async fn logout(session: Session) -> Redirect {
    session.remove::<SessionUser>(SESSION_KEY).await.unwrap();
    session.flush().await.unwrap();

    let frontend = env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
    Redirect::to(&frontend)
}

/// Session rehydration: re-fetch the authoritative row and merge it
/// over the session snapshot (remote fields win). If the fetch fails
/// the snapshot is served as-is.
pub async fn get_user_data(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    let sess: SessionUser = session.get(SESSION_KEY).await.unwrap().unwrap_or_default();
    let Some(snapshot) = sess.user else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let fetched = {
        let conn = app.pool.0.lock().await;
        store::find_user(&conn, &snapshot.id)
    };
    let user = match fetched {
        Ok(Some(row)) => row,
        Ok(None) => snapshot,
        Err(e) => {
            tracing::error!("Error syncing user data: {}", e);
            snapshot
        }
    };

    if let Err(e) = session
        .insert(
            SESSION_KEY,
            &SessionUser {
                user: Some(user.clone()),
                is_admin: sess.is_admin,
            },
        )
        .await
    {
        tracing::error!("Error inserting session: {:?}", e);
    }

    Ok((StatusCode::OK, Json(user)))
}

/// Self-service profile update. The session is updated first; the
/// upstream write is best-effort and a failure is logged and ignored,
/// so the session keeps reflecting the edit either way.
pub async fn update_user(
    State(app): State<AppState>,
    session: Session,
    Json(updates): Json<UserUpdate>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<String>)> {
    let sess: SessionUser = session.get(SESSION_KEY).await.unwrap().unwrap_or_default();
    let Some(mut user) = sess.user else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json("Unauthorized access".to_string()),
        ));
    };

    user.apply_update(&updates);

    if let Err(e) = session
        .insert(
            SESSION_KEY,
            &SessionUser {
                user: Some(user.clone()),
                is_admin: sess.is_admin,
            },
        )
        .await
    {
        tracing::error!("Error inserting session: {:?}", e);
    }

    let written = {
        let conn = app.pool.0.lock().await;
        store::upsert_user(&conn, &user)
    };
    if let Err(e) = written {
        tracing::error!("Error updating user: {}", e);
    }

    Ok((StatusCode::OK, Json(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_id_has_fixed_prefix_and_six_digits() {
        for _ in 0..100 {
            let id = generate_trading_id();
            let digits = id.strip_prefix(TRADING_ID_PREFIX).expect("prefix");
            assert_eq!(digits.len(), 6);
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
