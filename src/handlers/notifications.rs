use crate::auth::validate_session;
use crate::models::Notification;
use crate::state::AppState;
use crate::store;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tower_sessions::Session;

/// The session user's notifications, newest first, straight from the
/// mirror.
pub async fn list_notifications(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Notification>>), (StatusCode, Json<String>)> {
    let user = validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let notifications: Vec<Notification> = app
        .shared
        .notifications()
        .into_iter()
        .filter(|notification| notification.user_id == user.id)
        .collect();

    Ok((StatusCode::OK, Json(notifications)))
}

/// Mark a notification read. Idempotent: marking an already-read
/// notification writes nothing and emits no change event.
pub async fn mark_notification_read(
    State(app): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<String>)> {
    validate_session(&session)
        .await
        .map_err(|status| (status, Json("Unauthorized access".to_string())))?;

    let changed = {
        let conn = app.pool.0.lock().await;
        store::mark_notification_read(&conn, &id).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?
    };

    if changed {
        app.shared.apply_notification_read(&id);
    }

    Ok(StatusCode::NO_CONTENT)
}
