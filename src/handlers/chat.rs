use crate::auth::{current_session, require_admin, validate_session};
use crate::models::{Message, MessageKind, SendMessageRequest, TypingRequest, TypingResponse, ADMIN_ID};
use crate::presence::{PresenceMap, TypingStatus};
use crate::state::AppState;
use crate::store;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::collections::HashMap;
use tower_sessions::Session;
use uuid::Uuid;

/// What the administrative account says when a thread is opened for
/// the first time.
pub const WELCOME_MESSAGE: &str = "Welcome to our company! How may we assist you?";

/// The canned first message of a thread, sent as the administrator.
pub fn build_welcome_message(user_id: &str) -> Message {
    Message {
        id: Uuid::new_v4().to_string(),
        sender_id: ADMIN_ID.to_string(),
        receiver_id: user_id.to_string(),
        content: WELCOME_MESSAGE.to_string(),
        kind: MessageKind::Text,
        timestamp: Utc::now().timestamp_millis(),
        read: false,
    }
}

fn in_thread(message: &Message, user_id: &str) -> bool {
    (message.sender_id == user_id && message.receiver_id == ADMIN_ID)
        || (message.sender_id == ADMIN_ID && message.receiver_id == user_id)
}

/// The session user's conversation with the administrative account,
/// oldest first. An empty thread gets the welcome message seeded on
/// the way out.
pub async fn get_conversation(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Vec<Message>>), (StatusCode, Json<String>)> {
    let user = validate_session(&session).await.map_err(|status| {
        (status, Json("Unauthorized access".to_string()))
    })?;

    let thread: Vec<Message> = app
        .shared
        .messages()
        .into_iter()
        .filter(|message| in_thread(message, &user.id))
        .collect();
    if !thread.is_empty() {
        return Ok((StatusCode::OK, Json(thread)));
    }

    // First open of this thread: seed the welcome message.
    let welcome = build_welcome_message(&user.id);
    {
        let conn = app.pool.0.lock().await;
        store::insert_message(&conn, &welcome).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(format!("Database error: {}", e)),
            )
        })?;
    }
    app.shared.add_message(welcome.clone());

    Ok((StatusCode::OK, Json(vec![welcome])))
}

/// Send a message into a thread. Users always address the
/// administrator; the administrator picks the receiving user.
#[axum::debug_handler]
pub async fn send_message(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, Json<String>)> {
    let sess = current_session(&session).await;

    let sender_id = if sess.is_admin {
        ADMIN_ID.to_string()
    } else {
        match &sess.user {
            Some(user) => user.id.clone(),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json("Unauthorized access".to_string()),
                ));
            }
        }
    };

    let receiver_id = if sess.is_admin {
        match request.receiver_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json("receiver_id is required".to_string()),
                ));
            }
        }
    } else {
        ADMIN_ID.to_string()
    };

    if request.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("Message content cannot be empty".to_string()),
        ));
    }

    let message = Message {
        id: Uuid::new_v4().to_string(),
        sender_id: sender_id.clone(),
        receiver_id,
        content: request.content,
        kind: request.kind,
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

    // Sending ends the sender's typing state.
    if sess.is_admin {
        app.presence.clear(PresenceMap::ADMIN_KEY);
    } else {
        app.presence.clear(&PresenceMap::user_key(&sender_id));
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// All conversations, grouped by the non-admin participant. Admin
/// only.
pub async fn admin_threads(
    State(app): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<HashMap<String, Vec<Message>>>), (StatusCode, Json<String>)> {
    require_admin(&session).await.map_err(|status| {
        (status, Json("Unauthorized access".to_string()))
    })?;

    let mut threads: HashMap<String, Vec<Message>> = HashMap::new();
    for message in app.shared.messages() {
        let counterpart = if message.sender_id == ADMIN_ID {
            message.receiver_id.clone()
        } else {
            message.sender_id.clone()
        };
        threads.entry(counterpart).or_default().push(message);
    }

    Ok((StatusCode::OK, Json(threads)))
}

/// Record that the caller is (or stopped) typing.
pub async fn set_typing(
    State(app): State<AppState>,
    session: Session,
    Json(request): Json<TypingRequest>,
) -> Result<StatusCode, (StatusCode, Json<String>)> {
    let sess = current_session(&session).await;

    let (key, thread_user) = if sess.is_admin {
        match request.user_id {
            Some(id) if !id.trim().is_empty() => (PresenceMap::ADMIN_KEY.to_string(), id),
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json("user_id is required".to_string()),
                ));
            }
        }
    } else {
        match &sess.user {
            Some(user) => (PresenceMap::user_key(&user.id), user.id.clone()),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json("Unauthorized access".to_string()),
                ));
            }
        }
    };

    if request.is_typing {
        app.presence.set(
            &key,
            TypingStatus {
                user_id: thread_user,
                is_typing: true,
                timestamp: Utc::now().timestamp_millis(),
            },
        );
    } else {
        app.presence.clear(&key);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Poll the counterpart's typing state for a thread. A user asks about
/// the administrator; the administrator asks about a user.
pub async fn get_typing(
    State(app): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<TypingResponse>), (StatusCode, Json<String>)> {
    let sess = current_session(&session).await;

    let is_typing = if sess.is_admin {
        app.presence
            .get(&PresenceMap::user_key(&user_id))
            .map(|status| status.is_typing)
            .unwrap_or(false)
    } else {
        match &sess.user {
            Some(user) => app
                .presence
                .get(PresenceMap::ADMIN_KEY)
                // the admin entry names the thread it is typing into
                .map(|status| status.is_typing && status.user_id == user.id)
                .unwrap_or(false),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json("Unauthorized access".to_string()),
                ));
            }
        }
    };

    Ok((StatusCode::OK, Json(TypingResponse { is_typing })))
}
