use crate::auth::current_session;
use crate::models::Notification;
use crate::state::{AppState, Collection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tower_sessions::Session;

/// One server-sent event per change to a mirrored collection. When the
/// notifications collection changed and the subscriber is a user with
/// notifications enabled, the payload carries their newest unread
/// notification, which is what drives the transient popup.
#[derive(Serialize)]
struct ChangePayload {
    collection: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<Notification>,
}

pub async fn change_feed(
    State(app): State<AppState>,
    session: Session,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<String>)> {
    let sess = current_session(&session).await;
    if sess.user.is_none() && !sess.is_admin {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json("Unauthorized access".to_string()),
        ));
    }

    // The popup is suppressed when the user turned notifications off.
    let popup_user = sess.user.filter(|user| user.notifications);
    let rx = app.shared.subscribe();
    let shared = app.shared.clone();

    let stream = stream::unfold(
        (rx, shared, popup_user),
        |(mut rx, shared, popup_user)| async move {
            loop {
                match rx.recv().await {
                    Ok(collection) => {
                        let notification = match (&popup_user, collection) {
                            (Some(user), Collection::Notifications) => shared
                                .notifications()
                                .into_iter()
                                // newest-first, so the first unread hit
                                // is the newest one
                                .find(|n| n.user_id == user.id && !n.read),
                            _ => None,
                        };
                        let payload = ChangePayload {
                            collection: collection.as_str(),
                            notification,
                        };
                        let event = Event::default()
                            .event("change")
                            .data(serde_json::to_string(&payload).unwrap_or_default());
                        return Some((Ok(event), (rx, shared, popup_user)));
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
