//! HTTP route handlers (§6 "HTTP adjuncts"): registration, room listing,
//! and the single `/room/{id}` endpoint that is either a page view or the
//! WebSocket upgrade the spec pins at `ws(s)://host/room/{id}`.
//!
//! Thin by design (spec.md §1: HTTP/session layer is an external
//! collaborator to the core): handlers here do nothing but resolve a
//! session, talk to [`amadeus_core::RoomRegistry`], and hand the upgraded
//! socket to [`amadeus_core::handle_room_socket`]. Router assembly and the
//! `{ "error": ..., "message": ... }` response shape are grounded in the
//! teacher's `api::http::create_router` and `api::response::api_error`.

use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use amadeus_core::{CloseReason, RoomId, SessionDirectory, SessionId};

use crate::state::AppState;

const SESSION_COOKIE: &str = "amadeus_session";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/register", post(register))
        .route("/room", get(list_rooms))
        .route("/room/{id}", get(room_page_or_socket))
        .with_state(state)
}

fn api_error(status: StatusCode, code: &str, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": message.to_string() }))).into_response()
}

/// `GET /` — the registration landing page (§6). Deliberately inline, tiny
/// HTML: front-end rendering is out of this spec's scope (spec.md §1), so
/// this exists only to fix the name and exercise `/register` from a
/// browser, not to be a real client.
async fn index() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html><head><title>Amadeus</title></head>
<body>
<h1>Amadeus</h1>
<form method="post" action="/register">
  <input name="name" placeholder="display name" required>
  <button type="submit">Play</button>
</form>
</body></html>"#,
    )
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
}

/// `POST /register` (§6): assigns a new opaque session nonce, records the
/// display name in the `SessionDirectory`, and sets it as a cookie. No
/// authentication beyond the nonce itself (spec.md §1 Non-goals).
async fn register(State(state): State<AppState>, body: axum::extract::Form<RegisterRequest>) -> Response {
    let name = body.0.name.trim();
    if name.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "invalid_request", "name must not be empty");
    }

    let session = SessionId::from(new_session_nonce());
    state.sessions.register(session.clone(), name.to_string());

    let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", session.0);
    let mut response = Json(json!({ "sessionId": session.0, "name": name })).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie.parse().expect("cookie header is valid ASCII"));
    response
}

fn new_session_nonce() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect()
}

/// `GET /room` (§4.3, §6): a read-only listing built entirely from the
/// registry's volatile per-room snapshots; never blocks on a controller.
async fn list_rooms(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rooms: Vec<_> = state
        .registry
        .list()
        .into_iter()
        .map(|listing| {
            json!({
                "id": listing.id.0,
                "connectedCount": listing.connected_count,
                "maxPlayers": listing.max_players,
                "phase": listing.phase_tag,
                "createdAtMs": listing.created_at_ms,
            })
        })
        .collect();
    Json(json!({ "rooms": rooms }))
}

/// `GET /room/{id}` (§6): either the WebSocket upgrade the spec pins at
/// this exact path, or — absent an `Upgrade` header — the static client
/// page that a browser would load before opening that socket.
async fn room_page_or_socket(
    ws: Option<WebSocketUpgrade>,
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let room_id = RoomId::from(id.clone());

    let Some(ws) = ws else {
        return Html(format!(
            r#"<!doctype html>
<html><head><title>Amadeus &mdash; room {id}</title></head>
<body>
<h1>Room {id}</h1>
<p>Open a WebSocket connection to this same URL to play.</p>
</body></html>"#
        ))
        .into_response();
    };

    let session = session_from_cookies(&headers).filter(|session| state.sessions.name_for(session).is_some());
    let Some(session) = session else {
        // Prerequisite per spec.md §6: a session cookie resolvable by
        // SessionDirectory, i.e. one actually issued by /register — not
        // just any cookie shaped like one. We still complete the upgrade
        // so the close code/reason (VIOLATED_POLICY) is delivered over the
        // WebSocket protocol rather than as a bare HTTP rejection, matching
        // the close-code table in §6.
        return ws
            .on_upgrade(|mut socket| async move {
                let reason = CloseReason::ViolatedPolicy;
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: reason.code(),
                        reason: reason.reason().into(),
                    })))
                    .await;
            })
            .into_response();
    };

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| amadeus_core::handle_room_socket(socket, registry, room_id, session))
        .into_response()
}

fn session_from_cookies(headers: &HeaderMap) -> Option<SessionId> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == SESSION_COOKIE).then(|| SessionId::from(value.trim().to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_from_cookies_finds_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; amadeus_session=abc123; theme=dark"),
        );
        assert_eq!(session_from_cookies(&headers), Some(SessionId::from("abc123")));
    }

    #[test]
    fn session_from_cookies_absent_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(session_from_cookies(&headers), None);
    }
}
