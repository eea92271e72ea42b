//! services/api/src/web/search_ws.rs
//!
//! The live exercise search. Each connection owns a debounced search task; the
//! client streams the search box contents and receives results only for the
//! latest text.

use crate::web::{
    protocol::{ClientMessage, ExerciseView, ServerMessage},
    state::{AppState, SignedIn},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use training_core::DebouncedSearch;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn search_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SignedIn>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session: SignedIn) {
    info!("Exercise search connection opened for user: {}", session.user.id);

    let (mut sender, mut receiver) = socket.split();
    let search = DebouncedSearch::spawn(session.store.clone(), app_state.config.search_debounce);
    let mut results = search.results();

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Query { text }) => search.input(text),
                        Err(e) => {
                            warn!("Unrecognized search message: {}", e);
                            let msg = ServerMessage::Error {
                                message: format!("Unrecognized message: {}", e),
                            };
                            if send_message(&mut sender, &msg).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                let published = results.borrow_and_update().clone();
                let msg = ServerMessage::Results {
                    query: published.query,
                    exercises: published.exercises.into_iter().map(ExerciseView::from).collect(),
                };
                if send_message(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Exercise search connection closed for user: {}", session.user.id);
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize search message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
