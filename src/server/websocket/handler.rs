//! WebSocket route handler.
//!
//! Each accepted socket runs one bookmark list view: it subscribes to the
//! change feed, issues a sequence-tagged full read, folds feed events into
//! its `ListState`, and pushes a `list_snapshot` to the browser after every
//! state change. Teardown deregisters the view and drops the subscription;
//! both are safe to repeat.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use super::messages::{list::ListSnapshotMessage, msg_types, system, ClientMessage, ServerMessage};
use crate::bookmark_store::{Bookmark, BookmarkStore};
use crate::server::session::Session;
use crate::server::state::{GuardedBookmarkStore, ServerState};
use crate::sync::{ListState, ViewCommand};

/// WebSocket upgrade handler.
///
/// This is the route handler for `GET /v1/ws`. It validates the session
/// and upgrades the connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    session: Session,
    State(state): State<ServerState>,
) -> Response {
    debug!("WebSocket upgrade for user {}", session.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, session.user_id, state))
}

fn snapshot_of(list: &ListState) -> ServerMessage {
    ServerMessage::new(
        msg_types::LIST_SNAPSHOT,
        ListSnapshotMessage {
            bookmarks: list.bookmarks().to_vec(),
            loading: list.is_loading(),
        },
    )
}

/// Run the full read for one reload tag off the async runtime.
///
/// A read error is logged and delivered as the empty sequence: the view
/// renders an empty list with no user-facing message.
fn spawn_reload(
    seq: u64,
    store: GuardedBookmarkStore,
    user_id: usize,
    results: mpsc::Sender<(u64, Vec<Bookmark>)>,
) {
    tokio::task::spawn_blocking(move || {
        let bookmarks = match store.get_user_bookmarks(user_id) {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                error!("Error fetching bookmarks for user {}: {}", user_id, e);
                Vec::new()
            }
        };
        // The receiver may be gone if the view tore down mid-read; the
        // result is simply dropped then.
        let _ = results.blocking_send((seq, bookmarks));
    });
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, user_id: usize, state: ServerState) {
    // Register for refresh commands and subscribe to the change feed before
    // the first read is issued, so no event can slip between the two.
    let (view_id, mut refresh_rx) = state.view_registry.register(user_id).await;
    let mut feed_rx = state.bookmark_store.subscribe();

    debug!("WebSocket connected: user {} view {}", user_id, view_id);

    let (outgoing_tx, outgoing_rx) = mpsc::channel::<ServerMessage>(32);
    let (ws_sink, mut ws_stream) = socket.split();

    let connected_msg = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    // Spawn task to forward outgoing messages to the WebSocket
    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, connected_msg));

    let mut list = ListState::new();
    let _ = outgoing_tx.send(snapshot_of(&list)).await;

    let (reload_tx, mut reload_rx) = mpsc::channel::<(u64, Vec<Bookmark>)>(4);
    spawn_reload(
        list.begin_reload(),
        state.bookmark_store.clone(),
        user_id,
        reload_tx.clone(),
    );

    let mut refresh_open = true;
    let mut feed_open = true;

    loop {
        tokio::select! {
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &outgoing_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary is ignored; ping/pong frames are handled by
                        // the protocol layer.
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            change = feed_rx.recv(), if feed_open => {
                match change {
                    Ok(change) => {
                        if change.user_id() == user_id {
                            debug!(
                                "Applying {} event for bookmark {}",
                                change.event_type(),
                                change.bookmark_id()
                            );
                            list.apply(&change);
                            let _ = outgoing_tx.send(snapshot_of(&list)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Change feed lagged by {} events for user {}, re-reading",
                            skipped, user_id
                        );
                        spawn_reload(
                            list.begin_reload(),
                            state.bookmark_store.clone(),
                            user_id,
                            reload_tx.clone(),
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        feed_open = false;
                    }
                }
            }

            cmd = refresh_rx.recv(), if refresh_open => {
                match cmd {
                    Some(ViewCommand::Refresh) => {
                        spawn_reload(
                            list.begin_reload(),
                            state.bookmark_store.clone(),
                            user_id,
                            reload_tx.clone(),
                        );
                    }
                    None => {
                        refresh_open = false;
                    }
                }
            }

            completed = reload_rx.recv() => {
                // Cannot be None: this task holds a sender for its lifetime.
                if let Some((seq, bookmarks)) = completed {
                    if list.complete_reload(seq, bookmarks) {
                        let _ = outgoing_tx.send(snapshot_of(&list)).await;
                    } else {
                        debug!("Discarding stale reload result for user {}", user_id);
                    }
                }
            }
        }
    }

    debug!("WebSocket disconnected: user {} view {}", user_id, view_id);
    outgoing_handle.abort();
    state.view_registry.deregister(user_id, view_id).await;
}

/// Handle a parsed client message.
async fn handle_client_message(text: &str, outgoing_tx: &mpsc::Sender<ServerMessage>) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) if msg.msg_type == msg_types::PING => {
            let _ = outgoing_tx
                .send(ServerMessage::new(msg_types::PONG, system::Pong))
                .await;
        }
        Ok(msg) => {
            debug!("Unknown message type: {}", msg.msg_type);
            let error_msg = ServerMessage::new(
                msg_types::ERROR,
                system::Error::new(
                    "unknown_type",
                    format!("Unknown message type: {}", msg.msg_type),
                ),
            );
            let _ = outgoing_tx.send(error_msg).await;
        }
        Err(e) => {
            debug!("Failed to parse client message: {}", e);
            let error_msg = ServerMessage::new(
                msg_types::ERROR,
                system::Error::new("parse_error", format!("Invalid message format: {}", e)),
            );
            let _ = outgoing_tx.send(error_msg).await;
        }
    }
}

/// Forward messages from the outgoing channel to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<ServerMessage>,
    initial_msg: ServerMessage,
) {
    // Send initial connected message
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    // Forward all subsequent messages
    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
            }
        }
    }
}
