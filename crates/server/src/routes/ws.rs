//! WebSocket push of game snapshots
//!
//! Sends the current snapshot on connect and again after every change. The
//! socket closes when the game it follows is torn down or replaced; clients
//! reconnect to follow the new one.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use coach_core::Snapshot;
use futures::{SinkExt, StreamExt};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Snapshot { snapshot: &'a Snapshot },
    Error { message: String },
}

pub async fn game_ws(ws: WebSocketUpgrade, Extension(state): Extension<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let handle = match state.game().await {
        Ok(handle) => handle,
        Err(e) => {
            let _ = send_msg(&mut sender, &ServerMessage::Error { message: e.to_string() }).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let mut snapshots = handle.subscribe();
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if let Err(e) = send_msg(&mut sender, &ServerMessage::Snapshot { snapshot: &snapshot }).await {
            tracing::debug!("WebSocket send failed: {e}");
            return;
        }

        let changed = loop {
            tokio::select! {
                changed = snapshots.changed() => break changed.is_ok(),
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    // Clients have nothing to say on this socket
                    Some(Ok(_)) => {}
                },
            }
        };
        if !changed {
            break;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

async fn send_msg(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage<'_>,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
