// WebSocket handler: action envelopes in, raid events out.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::engine::{ActionEnvelope, RaidAction, RaidEvent};
use crate::metrics;

use super::AppState;

/// WebSocket upgrade handler for raid play.
pub async fn ws_raid(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(event: &RaidEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!("Failed to encode raid event: {e}");
            None
        }
    }
}

/// Forward one raid's broadcast events into the connection's outbound queue
/// until the raid goes away or the connection closes.
fn forward_raid_events(
    mut rx: broadcast::Receiver<RaidEvent>,
    out: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(text) = encode(&event) else { continue };
                    if out.send(text).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("WebSocket client lagged, skipped {n} raid events");
                }
            }
        }
    })
}

type Following = Option<(String, JoinHandle<()>)>;

async fn leave_raid(state: &AppState, connection_id: &str, raid_id: String) {
    let envelope = ActionEnvelope {
        raid_id: Some(raid_id),
        player_id: connection_id.to_string(),
        action: RaidAction::LeaveRaid,
    };
    state.registry.dispatch(envelope).await;
}

/// Follow `raid_id` from now on. A connection sits in one raid at a time, so
/// the raid it followed before is left.
async fn follow_raid(
    state: &AppState,
    connection_id: &str,
    joined: &mut Following,
    raid_id: &str,
    out: &mpsc::UnboundedSender<String>,
) {
    let Ok(rx) = state.registry.subscribe(raid_id) else {
        return;
    };
    if let Some((previous, task)) = joined.take() {
        task.abort();
        if previous != raid_id {
            tracing::info!(connection_id, raid_id = %previous, "Leaving previous raid");
            leave_raid(state, connection_id, previous).await;
        }
    }
    *joined = Some((raid_id.to_string(), forward_raid_events(rx, out.clone())));
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    // The connection id doubles as the player id for everything sent on it.
    let connection_id = uuid::Uuid::new_v4().to_string();
    metrics::CONNECTED_WEBSOCKETS.inc();
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let mut joined: Following = None;

    let hello = serde_json::json!({ "type": "connected", "playerId": connection_id }).to_string();
    if sender.send(Message::Text(hello.into())).await.is_err() {
        metrics::CONNECTED_WEBSOCKETS.dec();
        return;
    }

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                let Some(text) = outgoing else { break };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
            }
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Pings are answered by axum; binary frames are ignored
                    Some(Ok(_)) => continue,
                };

                let mut envelope = match ActionEnvelope::parse(text.as_str(), Some(&connection_id)) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        if let Some(reply) = encode(&RaidEvent::rejected("unknown", &e)) {
                            let _ = out_tx.send(reply);
                        }
                        continue;
                    }
                };
                // A socket only ever speaks for its own player
                envelope.player_id = connection_id.clone();
                if envelope.raid_id.is_none() {
                    envelope.raid_id = joined.as_ref().map(|(id, _)| id.clone());
                }

                let leaving = envelope.action == RaidAction::LeaveRaid;
                let was_following = match (&joined, &envelope.raid_id) {
                    (Some((id, _)), Some(raid_id)) => id == raid_id,
                    _ => false,
                };
                let dispatched = state.registry.dispatch(envelope).await;

                // Broadcast events reach a following socket through its
                // subscription; everything else is answered directly.
                for event in dispatched.events.iter() {
                    if event.is_rejection() || !was_following || leaving {
                        if let Some(reply) = encode(event) {
                            let _ = out_tx.send(reply);
                        }
                    }
                }

                let accepted = !dispatched.events.iter().any(RaidEvent::is_rejection);
                if leaving && accepted && was_following {
                    if let Some((_, task)) = joined.take() {
                        task.abort();
                    }
                    continue;
                }

                // Follow the raid this connection just created or joined.
                if let (Some(raid_id), false, true) = (dispatched.raid_id.as_ref(), was_following, accepted) {
                    follow_raid(&state, &connection_id, &mut joined, raid_id, &out_tx).await;
                }
            }
        }
    }

    // Leaving the socket means leaving the raid.
    if let Some((raid_id, task)) = joined.take() {
        task.abort();
        leave_raid(&state, &connection_id, raid_id).await;
    }
    metrics::CONNECTED_WEBSOCKETS.dec();
    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}
