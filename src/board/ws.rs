use std::time::Duration;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::Instant;

use super::api::{Actor, ApiError, SharedState};
use super::notifier::{Outbound, Subscription};

/// Why a subscriber connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    ClientError,
    IdleTimeout,
    SendFailed,
    /// The registry dropped this subscriber (closed or not draining).
    Deregistered,
}

// ── WebSocket handler ────────────────────────────────────────────────

/// `GET /api/boards/{id}/events`: upgrade to a WebSocket that streams the
/// board's change events.
pub async fn board_events(
    actor: Actor,
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let subscription = state.service.subscribe(actor.0, board_id).await?;
    let idle_timeout = state.idle_timeout;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, idle_timeout)))
}

async fn handle_socket(socket: WebSocket, subscription: Subscription, idle_timeout: Duration) {
    let board_id = subscription.board_id();
    let subscriber = subscription.id();
    tracing::debug!(board_id, %subscriber, "event stream opened");
    let (sender, receiver) = socket.split();
    let reason = run_socket_loop(sender, receiver, subscription, idle_timeout).await;
    tracing::debug!(board_id, %subscriber, ?reason, "event stream closed");
}

/// Forward queued frames to the client until either side goes away.
///
/// Events go out as text frames and heartbeats as pings. Any client frame
/// (including pongs) resets the idle timer. Dropping `subscription` on
/// return deregisters the connection.
pub async fn run_socket_loop<S, R>(
    mut sender: S,
    mut receiver: R,
    mut subscription: Subscription,
    idle_timeout: Duration,
) -> CloseReason
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    let reason = loop {
        tokio::select! {
            _ = &mut idle => break CloseReason::IdleTimeout,

            frame = subscription.recv() => {
                let message = match frame {
                    Some(Outbound::Event(json)) => Message::Text(json.to_string().into()),
                    Some(Outbound::Heartbeat) => Message::Ping(Default::default()),
                    None => break CloseReason::Deregistered,
                };
                if sender.send(message).await.is_err() {
                    break CloseReason::SendFailed;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(_)) => idle.as_mut().reset(Instant::now() + idle_timeout),
                    Some(Err(_)) => break CloseReason::ClientError,
                }
            }
        }
    };

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
    reason
}

// ── Tests ────────────────────────────────────────────────────────────
