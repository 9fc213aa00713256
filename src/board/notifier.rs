//! Commit-gated change notification.
//!
//! Mutations call [`Notifier::publish`] while their [`UnitOfWork`] is still
//! open. Nothing reaches subscribers at that point: the event is parked in an
//! after-commit hook and delivered only once storage has committed, so a
//! subscriber that refetches on notification always sees the new state.
//! Rolled-back work drops its events silently.
//!
//! Delivery is fire-and-forget per subscriber. A subscriber whose channel is
//! closed (connection gone) or full (connection not draining) is removed
//! from the registry; the remaining subscribers and the mutation itself are
//! unaffected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::models::ChangeEvent;
use super::unit_of_work::UnitOfWork;

/// Frame queued for a single subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized [`ChangeEvent`], shared between all subscribers of a board.
    Event(Arc<str>),
    Heartbeat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

type Subscribers = HashMap<Uuid, mpsc::Sender<Outbound>>;

/// Board id → live subscriber connections.
pub struct SubscriberRegistry {
    boards: DashMap<i64, Subscribers>,
    buffer: usize,
}

impl SubscriberRegistry {
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            boards: DashMap::new(),
            buffer: buffer.max(1),
        })
    }

    pub fn register(self: &Arc<Self>, board_id: i64) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.boards.entry(board_id).or_default().insert(id, tx);
        tracing::debug!(board_id, subscriber = %id, "subscriber registered");
        Subscription {
            id,
            board_id,
            rx,
            registry: Arc::clone(self),
        }
    }

    pub fn deregister(&self, board_id: i64, id: Uuid) {
        let removed = self
            .boards
            .get_mut(&board_id)
            .and_then(|mut subs| subs.remove(&id))
            .is_some();
        self.boards.remove_if(&board_id, |_, subs| subs.is_empty());
        if removed {
            tracing::debug!(board_id, subscriber = %id, "subscriber deregistered");
        }
    }

    pub fn subscriber_count(&self, board_id: i64) -> usize {
        self.boards.get(&board_id).map(|subs| subs.len()).unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        self.boards.iter().map(|entry| entry.value().len()).sum()
    }

    /// Deliver `event` to every current subscriber of its board.
    pub fn deliver(&self, event: &ChangeEvent) -> DeliveryReport {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize change event");
                return DeliveryReport::default();
            }
        };
        self.send_to_board(event.board_id, Outbound::Event(payload))
    }

    /// Send a heartbeat to every live connection on every board.
    pub fn heartbeat(&self) -> DeliveryReport {
        let board_ids: Vec<i64> = self.boards.iter().map(|entry| *entry.key()).collect();
        let mut report = DeliveryReport::default();
        for board_id in board_ids {
            let sent = self.send_to_board(board_id, Outbound::Heartbeat);
            report.delivered += sent.delivered;
            report.dropped += sent.dropped;
        }
        report
    }

    fn send_to_board(&self, board_id: i64, frame: Outbound) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if let Some(mut subs) = self.boards.get_mut(&board_id) {
            subs.retain(|id, tx| match tx.try_send(frame.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(board_id, subscriber = %id, "subscriber closed, removing");
                    report.dropped += 1;
                    false
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(board_id, subscriber = %id, "subscriber not draining, removing");
                    report.dropped += 1;
                    false
                }
            });
        }
        if report.dropped > 0 {
            self.boards.remove_if(&board_id, |_, subs| subs.is_empty());
        }
        report
    }
}

/// A live subscription. Dropping it deregisters the connection.
pub struct Subscription {
    id: Uuid,
    board_id: i64,
    rx: mpsc::Receiver<Outbound>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn board_id(&self) -> i64 {
        self.board_id
    }

    /// Next queued frame. `None` once the registry has dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.deregister(self.board_id, self.id);
    }
}

/// Buffers change events against a unit of work and hands them to the
/// registry after commit.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<SubscriberRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn publish(&self, uow: &mut UnitOfWork<'_>, event: ChangeEvent) {
        let registry = Arc::clone(&self.registry);
        let discarded = (event.event_type, event.board_id, event.entity_id);
        uow.after_commit(move || {
            let report = registry.deliver(&event);
            tracing::debug!(
                event = ?event.event_type,
                board_id = event.board_id,
                entity_id = event.entity_id,
                delivered = report.delivered,
                dropped = report.dropped,
                "change event delivered"
            );
        });
        uow.after_rollback(move || {
            let (event_type, board_id, entity_id) = discarded;
            tracing::debug!(event = ?event_type, board_id, entity_id, "change event discarded on rollback");
        });
    }
}

/// Spawn the periodic heartbeat that keeps idle connections open through
/// intermediaries and prunes dead ones.
pub fn spawn_heartbeat(registry: Arc<SubscriberRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = registry.heartbeat();
            if report.dropped > 0 {
                tracing::info!(dropped = report.dropped, "heartbeat pruned dead subscribers");
            }
        }
    })
}
