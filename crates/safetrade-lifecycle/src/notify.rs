//! # Notifier
//!
//! Status changes fan out to the parties and operators as
//! [`TransitionEvent`]s. Delivery is asynchronous: the executor hands the
//! event to a [`NotificationDispatcher`], which queues it on a bounded
//! channel and returns immediately. A background task drains the queue into
//! a [`Notifier`]. Delivery failures are logged and counted; they never
//! reach the caller and never roll back a committed transition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use safetrade_core::{Actor, EntityKind, Timestamp, TransactionId};
use safetrade_state::{LifecycleStatus, Recipient, Tracked};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub transaction_id: TransactionId,
    pub from: String,
    pub to: String,
    pub actor: Actor,
    pub occurred_at: Timestamp,
    pub audiences: Vec<Recipient>,
}

impl TransitionEvent {
    /// Build the event for `record` having moved `from -> to`.
    pub fn for_record<T: Tracked>(
        record: &T,
        from: T::Status,
        to: T::Status,
        actor: &Actor,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            entity: <T::Status as LifecycleStatus>::ENTITY,
            entity_id: record.key(),
            transaction_id: record.transaction_id(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            actor: *actor,
            occurred_at,
            audiences: record.recipients(from, to),
        }
    }

    pub fn notifies_admins(&self) -> bool {
        self.audiences.contains(&Recipient::Admins)
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// A delivery channel for transition events.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError>;
}

/// Emits one `tracing` event per audience.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        for audience in &event.audiences {
            let recipient = match audience {
                Recipient::User(user) => user.to_string(),
                Recipient::Admins => "admins".to_string(),
            };
            tracing::info!(
                entity = %event.entity,
                entity_id = %event.entity_id,
                from = %event.from,
                to = %event.to,
                recipient = %recipient,
                "notification delivered"
            );
        }
        Ok(())
    }
}

/// Keeps delivered events in memory. Can be switched to fail every delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<TransitionEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that rejects every event.
    pub fn failing() -> Self {
        let n = Self::default();
        n.set_failing(true);
        n
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier set to fail".into()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────────

/// Non-blocking front of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<TransitionEvent>>,
    failed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl NotificationDispatcher {
    /// Start the delivery task on the current tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<TransitionEvent>(capacity.max(1));
        let failed = Arc::new(AtomicU64::new(0));
        let task_failed = Arc::clone(&failed);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = notifier.notify(&event).await {
                    task_failed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("safetrade_notifications_failed_total").increment(1);
                    tracing::warn!(
                        entity = %event.entity,
                        entity_id = %event.entity_id,
                        to = %event.to,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
            tracing::debug!("notification queue closed");
        });
        Self {
            tx: Some(tx),
            failed,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A dispatcher that discards every event.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            failed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue an event. Never blocks and never fails.
    pub fn dispatch(&self, event: TransitionEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            tracing::warn!(reason, "notification dropped");
        }
    }

    /// Deliveries the notifier rejected.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events that never made it onto the queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrade_core::UserId;
    use std::time::Duration;

    fn event() -> TransitionEvent {
        TransitionEvent {
            entity: EntityKind::Invoice,
            entity_id: Uuid::new_v4(),
            transaction_id: TransactionId::new(),
            from: "draft".to_string(),
            to: "sent".to_string(),
            actor: Actor::admin(UserId::new()),
            occurred_at: Timestamp::now(),
            audiences: vec![Recipient::User(UserId::new())],
        }
    }

    async fn settle(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::spawn(notifier.clone(), 8);
        dispatcher.dispatch(event());
        dispatcher.dispatch(event());
        settle(|| notifier.len() == 2).await;
        assert_eq!(notifier.len(), 2);
        assert_eq!(dispatcher.failed(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let dispatcher = NotificationDispatcher::spawn(notifier.clone(), 8);
        dispatcher.dispatch(event());
        settle(|| dispatcher.failed() == 1).await;
        assert_eq!(dispatcher.failed(), 1);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_disabled_dispatcher_is_inert() {
        let dispatcher = NotificationDispatcher::disabled();
        dispatcher.dispatch(event());
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[tokio::test]
    async fn test_logging_notifier_accepts_everything() {
        assert!(LoggingNotifier.notify(&event()).await.is_ok());
    }
}
