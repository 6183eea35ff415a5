// Boundary to the chat platform's outbound messages.
//
// The core only emits structured notices; turning them into text is the
// transport's job. Sends are retried with backoff and then degrade to a
// logged warning, so a dead chat never blocks matchmaking or settlement.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::PlayerId;
use crate::retry::{with_backoff, RetryPolicy};

/// Where a player's notices go (a chat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifyHandle {
    pub chat_id: i64,
}

/// A message already sent, which can be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Searching {
        waited_secs: u64,
        timeout_secs: u64,
        rating: i32,
        window: i32,
    },
    QueueTimedOut,
    QueueCanceled,
    MatchFound {
        match_id: String,
        opponent: PlayerId,
    },
    MatchAbandoned {
        match_id: String,
    },
    RatingUpdate {
        match_id: String,
        before: i32,
        after: i32,
        delta: i32,
        tier: String,
        suspended: bool,
    },
    SettlementDelayed {
        match_id: String,
    },
    ChallengeReceived {
        challenge_id: String,
        challenger: PlayerId,
        expires_in_secs: u64,
    },
    ChallengeAccepted {
        challenge_id: String,
    },
    ChallengeDeclined {
        challenge_id: String,
    },
    ChallengeExpired {
        challenge_id: String,
    },
    ChallengeCanceled {
        challenge_id: String,
    },
}

impl Notice {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Searching { .. } => "searching",
            Notice::QueueTimedOut => "queue_timed_out",
            Notice::QueueCanceled => "queue_canceled",
            Notice::MatchFound { .. } => "match_found",
            Notice::MatchAbandoned { .. } => "match_abandoned",
            Notice::RatingUpdate { .. } => "rating_update",
            Notice::SettlementDelayed { .. } => "settlement_delayed",
            Notice::ChallengeReceived { .. } => "challenge_received",
            Notice::ChallengeAccepted { .. } => "challenge_accepted",
            Notice::ChallengeDeclined { .. } => "challenge_declined",
            Notice::ChallengeExpired { .. } => "challenge_expired",
            Notice::ChallengeCanceled { .. } => "challenge_canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("chat {0} is unreachable")]
    Unreachable(i64),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_new(&self, to: &NotifyHandle, notice: &Notice) -> Result<MessageRef, NotifyError>;

    async fn edit(&self, message: &MessageRef, notice: &Notice) -> Result<(), NotifyError>;
}

/// Notifier that only logs. Used when no chat transport is attached.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    next_id: std::sync::atomic::AtomicI64,
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_new(&self, to: &NotifyHandle, notice: &Notice) -> Result<MessageRef, NotifyError> {
        let message_id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::info!(chat_id = to.chat_id, message_id, kind = notice.kind(), "notice: {notice:?}");
        Ok(MessageRef {
            chat_id: to.chat_id,
            message_id,
        })
    }

    async fn edit(&self, message: &MessageRef, notice: &Notice) -> Result<(), NotifyError> {
        tracing::debug!(
            chat_id = message.chat_id,
            message_id = message.message_id,
            kind = notice.kind(),
            "notice edit: {notice:?}"
        );
        Ok(())
    }
}

/// Retrying, degrading front for a [`Notifier`].
#[derive(Clone)]
pub struct Outbox {
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl Outbox {
    pub fn new(notifier: Arc<dyn Notifier>, retry: RetryPolicy) -> Self {
        Self { notifier, retry }
    }

    /// Send a new message. `None` if every attempt failed.
    pub async fn send(&self, to: &NotifyHandle, notice: &Notice) -> Option<MessageRef> {
        let result = with_backoff(&self.retry, notice.kind(), || {
            self.notifier.send_new(to, notice)
        })
        .await;
        match result {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(chat_id = to.chat_id, "dropping {} notice: {e}", notice.kind());
                None
            }
        }
    }

    /// Edit an existing status message, falling back to a fresh one.
    pub async fn update(
        &self,
        to: &NotifyHandle,
        status: Option<MessageRef>,
        notice: &Notice,
    ) -> Option<MessageRef> {
        if let Some(message) = status {
            let edited = with_backoff(&self.retry, notice.kind(), || {
                self.notifier.edit(&message, notice)
            })
            .await;
            match edited {
                Ok(()) => return Some(message),
                Err(e) => {
                    tracing::warn!(chat_id = to.chat_id, "edit failed, sending new message: {e}");
                }
            }
        }
        self.send(to, notice).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records every notice; optionally fails the first N sends.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, Notice)>>,
        pub edits: Mutex<Vec<(MessageRef, Notice)>>,
        pub fail_sends: Mutex<u32>,
    }

    impl RecordingNotifier {
        pub fn kinds_for(&self, chat_id: i64) -> Vec<&'static str> {
            self.sent
                .lock()
                .iter()
                .filter(|(c, _)| *c == chat_id)
                .map(|(_, n)| n.kind())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_new(&self, to: &NotifyHandle, notice: &Notice) -> Result<MessageRef, NotifyError> {
            {
                let mut fail = self.fail_sends.lock();
                if *fail > 0 {
                    *fail -= 1;
                    return Err(NotifyError::Unreachable(to.chat_id));
                }
            }
            let mut sent = self.sent.lock();
            sent.push((to.chat_id, notice.clone()));
            Ok(MessageRef {
                chat_id: to.chat_id,
                message_id: sent.len() as i64,
            })
        }

        async fn edit(&self, message: &MessageRef, notice: &Notice) -> Result<(), NotifyError> {
            self.edits.lock().push((*message, notice.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use std::time::Duration;

    fn outbox(notifier: Arc<RecordingNotifier>) -> Outbox {
        Outbox::new(
            notifier,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_send_retries_then_succeeds() {
        let notifier = Arc::new(RecordingNotifier::default());
        *notifier.fail_sends.lock() = 2;
        let out = outbox(notifier.clone());

        let msg = out.send(&NotifyHandle { chat_id: 9 }, &Notice::QueueCanceled).await;
        assert!(msg.is_some());
        assert_eq!(notifier.kinds_for(9), vec!["queue_canceled"]);
    }

    #[tokio::test]
    async fn test_send_degrades_to_none() {
        let notifier = Arc::new(RecordingNotifier::default());
        *notifier.fail_sends.lock() = 10;
        let out = outbox(notifier.clone());

        let msg = out.send(&NotifyHandle { chat_id: 9 }, &Notice::QueueTimedOut).await;
        assert!(msg.is_none());
        assert!(notifier.kinds_for(9).is_empty());
    }

    #[tokio::test]
    async fn test_update_edits_in_place() {
        let notifier = Arc::new(RecordingNotifier::default());
        let out = outbox(notifier.clone());
        let to = NotifyHandle { chat_id: 3 };

        let status = out.update(&to, None, &Notice::QueueCanceled).await;
        let again = out.update(&to, status, &Notice::QueueTimedOut).await;
        assert_eq!(status, again);
        assert_eq!(notifier.sent.lock().len(), 1);
        assert_eq!(notifier.edits.lock().len(), 1);
    }

    #[test]
    fn test_notice_serializes_with_kind_tag() {
        let json = serde_json::to_value(Notice::MatchFound {
            match_id: "m".into(),
            opponent: 4,
        })
        .unwrap();
        assert_eq!(json["kind"], "match_found");
        assert_eq!(json["opponent"], 4);
    }
}
