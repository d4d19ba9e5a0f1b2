use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::queue::TaskQueue;

use super::event::{EnrichedTask, WebhookEvent};
use super::matcher::EventMatcher;

/// What the ingress path decided about one webhook delivery.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued {
        event_type: String,
        users_processed: usize,
    },
    Ignored {
        reason: &'static str,
    },
}

/// Ingress fan-out: match an incoming event against stored preferences and
/// enqueue one task per matching subscriber. The HTTP handler stays thin;
/// all acceptance decisions live here.
pub struct EventDispatcher {
    matcher: EventMatcher,
    queue: Arc<TaskQueue>,
}

impl EventDispatcher {
    pub fn new(matcher: EventMatcher, queue: Arc<TaskQueue>) -> Self {
        Self { matcher, queue }
    }

    pub async fn handle(&self, event: WebhookEvent) -> anyhow::Result<DispatchOutcome> {
        let Some(board) = event.board() else {
            debug!("ignoring event without board context type={}", event.action.kind);
            return Ok(DispatchOutcome::Ignored {
                reason: "no board in payload",
            });
        };
        let board_id = board.id.clone();

        let matches = self
            .matcher
            .matches_for(&board_id, &event.action.kind)
            .await
            .context("preference lookup failed")?;

        if matches.is_empty() {
            debug!(
                "no subscribers for board={} type={}",
                board_id, event.action.kind
            );
            return Ok(DispatchOutcome::Ignored {
                reason: "no matching subscribers",
            });
        }

        let event_type = matches[0].event_type.clone();
        let users_processed = matches.len();
        for preference in &matches {
            let task = EnrichedTask::new(event.clone(), preference);
            self.queue
                .enqueue(&task)
                .await
                .with_context(|| format!("enqueue failed for {}", preference.account_email))?;
        }

        info!(
            "queued event board={} type={} subscribers={}",
            board_id, event_type, users_processed
        );
        Ok(DispatchOutcome::Queued {
            event_type,
            users_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use tempfile::NamedTempFile;

    use super::{DispatchOutcome, EventDispatcher};
    use crate::config::{DatabaseConfig, QueueConfig};
    use crate::db::{Account, DatabaseManager, SubscriberPreference};
    use crate::queue::TaskQueue;
    use crate::relay::{EventMatcher, WebhookEvent};

    async fn test_manager(file: &NamedTempFile) -> DatabaseManager {
        let config = DatabaseConfig {
            url: None,
            filename: Some(file.path().to_string_lossy().to_string()),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    fn dispatcher_for(manager: &DatabaseManager) -> (EventDispatcher, Arc<TaskQueue>) {
        let queue = Arc::new(TaskQueue::new(
            manager.task_store(),
            &QueueConfig {
                workers: 1,
                poll_interval_ms: 20,
            },
        ));
        let matcher = EventMatcher::new(manager.preference_store());
        (EventDispatcher::new(matcher, queue.clone()), queue)
    }

    fn preference(email: &str) -> SubscriberPreference {
        SubscriberPreference {
            id: 0,
            account_email: email.to_string(),
            board_id: "B1".to_string(),
            board_name: "Sales".to_string(),
            webhook_id: "W1".to_string(),
            event_type: "commentCard".to_string(),
            label_id: None,
            label_name: None,
            list_name: None,
            created_at: Utc::now(),
        }
    }

    fn comment_event() -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "action": {
                "type": "Mentioned in a card",
                "data": {
                    "card": {"id": "C1"},
                    "board": {"id": "B1", "name": "Sales"},
                    "text": "@bob look at this"
                },
                "member": {"username": "alice"}
            }
        }))
        .expect("event")
    }

    #[tokio::test]
    async fn fans_out_one_task_per_matching_subscriber() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = test_manager(&file).await;
        for email in ["a@example.com", "b@example.com"] {
            manager
                .account_store()
                .upsert_account(&Account {
                    email: email.to_string(),
                    api_key: "k".to_string(),
                    api_token: "t".to_string(),
                    linked_board_id: None,
                    linked_board_name: None,
                })
                .await
                .expect("seed account");
            manager
                .preference_store()
                .upsert_preference(&preference(email))
                .await
                .expect("seed preference");
        }
        let (dispatcher, queue) = dispatcher_for(&manager);

        let outcome = dispatcher
            .handle(comment_event())
            .await
            .expect("dispatch succeeds");

        assert_eq!(
            outcome,
            DispatchOutcome::Queued {
                event_type: "commentCard".to_string(),
                users_processed: 2,
            }
        );
        assert_eq!(queue.depth().await.expect("depth"), 2);
    }

    #[tokio::test]
    async fn ignores_events_with_no_subscribers() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = test_manager(&file).await;
        let (dispatcher, queue) = dispatcher_for(&manager);

        let outcome = dispatcher
            .handle(comment_event())
            .await
            .expect("dispatch succeeds");

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert_eq!(queue.depth().await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn ignores_events_without_board_context() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = test_manager(&file).await;
        let (dispatcher, _queue) = dispatcher_for(&manager);

        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "action": {"type": "commentCard"}
        }))
        .expect("event");

        let outcome = dispatcher.handle(event).await.expect("dispatch succeeds");
        assert_eq!(
            outcome,
            DispatchOutcome::Ignored {
                reason: "no board in payload"
            }
        );
    }
}
