use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::db::DatabaseManager;
use crate::queue::TaskQueue;
use crate::trello::{Credentials, TrelloClient};

use super::event::{EnrichedTask, normalize_event_type};

/// Name of the list copied cards land in on a subscriber's linked board.
pub const INBOX_LIST: &str = "Enquiry In";

#[derive(Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed {
        source_card_id: String,
        new_card_id: String,
    },
    Abandoned(AbandonReason),
}

/// Why a claimed task produced no card. These are terminal decisions, not
/// errors; the task is completed either way.
#[derive(Debug, PartialEq, Eq)]
pub enum AbandonReason {
    MissingFields,
    UnknownAccount,
    NotLinked,
    StaleEventType,
    NoProviderIdentity,
    NotMentioned,
    NotAdded,
    MissingBinding,
    MissingInboxList,
    CopyFailed,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFields => "missing fields",
            Self::UnknownAccount => "unknown account",
            Self::NotLinked => "account not linked",
            Self::StaleEventType => "stale event type",
            Self::NoProviderIdentity => "trello identity unavailable",
            Self::NotMentioned => "user not mentioned",
            Self::NotAdded => "user not the added member",
            Self::MissingBinding => "no board binding",
            Self::MissingInboxList => "inbox list missing from binding",
            Self::CopyFailed => "card copy rejected",
        }
    }
}

/// True when `text` mentions `username` as a whole @-token. `@bob` must not
/// fire for a mention of `@bobby`.
pub fn mention_matches(text: &str, username: &str) -> bool {
    let pattern = format!(
        "(^|[^A-Za-z0-9_])@{}($|[^A-Za-z0-9_])",
        regex::escape(username)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Consumes enriched tasks: re-validates the event against the subscriber's
/// current state, applies the mention or membership gate, and copies the
/// card into the subscriber's inbox list. Attachment and label decoration
/// are best effort; only the copy itself is a hard stop.
pub struct Worker {
    db: DatabaseManager,
    trello: Arc<TrelloClient>,
}

impl Worker {
    pub fn new(db: DatabaseManager, trello: Arc<TrelloClient>) -> Self {
        Self { db, trello }
    }

    pub async fn process(&self, task: &EnrichedTask) -> anyhow::Result<TaskOutcome> {
        let Some(source_card_id) = task.event.card_id().map(str::to_string) else {
            return Ok(TaskOutcome::Abandoned(AbandonReason::MissingFields));
        };

        let account = self
            .db
            .account_store()
            .get_account(&task.account_email)
            .await
            .context("account lookup failed")?;
        let Some(account) = account else {
            return Ok(TaskOutcome::Abandoned(AbandonReason::UnknownAccount));
        };
        let Some(creds) = Credentials::from_account(&account) else {
            return Ok(TaskOutcome::Abandoned(AbandonReason::NotLinked));
        };

        // The preference may have changed between enqueue and claim. The
        // delivered type is normalized first so alias-typed deliveries
        // compare against the canonically stored one.
        if normalize_event_type(&task.event.action.kind) != task.event_type {
            debug!(
                "event type drifted stored={} delivered={}",
                task.event_type, task.event.action.kind
            );
            return Ok(TaskOutcome::Abandoned(AbandonReason::StaleEventType));
        }

        let identity = self
            .trello
            .authenticated_member(&creds)
            .await
            .context("identity lookup failed")?;
        let Some(identity) = identity else {
            return Ok(TaskOutcome::Abandoned(AbandonReason::NoProviderIdentity));
        };

        match task.event_type.as_str() {
            "commentCard" => {
                let text = task.event.action.data.text.as_deref().unwrap_or("");
                if !mention_matches(text, &identity.username) {
                    return Ok(TaskOutcome::Abandoned(AbandonReason::NotMentioned));
                }
            }
            "addMemberToCard" => {
                let added = task
                    .event
                    .action
                    .member
                    .as_ref()
                    .map(|m| m.username.as_str());
                if added != Some(identity.username.as_str()) {
                    return Ok(TaskOutcome::Abandoned(AbandonReason::NotAdded));
                }
            }
            _ => {}
        }

        let binding = self
            .db
            .board_store()
            .get_binding(&task.account_email)
            .await
            .context("board binding lookup failed")?;
        let Some(binding) = binding else {
            error!("no board binding for {}", task.account_email);
            return Ok(TaskOutcome::Abandoned(AbandonReason::MissingBinding));
        };
        let Some(inbox_list_id) = binding.lists.get(INBOX_LIST).cloned() else {
            error!(
                "binding for {} has no '{}' list",
                task.account_email, INBOX_LIST
            );
            return Ok(TaskOutcome::Abandoned(AbandonReason::MissingInboxList));
        };

        let copied = self
            .trello
            .copy_card(&creds, &source_card_id, &inbox_list_id)
            .await
            .context("card copy failed")?;
        let Some(new_card) = copied else {
            return Ok(TaskOutcome::Abandoned(AbandonReason::CopyFailed));
        };

        let backlink = format!("https://trello.com/c/{}", source_card_id);
        match self
            .trello
            .attach_url(&creds, &new_card.id, &backlink, "Original card")
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("backlink attachment rejected card={}", new_card.id),
            Err(e) => warn!("backlink attachment failed card={}: {}", new_card.id, e),
        }

        if let Err(e) = self.apply_label(task, &creds, &binding.board_id, &new_card.id).await {
            warn!("label decoration failed card={}: {}", new_card.id, e);
        }

        Ok(TaskOutcome::Completed {
            source_card_id,
            new_card_id: new_card.id,
        })
    }

    /// Resolve the configured label and apply it to the copied card. A label
    /// named but no longer present on the board is skipped with a warning.
    async fn apply_label(
        &self,
        task: &EnrichedTask,
        creds: &Credentials,
        board_id: &str,
        card_id: &str,
    ) -> anyhow::Result<()> {
        let label_id = match (&task.label_id, &task.label_name) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(name)) => {
                let labels = self
                    .trello
                    .board_labels(creds, board_id)
                    .await
                    .context("label listing failed")?
                    .unwrap_or_default();
                let found = labels.into_iter().find(|l| &l.name == name).map(|l| l.id);
                if found.is_none() {
                    warn!("label '{}' not found on board {}", name, board_id);
                }
                found
            }
            (None, None) => None,
        };

        if let Some(label_id) = label_id {
            let applied = self
                .trello
                .add_label_to_card(creds, card_id, &label_id)
                .await
                .context("label apply failed")?;
            if !applied {
                warn!("label {} rejected for card {}", label_id, card_id);
            }
        }
        Ok(())
    }
}

/// Runs a fixed number of worker loops over the shared queue.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    worker: Arc<Worker>,
    count: usize,
}

impl WorkerPool {
    pub fn new(queue: Arc<TaskQueue>, worker: Arc<Worker>, count: usize) -> Self {
        Self {
            queue,
            worker,
            count: count.max(1),
        }
    }

    pub async fn run(self) {
        let mut loops = Vec::with_capacity(self.count);
        for n in 0..self.count {
            let queue = self.queue.clone();
            let worker = self.worker.clone();
            loops.push(tokio::spawn(async move {
                info!("worker {} started", n);
                loop {
                    let job = match queue.dequeue().await {
                        Ok(job) => job,
                        Err(e) => {
                            error!("worker {} dequeue failed: {}", n, e);
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            continue;
                        }
                    };

                    match worker.process(&job.task).await {
                        Ok(TaskOutcome::Completed {
                            source_card_id,
                            new_card_id,
                        }) => {
                            info!(
                                "task {} copied card {} -> {} for {}",
                                job.id, source_card_id, new_card_id, job.task.account_email
                            );
                        }
                        Ok(TaskOutcome::Abandoned(reason)) => {
                            debug!(
                                "task {} abandoned for {}: {}",
                                job.id,
                                job.task.account_email,
                                reason.as_str()
                            );
                        }
                        Err(e) => {
                            error!("task {} failed: {:#}", job.id, e);
                        }
                    }

                    if let Err(e) = queue.complete(job.id).await {
                        error!("completing task {} failed: {}", job.id, e);
                    }
                }
            }));
        }
        join_all(loops).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::{Value, json};
    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::{AbandonReason, TaskOutcome, Worker, mention_matches};
    use crate::config::{DatabaseConfig, TrelloConfig};
    use crate::db::{Account, BoardBinding, DatabaseManager};
    use crate::relay::{EnrichedTask, WebhookEvent};
    use crate::trello::{ApiError, ApiResponse, ApiTransport, TrelloClient};

    #[test_case("hello @bob", "bob", true; "plain mention")]
    #[test_case("hello @bobby", "bob", false; "longer username does not fire")]
    #[test_case("@bob: ping", "bob", true; "mention at start")]
    #[test_case("cc a@bob.com", "bob", false; "email local part is not a mention")]
    #[test_case("(@bob)", "bob", true; "punctuation delimits")]
    #[test_case("no mention here", "bob", false; "absent")]
    #[test_case("ping @bob_2", "bob_2", true; "underscore in username")]
    fn mention_gate(text: &str, username: &str, expected: bool) {
        assert_eq!(mention_matches(text, username), expected);
    }

    struct RecordingTransport {
        responses: Mutex<VecDeque<ApiResponse>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        fn new(responses: Vec<ApiResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ApiTransport for RecordingTransport {
        async fn execute(
            &self,
            method: Method,
            url: &str,
            _body: Option<&Value>,
        ) -> Result<ApiResponse, ApiError> {
            self.calls.lock().push((method.to_string(), url.to_string()));
            Ok(self.responses.lock().pop_front().unwrap_or(ApiResponse {
                status: 500,
                body: json!({"message": "unscripted call"}),
            }))
        }
    }

    fn ok(body: Value) -> ApiResponse {
        ApiResponse { status: 200, body }
    }

    async fn seeded_db(file: &NamedTempFile) -> DatabaseManager {
        let config = DatabaseConfig {
            url: None,
            filename: Some(file.path().to_string_lossy().to_string()),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");

        manager
            .account_store()
            .upsert_account(&Account {
                email: "bob@example.com".to_string(),
                api_key: "k".to_string(),
                api_token: "t".to_string(),
                linked_board_id: Some("UB1".to_string()),
                linked_board_name: Some("bob@example.com".to_string()),
            })
            .await
            .expect("seed account");

        let mut lists = HashMap::new();
        lists.insert("Enquiry In".to_string(), "LL1".to_string());
        lists.insert("Done".to_string(), "LL4".to_string());
        manager
            .board_store()
            .create_binding(&BoardBinding {
                id: 0,
                account_email: "bob@example.com".to_string(),
                board_id: "UB1".to_string(),
                board_name: "bob@example.com".to_string(),
                lists,
            })
            .await
            .expect("seed binding");

        manager
    }

    fn comment_task(text: &str) -> EnrichedTask {
        let event: WebhookEvent = serde_json::from_value(json!({
            "action": {
                "type": "commentCard",
                "data": {
                    "card": {"id": "C1", "name": "Quote request"},
                    "board": {"id": "B1", "name": "Sales"},
                    "text": text
                },
                "member": {"username": "alice"}
            },
            "webhook": {"id": "W1"}
        }))
        .expect("event");
        EnrichedTask {
            event,
            account_email: "bob@example.com".to_string(),
            webhook_id: "W1".to_string(),
            board_id: "B1".to_string(),
            board_name: "Sales".to_string(),
            event_type: "commentCard".to_string(),
            label_id: Some("L1".to_string()),
            label_name: None,
            list_name: None,
        }
    }

    fn worker_with(
        db: DatabaseManager,
        transport: Arc<RecordingTransport>,
    ) -> Worker {
        let client = TrelloClient::with_transport(&TrelloConfig::default(), transport);
        Worker::new(db, Arc::new(client))
    }

    #[tokio::test]
    async fn mention_task_copies_card_and_decorates_it() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![
            ok(json!({"id": "M1", "username": "bob"})),
            ok(json!({"id": "C2"})),
            ok(json!({"id": "A1"})),
            ok(json!([{"id": "L1"}])),
        ]));
        let worker = worker_with(db, transport.clone());

        let outcome = worker
            .process(&comment_task("hey @bob can you quote this"))
            .await
            .expect("process succeeds");

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                source_card_id: "C1".to_string(),
                new_card_id: "C2".to_string(),
            }
        );

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].1.contains("members/me"));
        assert_eq!(calls[1].0, "POST");
        assert!(calls[1].1.contains("idCardSource=C1"));
        assert!(calls[1].1.contains("idList=LL1"));
        assert!(calls[2].1.contains("cards/C2/attachments"));
        assert!(calls[3].1.contains("cards/C2/idLabels"));
    }

    #[tokio::test]
    async fn non_mention_stops_after_the_identity_check() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![ok(
            json!({"id": "M1", "username": "bob"}),
        )]));
        let worker = worker_with(db, transport.clone());

        let outcome = worker
            .process(&comment_task("hey @bobby can you quote this"))
            .await
            .expect("process succeeds");

        assert_eq!(outcome, TaskOutcome::Abandoned(AbandonReason::NotMentioned));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn drifted_event_type_is_abandoned_without_api_calls() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(Vec::new()));
        let worker = worker_with(db, transport.clone());

        let mut task = comment_task("hey @bob");
        task.event_type = "addMemberToCard".to_string();

        let outcome = worker.process(&task).await.expect("process succeeds");
        assert_eq!(
            outcome,
            TaskOutcome::Abandoned(AbandonReason::StaleEventType)
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn alias_typed_delivery_matches_the_stored_canonical_type() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![
            ok(json!({"id": "M1", "username": "bob"})),
            ok(json!({"id": "C2"})),
            ok(json!({"id": "A1"})),
            ok(json!([{"id": "L1"}])),
        ]));
        let worker = worker_with(db, transport);

        let mut task = comment_task("hey @bob can you quote this");
        task.event.action.kind = "Mentioned in a card".to_string();

        let outcome = worker.process(&task).await.expect("process succeeds");
        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                source_card_id: "C1".to_string(),
                new_card_id: "C2".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unknown_account_is_abandoned() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(Vec::new()));
        let worker = worker_with(db, transport);

        let mut task = comment_task("hey @bob");
        task.account_email = "ghost@example.com".to_string();

        let outcome = worker.process(&task).await.expect("process succeeds");
        assert_eq!(
            outcome,
            TaskOutcome::Abandoned(AbandonReason::UnknownAccount)
        );
    }

    #[tokio::test]
    async fn membership_task_requires_the_subscriber_to_be_the_added_member() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![
            ok(json!({"id": "M1", "username": "bob"})),
            ok(json!({"id": "C3"})),
            ok(json!({"id": "A1"})),
            ok(json!([{"id": "L1"}])),
        ]));
        let worker = worker_with(db, transport.clone());

        let event: WebhookEvent = serde_json::from_value(json!({
            "action": {
                "type": "addMemberToCard",
                "data": {
                    "card": {"id": "C1"},
                    "board": {"id": "B1"}
                },
                "member": {"username": "bob"}
            }
        }))
        .expect("event");
        let mut task = comment_task("");
        task.event = event;
        task.event_type = "addMemberToCard".to_string();

        let outcome = worker.process(&task).await.expect("process succeeds");
        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                source_card_id: "C1".to_string(),
                new_card_id: "C3".to_string(),
            }
        );

        // Someone else being added must not fire.
        let transport2 = Arc::new(RecordingTransport::new(vec![ok(
            json!({"id": "M1", "username": "bob"}),
        )]));
        let file2 = NamedTempFile::new().expect("temp sqlite file");
        let worker2 = worker_with(seeded_db(&file2).await, transport2);

        let event: WebhookEvent = serde_json::from_value(json!({
            "action": {
                "type": "addMemberToCard",
                "data": {"card": {"id": "C1"}, "board": {"id": "B1"}},
                "member": {"username": "carol"}
            }
        }))
        .expect("event");
        let mut task = comment_task("");
        task.event = event;
        task.event_type = "addMemberToCard".to_string();

        let outcome = worker2.process(&task).await.expect("process succeeds");
        assert_eq!(outcome, TaskOutcome::Abandoned(AbandonReason::NotAdded));
    }

    #[tokio::test]
    async fn rejected_copy_is_a_hard_stop() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![
            ok(json!({"id": "M1", "username": "bob"})),
            ApiResponse {
                status: 400,
                body: json!({"message": "invalid list"}),
            },
        ]));
        let worker = worker_with(db, transport.clone());

        let outcome = worker
            .process(&comment_task("hey @bob"))
            .await
            .expect("process succeeds");

        assert_eq!(outcome, TaskOutcome::Abandoned(AbandonReason::CopyFailed));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn label_resolved_by_name_when_no_id_is_stored() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = seeded_db(&file).await;
        let transport = Arc::new(RecordingTransport::new(vec![
            ok(json!({"id": "M1", "username": "bob"})),
            ok(json!({"id": "C2"})),
            ok(json!({"id": "A1"})),
            ok(json!([
                {"id": "L8", "name": "Urgent", "color": "red"},
                {"id": "L9", "name": "Later", "color": "blue"}
            ])),
            ok(json!({})),
        ]));
        let worker = worker_with(db, transport.clone());

        let mut task = comment_task("hey @bob");
        task.label_id = None;
        task.label_name = Some("Urgent".to_string());

        let outcome = worker.process(&task).await.expect("process succeeds");
        assert!(matches!(outcome, TaskOutcome::Completed { .. }));

        let calls = transport.calls();
        assert!(calls[3].1.contains("boards/UB1/labels"));
        assert!(calls[4].1.contains("cards/C2/idLabels"));
    }
}
