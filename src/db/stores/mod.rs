use async_trait::async_trait;

use super::DatabaseError;
use super::models::{Account, BoardBinding, QueuedTask, RegisteredWebhook, SubscriberPreference};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, email: &str) -> Result<Option<Account>, DatabaseError>;
    async fn upsert_account(&self, account: &Account) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Board- and event-scoped lookup used by the event matcher.
    async fn find_by_board_and_event(
        &self,
        board_id: &str,
        event_type: &str,
    ) -> Result<Vec<SubscriberPreference>, DatabaseError>;
    async fn list_for_account(
        &self,
        email: &str,
    ) -> Result<Vec<SubscriberPreference>, DatabaseError>;
    async fn get_for_account(
        &self,
        id: i64,
        email: &str,
    ) -> Result<Option<SubscriberPreference>, DatabaseError>;
    async fn find_by_webhook_for_account(
        &self,
        webhook_id: &str,
        email: &str,
    ) -> Result<Option<SubscriberPreference>, DatabaseError>;
    /// Insert or update honoring the (account, webhook, event type)
    /// uniqueness invariant. Returns the row id.
    async fn upsert_preference(
        &self,
        preference: &SubscriberPreference,
    ) -> Result<i64, DatabaseError>;
    async fn delete_preference(&self, id: i64) -> Result<(), DatabaseError>;
    async fn count_for_webhook(&self, webhook_id: &str) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn get_binding(&self, email: &str) -> Result<Option<BoardBinding>, DatabaseError>;
    async fn create_binding(&self, binding: &BoardBinding) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn get_by_board(&self, board_id: &str)
    -> Result<Option<RegisteredWebhook>, DatabaseError>;
    async fn create_webhook(&self, webhook: &RegisteredWebhook) -> Result<(), DatabaseError>;
    async fn delete_by_webhook_id(&self, webhook_id: &str) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn enqueue(&self, payload: &str) -> Result<i64, DatabaseError>;
    /// Atomically claim the oldest pending row, marking it running and
    /// bumping its attempt count.
    async fn claim_next(&self) -> Result<Option<QueuedTask>, DatabaseError>;
    async fn complete(&self, id: i64) -> Result<(), DatabaseError>;
    /// Reset rows left running by an interrupted process back to pending.
    /// Returns how many rows were released.
    async fn release_stale(&self) -> Result<usize, DatabaseError>;
    async fn pending_count(&self) -> Result<i64, DatabaseError>;
}
