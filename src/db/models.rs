use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An end-user account holding Trello credentials. Empty credentials mean
/// the account exists but is not linked to Trello yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub api_key: String,
    pub api_token: String,
    pub linked_board_id: Option<String>,
    pub linked_board_name: Option<String>,
}

impl Account {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_token.is_empty()
    }
}

/// A stored rule linking an account, a board, an event type and optional
/// label/list targeting. At most one row per (account, webhook, event type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberPreference {
    pub id: i64,
    pub account_email: String,
    pub board_id: String,
    pub board_name: String,
    pub webhook_id: String,
    pub event_type: String,
    pub label_id: Option<String>,
    pub label_name: Option<String>,
    pub list_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The per-account destination board plus a logical-list-name to Trello
/// list-id map ("Enquiry In", "Todo", "Doing", "Done").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardBinding {
    pub id: i64,
    pub account_email: String,
    pub board_id: String,
    pub board_name: String,
    pub lists: HashMap<String, String>,
}

/// A Trello webhook we registered for a board, one per board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredWebhook {
    pub id: i64,
    pub board_id: String,
    pub webhook_id: String,
    pub callback_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
        }
    }
}

/// One durable queue row. The payload is a serialized enriched task; the row
/// id is the only identity a task has.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub id: i64,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}
