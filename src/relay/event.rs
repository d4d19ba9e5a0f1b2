use serde::{Deserialize, Serialize};

use crate::db::SubscriberPreference;

/// Canonical Trello action type for a subscriber-facing alias. Already
/// canonical inputs pass through untouched, so the mapping is idempotent.
pub fn normalize_event_type(raw: &str) -> &str {
    match raw {
        "Mentioned in a card" => "commentCard",
        "Added to a card" => "addMemberToCard",
        other => other,
    }
}

/// Incoming webhook envelope. Trello sends far more than this; unknown
/// fields are ignored on deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub action: EventAction,
    #[serde(default)]
    pub webhook: Option<WebhookRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: ActionData,
    #[serde(default)]
    pub member: Option<MemberRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub card: Option<CardRef>,
    #[serde(default)]
    pub board: Option<BoardRef>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRef {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRef {
    pub id: String,
}

impl WebhookEvent {
    pub fn board(&self) -> Option<&BoardRef> {
        self.action.data.board.as_ref()
    }

    pub fn card_id(&self) -> Option<&str> {
        self.action.data.card.as_ref().map(|c| c.id.as_str())
    }

    pub fn webhook_id(&self) -> Option<&str> {
        self.webhook.as_ref().map(|w| w.id.as_str())
    }
}

/// A webhook event joined with one matching subscriber preference. This is
/// the unit of work the queue carries and a worker consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTask {
    pub event: WebhookEvent,
    pub account_email: String,
    pub webhook_id: String,
    pub board_id: String,
    pub board_name: String,
    pub event_type: String,
    pub label_id: Option<String>,
    pub label_name: Option<String>,
    pub list_name: Option<String>,
}

impl EnrichedTask {
    pub fn new(event: WebhookEvent, preference: &SubscriberPreference) -> Self {
        Self {
            event,
            account_email: preference.account_email.clone(),
            webhook_id: preference.webhook_id.clone(),
            board_id: preference.board_id.clone(),
            board_name: preference.board_name.clone(),
            event_type: preference.event_type.clone(),
            label_id: preference.label_id.clone(),
            label_name: preference.label_name.clone(),
            list_name: preference.list_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::{WebhookEvent, normalize_event_type};

    #[test_case("Mentioned in a card", "commentCard"; "mention alias")]
    #[test_case("Added to a card", "addMemberToCard"; "membership alias")]
    #[test_case("commentCard", "commentCard"; "canonical comment passes through")]
    #[test_case("addMemberToCard", "addMemberToCard"; "canonical membership passes through")]
    #[test_case("updateCard", "updateCard"; "unrelated type passes through")]
    fn normalization_maps_aliases_and_is_idempotent(raw: &str, expected: &str) {
        assert_eq!(normalize_event_type(raw), expected);
        assert_eq!(normalize_event_type(expected), expected);
    }

    #[test]
    fn deserializes_a_comment_payload() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "action": {
                "type": "commentCard",
                "data": {
                    "card": {"id": "C1", "name": "Quote request"},
                    "board": {"id": "B1", "name": "Sales"},
                    "text": "hey @bob can you take this"
                },
                "member": {"username": "alice"}
            },
            "webhook": {"id": "W1"},
            "model": {"ignored": true}
        }))
        .expect("payload deserializes");

        assert_eq!(event.action.kind, "commentCard");
        assert_eq!(event.card_id(), Some("C1"));
        assert_eq!(event.board().map(|b| b.id.as_str()), Some("B1"));
        assert_eq!(event.webhook_id(), Some("W1"));
        assert_eq!(
            event.action.data.text.as_deref(),
            Some("hey @bob can you take this")
        );
    }

    #[test]
    fn tolerates_sparse_action_data() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "action": {"type": "updateBoard"}
        }))
        .expect("sparse payload deserializes");

        assert!(event.board().is_none());
        assert!(event.card_id().is_none());
        assert!(event.webhook_id().is_none());
    }
}
