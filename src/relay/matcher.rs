use std::sync::Arc;

use crate::db::{DatabaseError, PreferenceStore, SubscriberPreference};

use super::event::normalize_event_type;

/// Finds the subscriber preferences a webhook event should fan out to,
/// after normalizing subscriber-facing aliases to canonical action types.
pub struct EventMatcher {
    preferences: Arc<dyn PreferenceStore>,
}

impl EventMatcher {
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { preferences }
    }

    pub async fn matches_for(
        &self,
        board_id: &str,
        raw_event_type: &str,
    ) -> Result<Vec<SubscriberPreference>, DatabaseError> {
        let event_type = normalize_event_type(raw_event_type);
        self.preferences
            .find_by_board_and_event(board_id, event_type)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::EventMatcher;
    use crate::db::{DatabaseError, PreferenceStore, SubscriberPreference};

    struct FixedPreferences(Vec<SubscriberPreference>);

    #[async_trait]
    impl PreferenceStore for FixedPreferences {
        async fn find_by_board_and_event(
            &self,
            board_id: &str,
            event_type: &str,
        ) -> Result<Vec<SubscriberPreference>, DatabaseError> {
            Ok(self
                .0
                .iter()
                .filter(|p| p.board_id == board_id && p.event_type == event_type)
                .cloned()
                .collect())
        }

        async fn list_for_account(
            &self,
            _email: &str,
        ) -> Result<Vec<SubscriberPreference>, DatabaseError> {
            unimplemented!()
        }

        async fn get_for_account(
            &self,
            _id: i64,
            _email: &str,
        ) -> Result<Option<SubscriberPreference>, DatabaseError> {
            unimplemented!()
        }

        async fn find_by_webhook_for_account(
            &self,
            _webhook_id: &str,
            _email: &str,
        ) -> Result<Option<SubscriberPreference>, DatabaseError> {
            unimplemented!()
        }

        async fn upsert_preference(
            &self,
            _preference: &SubscriberPreference,
        ) -> Result<i64, DatabaseError> {
            unimplemented!()
        }

        async fn delete_preference(&self, _id: i64) -> Result<(), DatabaseError> {
            unimplemented!()
        }

        async fn count_for_webhook(&self, _webhook_id: &str) -> Result<i64, DatabaseError> {
            unimplemented!()
        }
    }

    fn preference(email: &str, board: &str, event: &str) -> SubscriberPreference {
        SubscriberPreference {
            id: 1,
            account_email: email.to_string(),
            board_id: board.to_string(),
            board_name: "Board".to_string(),
            webhook_id: "W1".to_string(),
            event_type: event.to_string(),
            label_id: None,
            label_name: None,
            list_name: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn aliases_match_preferences_stored_canonically() {
        let matcher = EventMatcher::new(Arc::new(FixedPreferences(vec![
            preference("a@example.com", "B1", "commentCard"),
            preference("b@example.com", "B1", "commentCard"),
            preference("c@example.com", "B2", "commentCard"),
        ])));

        let matched = matcher
            .matches_for("B1", "Mentioned in a card")
            .await
            .expect("lookup succeeds");
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|p| p.board_id == "B1"));
    }

    #[tokio::test]
    async fn unrelated_event_types_match_nothing() {
        let matcher = EventMatcher::new(Arc::new(FixedPreferences(vec![preference(
            "a@example.com",
            "B1",
            "commentCard",
        )])));

        let matched = matcher
            .matches_for("B1", "updateCard")
            .await
            .expect("lookup succeeds");
        assert!(matched.is_empty());
    }
}
