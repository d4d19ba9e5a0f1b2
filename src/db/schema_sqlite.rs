use diesel::table;

table! {
    accounts (email) {
        email -> Text,
        api_key -> Text,
        api_token -> Text,
        linked_board_id -> Nullable<Text>,
        linked_board_name -> Nullable<Text>,
    }
}

table! {
    subscriber_preferences (id) {
        id -> Integer,
        account_email -> Text,
        board_id -> Text,
        board_name -> Text,
        webhook_id -> Text,
        event_type -> Text,
        label_id -> Nullable<Text>,
        label_name -> Nullable<Text>,
        list_name -> Nullable<Text>,
        created_at -> Text,
    }
}

table! {
    board_bindings (id) {
        id -> Integer,
        account_email -> Text,
        board_id -> Text,
        board_name -> Text,
        lists -> Text,
    }
}

table! {
    registered_webhooks (id) {
        id -> Integer,
        board_id -> Text,
        webhook_id -> Text,
        callback_url -> Text,
        created_at -> Text,
    }
}

table! {
    queued_tasks (id) {
        id -> Integer,
        payload -> Text,
        status -> Text,
        attempts -> Integer,
        created_at -> Text,
        claimed_at -> Nullable<Text>,
    }
}
