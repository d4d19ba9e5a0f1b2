use salvo::prelude::*;

use crate::web::handlers::{
    accounts::{create_account, get_account, verify_credentials},
    boards::{list_boards, list_labels, setup_board},
    health::health_check,
    metrics::metrics,
    preferences::{delete_preference, list_preferences, save_preference},
    webhook::{receive_webhook, webhook_handshake},
    webhooks::{list_webhooks, register_webhook},
};

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics))
        .push(
            Router::with_path("api")
                .push(
                    Router::with_path("trello-webhook")
                        .get(webhook_handshake)
                        .head(webhook_handshake)
                        .post(receive_webhook),
                )
                .push(Router::with_path("accounts").post(create_account))
                .push(
                    Router::with_path("accounts/{email}")
                        .get(get_account)
                        .push(Router::with_path("verify").post(verify_credentials))
                        .push(Router::with_path("boards").get(list_boards))
                        .push(Router::with_path("labels").get(list_labels))
                        .push(Router::with_path("board").post(setup_board))
                        .push(
                            Router::with_path("webhooks")
                                .get(list_webhooks)
                                .post(register_webhook),
                        )
                        .push(
                            Router::with_path("preferences")
                                .get(list_preferences)
                                .post(save_preference),
                        )
                        .push(
                            Router::with_path("preferences/{id}").delete(delete_preference),
                        ),
                ),
        )
}
