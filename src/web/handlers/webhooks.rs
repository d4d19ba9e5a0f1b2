use chrono::Utc;
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::RegisteredWebhook;
use crate::trello::TrelloWebhookInfo;
use crate::web::web_state;

use super::{render_error, require_account, require_credentials};

#[derive(Deserialize)]
struct RegisterWebhookRequest {
    board_id: String,
    callback_url: String,
}

/// Register a Trello webhook for a source board. One webhook per board is
/// kept; repeating the call for an already covered board returns the
/// existing registration.
#[handler]
pub async fn register_webhook(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };
    let body: RegisterWebhookRequest = match req.parse_json().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid webhook payload: {}", err),
            );
            return;
        }
    };
    if body.board_id.is_empty() || body.callback_url.is_empty() {
        render_error(
            res,
            StatusCode::BAD_REQUEST,
            "board_id and callback_url must not be empty",
        );
        return;
    }
    let state = web_state();

    match state.db_manager.webhook_store().get_by_board(&body.board_id).await {
        Ok(Some(existing)) => {
            res.render(Json(json!({ "created": false, "webhook": existing })));
            return;
        }
        Ok(None) => {}
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }
    }

    let response = match state
        .trello
        .create_webhook(
            &creds,
            &body.callback_url,
            &body.board_id,
            "board event relay",
        )
        .await
    {
        Ok(response) => response,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_GATEWAY,
                &format!("trello error: {}", err),
            );
            return;
        }
    };
    if !response.is_success() {
        render_error(
            res,
            StatusCode::BAD_GATEWAY,
            &format!("webhook registration rejected: {}", response.error_message()),
        );
        return;
    }
    let info: TrelloWebhookInfo = match response.json_as() {
        Ok(info) => info,
        Err(err) => {
            render_error(res, StatusCode::BAD_GATEWAY, &format!("trello error: {}", err));
            return;
        }
    };

    let webhook = RegisteredWebhook {
        id: 0,
        board_id: body.board_id,
        webhook_id: info.id.clone(),
        callback_url: body.callback_url,
        created_at: Utc::now(),
    };
    match state.db_manager.webhook_store().create_webhook(&webhook).await {
        Ok(()) => {
            info!(
                "registered webhook {} for board {}",
                webhook.webhook_id, webhook.board_id
            );
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "created": true, "webhook": webhook })));
        }
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
        }
    }
}

/// Webhooks Trello currently holds for the account's token.
#[handler]
pub async fn list_webhooks(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };

    match web_state().trello.token_webhooks(&creds).await {
        Ok(response) if response.is_success() => {
            res.render(Json(json!({ "webhooks": response.body })));
        }
        Ok(response) => {
            render_error(
                res,
                StatusCode::BAD_GATEWAY,
                &format!("trello rejected the request: {}", response.error_message()),
            );
        }
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_GATEWAY,
                &format!("trello error: {}", err),
            );
        }
    }
}
