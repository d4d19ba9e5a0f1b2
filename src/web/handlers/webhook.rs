use salvo::prelude::*;
use serde_json::json;
use tracing::{debug, error};

use crate::relay::{DispatchOutcome, WebhookEvent};
use crate::web::web_state;

use super::render_error;

/// Trello probes the callback URL with HEAD/GET before it will register a
/// webhook. Any 2xx satisfies the check; a challenge parameter is echoed
/// back when one is sent.
#[handler]
pub async fn webhook_handshake(req: &mut Request, res: &mut Response) {
    match req.query::<String>("challenge") {
        Some(challenge) => {
            res.render(Json(json!({ "ok": true, "challenge": challenge })));
        }
        None => {
            res.render(Json(json!({ "ok": true })));
        }
    }
}

/// Webhook deliveries are acknowledged with 200 whenever the payload could
/// be read, including events we ignore or fail to process. Trello disables
/// webhooks whose callback keeps failing; acceptance decisions belong to
/// the dispatcher, not the HTTP status.
#[handler]
pub async fn receive_webhook(req: &mut Request, res: &mut Response) {
    let body = match req.payload().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("unreadable body: {}", err),
            );
            return;
        }
    };

    if body.is_empty() {
        debug!("empty webhook delivery acknowledged");
        res.render(Json(json!({ "status": "ignored", "reason": "empty payload" })));
        return;
    }

    let event: WebhookEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid webhook payload: {}", err),
            );
            return;
        }
    };

    match web_state().dispatcher.handle(event).await {
        Ok(DispatchOutcome::Queued {
            event_type,
            users_processed,
        }) => {
            res.render(Json(json!({
                "status": "queued",
                "event_type": event_type,
                "users_processed": users_processed,
            })));
        }
        Ok(DispatchOutcome::Ignored { reason }) => {
            res.render(Json(json!({ "status": "ignored", "reason": reason })));
        }
        Err(err) => {
            error!("webhook dispatch failed: {:#}", err);
            res.render(Json(json!({ "status": "failed" })));
        }
    }
}
