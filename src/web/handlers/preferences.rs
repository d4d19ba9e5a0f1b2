use chrono::Utc;
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::db::SubscriberPreference;
use crate::relay::normalize_event_type;
use crate::web::web_state;

use super::{render_error, require_account, require_credentials};

#[derive(Deserialize)]
struct SavePreferenceRequest {
    board_id: String,
    #[serde(default)]
    board_name: String,
    webhook_id: String,
    event_type: String,
    #[serde(default)]
    label_id: Option<String>,
    #[serde(default)]
    label_name: Option<String>,
    #[serde(default)]
    list_name: Option<String>,
}

/// Create or update the subscription for (account, webhook, event type).
/// The event type is stored canonically; a label id is checked against the
/// account's linked board before it is accepted.
#[handler]
pub async fn save_preference(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let body: SavePreferenceRequest = match req.parse_json().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid preference payload: {}", err),
            );
            return;
        }
    };
    if body.board_id.is_empty() || body.webhook_id.is_empty() || body.event_type.is_empty() {
        render_error(
            res,
            StatusCode::BAD_REQUEST,
            "board_id, webhook_id and event_type must not be empty",
        );
        return;
    }
    let state = web_state();

    if let (Some(label_id), Some(linked_board)) =
        (body.label_id.as_deref(), account.linked_board_id.as_deref())
    {
        let Some(creds) = require_credentials(res, &account) else {
            return;
        };
        match state.trello.board_labels(&creds, linked_board).await {
            Ok(Some(labels)) if labels.iter().any(|l| l.id == label_id) => {}
            Ok(Some(_)) => {
                render_error(
                    res,
                    StatusCode::BAD_REQUEST,
                    "label_id does not exist on the linked board",
                );
                return;
            }
            Ok(None) => {
                render_error(res, StatusCode::BAD_GATEWAY, "linked board is unreachable");
                return;
            }
            Err(err) => {
                render_error(
                    res,
                    StatusCode::BAD_GATEWAY,
                    &format!("trello error: {}", err),
                );
                return;
            }
        }
    }

    let preference = SubscriberPreference {
        id: 0,
        account_email: account.email.clone(),
        board_id: body.board_id,
        board_name: body.board_name,
        webhook_id: body.webhook_id,
        event_type: normalize_event_type(&body.event_type).to_string(),
        label_id: body.label_id,
        label_name: body.label_name,
        list_name: body.list_name,
        created_at: Utc::now(),
    };

    match state
        .db_manager
        .preference_store()
        .upsert_preference(&preference)
        .await
    {
        Ok(id) => {
            info!(
                "saved preference id={} account={} event_type={}",
                id, preference.account_email, preference.event_type
            );
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "ok": true, "id": id })));
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

#[handler]
pub async fn list_preferences(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };

    match web_state()
        .db_manager
        .preference_store()
        .list_for_account(&account.email)
        .await
    {
        Ok(preferences) => {
            res.render(Json(json!({
                "preferences": preferences,
                "count": preferences.len(),
            })));
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

/// Delete a preference by row id, or by webhook id when the path segment is
/// not numeric. When the webhook has no remaining subscribers the Trello
/// registration is torn down as well.
#[handler]
pub async fn delete_preference(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let key = match req.param::<String>("id") {
        Some(v) if !v.is_empty() => v,
        _ => {
            render_error(res, StatusCode::BAD_REQUEST, "missing preference id");
            return;
        }
    };
    let state = web_state();
    let store = state.db_manager.preference_store();

    let preference = match key.parse::<i64>() {
        Ok(id) => store.get_for_account(id, &account.email).await,
        Err(_) => store.find_by_webhook_for_account(&key, &account.email).await,
    };
    let preference = match preference {
        Ok(Some(preference)) => preference,
        Ok(None) => {
            render_error(res, StatusCode::NOT_FOUND, "preference not found");
            return;
        }
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }
    };

    if let Err(err) = store.delete_preference(preference.id).await {
        render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        );
        return;
    }

    let remaining = match store.count_for_webhook(&preference.webhook_id).await {
        Ok(remaining) => remaining,
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }
    };

    // Last subscriber gone: the webhook serves nobody, so tear it down.
    // Trello-side failure is logged, not surfaced; the local delete stands.
    if remaining == 0 {
        if let Some(creds) = crate::trello::Credentials::from_account(&account) {
            match state.trello.delete_webhook(&creds, &preference.webhook_id).await {
                Ok(true) => {
                    info!("deleted trello webhook {}", preference.webhook_id);
                }
                Ok(false) => {
                    warn!(
                        "trello refused to delete webhook {}",
                        preference.webhook_id
                    );
                }
                Err(err) => {
                    warn!(
                        "deleting trello webhook {} failed: {}",
                        preference.webhook_id, err
                    );
                }
            }
        }
        if let Err(err) = state
            .db_manager
            .webhook_store()
            .delete_by_webhook_id(&preference.webhook_id)
            .await
        {
            warn!(
                "removing webhook registration {} failed: {}",
                preference.webhook_id, err
            );
        }
    }

    res.render(Json(json!({
        "ok": true,
        "id": preference.id,
        "webhook_removed": remaining == 0,
    })));
}
