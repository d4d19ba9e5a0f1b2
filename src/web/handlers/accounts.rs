use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::db::Account;
use crate::web::web_state;

use super::{render_error, require_account, require_credentials};

#[derive(Deserialize)]
struct CreateAccountRequest {
    email: String,
    api_key: String,
    api_token: String,
}

#[handler]
pub async fn create_account(req: &mut Request, res: &mut Response) {
    let body: CreateAccountRequest = match req.parse_json().await {
        Ok(body) => body,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid account payload: {}", err),
            );
            return;
        }
    };
    if body.email.is_empty() {
        render_error(res, StatusCode::BAD_REQUEST, "email must not be empty");
        return;
    }

    // Re-registering overwrites credentials but keeps any linked board.
    let existing = match web_state()
        .db_manager
        .account_store()
        .get_account(&body.email)
        .await
    {
        Ok(existing) => existing,
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }
    };

    let account = Account {
        email: body.email,
        api_key: body.api_key,
        api_token: body.api_token,
        linked_board_id: existing.as_ref().and_then(|a| a.linked_board_id.clone()),
        linked_board_name: existing.as_ref().and_then(|a| a.linked_board_name.clone()),
    };

    match web_state()
        .db_manager
        .account_store()
        .upsert_account(&account)
        .await
    {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "ok": true, "email": account.email })));
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
pub async fn get_account(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };

    // Credentials are never echoed back.
    res.render(Json(json!({
        "email": account.email,
        "has_credentials": account.has_credentials(),
        "linked_board_id": account.linked_board_id,
        "linked_board_name": account.linked_board_name,
    })));
}

#[handler]
pub async fn verify_credentials(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };

    match web_state().trello.authenticated_member(&creds).await {
        Ok(Some(member)) => {
            res.render(Json(json!({ "valid": true, "member": member })));
        }
        Ok(None) => {
            res.render(Json(json!({ "valid": false })));
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
