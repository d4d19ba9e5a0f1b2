use salvo::prelude::*;
use serde_json::json;

use crate::db::Account;
use crate::trello::Credentials;
use crate::web::web_state;

pub mod accounts;
pub mod boards;
pub mod health;
pub mod metrics;
pub mod preferences;
pub mod webhook;
pub mod webhooks;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

/// Load the account addressed by the `{email}` path parameter, rendering the
/// appropriate error when it is absent.
pub(crate) async fn require_account(req: &mut Request, res: &mut Response) -> Option<Account> {
    let email = match req.param::<String>("email") {
        Some(v) if !v.is_empty() => v,
        _ => {
            render_error(res, StatusCode::BAD_REQUEST, "missing email path parameter");
            return None;
        }
    };

    match web_state().db_manager.account_store().get_account(&email).await {
        Ok(Some(account)) => Some(account),
        Ok(None) => {
            render_error(res, StatusCode::NOT_FOUND, "account not found");
            None
        }
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            None
        }
    }
}

pub(crate) fn require_credentials(res: &mut Response, account: &Account) -> Option<Credentials> {
    match Credentials::from_account(account) {
        Some(creds) => Some(creds),
        None => {
            render_error(
                res,
                StatusCode::CONFLICT,
                "account has no trello credentials",
            );
            None
        }
    }
}
