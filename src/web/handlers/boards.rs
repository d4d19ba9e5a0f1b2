use std::collections::HashMap;

use salvo::prelude::*;
use serde_json::json;
use tracing::info;

use crate::db::{Account, BoardBinding};
use crate::relay::worker::INBOX_LIST;
use crate::web::web_state;

use super::{render_error, require_account, require_credentials};

/// Lists created on a fresh destination board, in display order.
const DEFAULT_LISTS: [&str; 4] = [INBOX_LIST, "Todo", "Doing", "Done"];

#[handler]
pub async fn list_boards(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };

    match web_state().trello.member_boards(&creds).await {
        Ok(Some(boards)) => {
            res.render(Json(json!({ "boards": boards, "count": boards.len() })));
        }
        Ok(None) => {
            render_error(res, StatusCode::BAD_GATEWAY, "trello rejected the request");
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

/// Labels available on the account's linked destination board.
#[handler]
pub async fn list_labels(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };
    let Some(board_id) = account.linked_board_id.as_deref() else {
        render_error(res, StatusCode::CONFLICT, "account has no linked board");
        return;
    };

    match web_state().trello.board_labels(&creds, board_id).await {
        Ok(Some(labels)) => {
            res.render(Json(json!({ "labels": labels, "count": labels.len() })));
        }
        Ok(None) => {
            render_error(res, StatusCode::BAD_GATEWAY, "trello rejected the request");
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

/// Idempotent destination-board provisioning. An existing binding is
/// returned as-is; an account linked to a board without a binding gets the
/// binding rebuilt from the board's live lists; otherwise a fresh board is
/// created with the default lists.
#[handler]
pub async fn setup_board(req: &mut Request, res: &mut Response) {
    let Some(account) = require_account(req, res).await else {
        return;
    };
    let Some(creds) = require_credentials(res, &account) else {
        return;
    };
    let state = web_state();

    match state.db_manager.board_store().get_binding(&account.email).await {
        Ok(Some(binding)) => {
            res.render(Json(json!({ "created": false, "binding": binding })));
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

    let (board_id, board_name, lists, created) = if let Some(board_id) =
        account.linked_board_id.clone()
    {
        let fetched = match state.trello.board_lists(&creds, &board_id).await {
            Ok(Some(lists)) => lists,
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
        };
        let lists: HashMap<String, String> =
            fetched.into_iter().map(|l| (l.name, l.id)).collect();
        let name = account
            .linked_board_name
            .clone()
            .unwrap_or_else(|| account.email.clone());
        (board_id, name, lists, false)
    } else {
        let board = match state.trello.create_board(&creds, &account.email).await {
            Ok(Some(board)) => board,
            Ok(None) => {
                render_error(res, StatusCode::BAD_GATEWAY, "board creation was rejected");
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
        };

        let mut lists = HashMap::new();
        for name in DEFAULT_LISTS {
            match state.trello.create_list(&creds, &board.id, name).await {
                Ok(Some(list)) => {
                    lists.insert(list.name, list.id);
                }
                Ok(None) => {
                    render_error(
                        res,
                        StatusCode::BAD_GATEWAY,
                        &format!("list '{}' creation was rejected", name),
                    );
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

        let relinked = Account {
            linked_board_id: Some(board.id.clone()),
            linked_board_name: Some(board.name.clone()),
            ..account.clone()
        };
        if let Err(err) = state.db_manager.account_store().upsert_account(&relinked).await {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }

        info!("created destination board {} for {}", board.id, account.email);
        (board.id, board.name, lists, true)
    };

    let binding = BoardBinding {
        id: 0,
        account_email: account.email.clone(),
        board_id,
        board_name,
        lists,
    };
    match state.db_manager.board_store().create_binding(&binding).await {
        Ok(()) => {
            if created {
                res.status_code(StatusCode::CREATED);
            }
            res.render(Json(json!({ "created": created, "binding": binding })));
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
