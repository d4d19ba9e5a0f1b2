use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

use super::render_error;

#[handler]
pub async fn health_check(res: &mut Response) {
    match web_state().db_manager.ping().await {
        Ok(()) => {
            res.render(Json(json!({ "status": "healthy" })));
        }
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database unavailable: {}", err),
            );
        }
    }
}
