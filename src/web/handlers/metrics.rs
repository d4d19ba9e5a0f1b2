use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

#[handler]
pub async fn metrics(res: &mut Response) {
    let state = web_state();
    let uptime_seconds = state.started_at.elapsed().as_secs();
    let queue_depth = state.queue.depth().await.unwrap_or(-1);

    let metrics_payload = json!({
        "relay": {
            "status": "running",
            "uptime_seconds": uptime_seconds,
            "version": env!("CARGO_PKG_VERSION"),
            "queue_depth": queue_depth,
            "workers": state.config.queue.workers,
        }
    });

    res.render(Json(metrics_payload));
}
