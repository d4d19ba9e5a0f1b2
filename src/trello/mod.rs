use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::TrelloConfig;
use crate::db::Account;

pub mod rate_limit;

pub use self::rate_limit::RateLimiter;

/// Per-account Trello key/token pair, passed as query parameters on every
/// call. Built from an account only when both halves are non-empty.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_token: String,
}

impl Credentials {
    pub fn from_account(account: &Account) -> Option<Self> {
        if account.has_credentials() {
            Some(Self {
                api_key: account.api_key.clone(),
                api_token: account.api_token.clone(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid trello url: {0}")]
    InvalidUrl(String),
    #[error("trello transport error: {0}")]
    Transport(String),
    #[error("trello rate limit persisted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("unexpected trello response shape: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Trello error bodies usually carry a `message` field; fall back to the
    /// raw body text.
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| self.body.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloMember {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloBoard {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lists: Vec<TrelloList>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloList {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloCard {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloLabel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloWebhookInfo {
    pub id: String,
    #[serde(rename = "idModel")]
    pub id_model: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
}

/// Transport seam for the single-call path; production uses reqwest, tests
/// substitute a scripted transport.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(ApiResponse { status, body })
    }
}

/// Rate-limited Trello REST client with bounded retry on 429. Non-429 error
/// statuses are handed back untouched; this layer does not interpret the
/// business meaning of a response.
pub struct TrelloClient {
    base_url: String,
    transport: Arc<dyn ApiTransport>,
    limiter: RateLimiter,
    max_attempts: u32,
    base_backoff: Duration,
}

impl TrelloClient {
    pub fn new(config: &TrelloConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(
            config.request_timeout_secs,
        ))?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: &TrelloConfig, transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            transport,
            limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_seconds),
            ),
            max_attempts: config.retry.max_attempts,
            base_backoff: Duration::from_millis(config.retry.base_backoff_ms),
        }
    }

    pub async fn call(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.limiter.wait().await;

        for attempt in 0..self.max_attempts {
            let response = self.transport.execute(method.clone(), url, body).await?;
            if response.status != 429 {
                return Ok(response);
            }

            if attempt + 1 < self.max_attempts {
                let backoff = self.base_backoff * 2u32.pow(attempt);
                debug!(
                    "trello returned 429, backing off {:?} attempt={}",
                    backoff,
                    attempt + 1
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ApiError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }

    fn endpoint(
        &self,
        path: &str,
        creds: &Credentials,
        params: &[(&str, &str)],
    ) -> Result<String, ApiError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &creds.api_key);
            pairs.append_pair("token", &creds.api_token);
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    fn decode_success<T: DeserializeOwned>(
        response: ApiResponse,
        what: &str,
    ) -> Result<Option<T>, ApiError> {
        if !response.is_success() {
            warn!(
                "trello {} failed status={} body={}",
                what, response.status, response.body
            );
            return Ok(None);
        }
        response.json_as().map(Some)
    }

    /// The member that owns the supplied credentials, or None when Trello
    /// rejects them.
    pub async fn authenticated_member(
        &self,
        creds: &Credentials,
    ) -> Result<Option<TrelloMember>, ApiError> {
        let url = self.endpoint("members/me", creds, &[])?;
        let response = self.call(Method::GET, &url, None).await?;
        Self::decode_success(response, "members/me")
    }

    pub async fn member_boards(
        &self,
        creds: &Credentials,
    ) -> Result<Option<Vec<TrelloBoard>>, ApiError> {
        let url = self.endpoint("members/me/boards", creds, &[("lists", "open")])?;
        let response = self.call(Method::GET, &url, None).await?;
        Self::decode_success(response, "members/me/boards")
    }

    pub async fn board_lists(
        &self,
        creds: &Credentials,
        board_id: &str,
    ) -> Result<Option<Vec<TrelloList>>, ApiError> {
        let url = self.endpoint(&format!("boards/{}/lists", board_id), creds, &[])?;
        let response = self.call(Method::GET, &url, None).await?;
        Self::decode_success(response, "board lists")
    }

    pub async fn board_labels(
        &self,
        creds: &Credentials,
        board_id: &str,
    ) -> Result<Option<Vec<TrelloLabel>>, ApiError> {
        let url = self.endpoint(&format!("boards/{}/labels", board_id), creds, &[])?;
        let response = self.call(Method::GET, &url, None).await?;
        Self::decode_success(response, "board labels")
    }

    pub async fn create_board(
        &self,
        creds: &Credentials,
        name: &str,
    ) -> Result<Option<TrelloBoard>, ApiError> {
        let url = self.endpoint("boards", creds, &[("name", name), ("defaultLists", "false")])?;
        let response = self.call(Method::POST, &url, None).await?;
        Self::decode_success(response, "create board")
    }

    pub async fn create_list(
        &self,
        creds: &Credentials,
        board_id: &str,
        name: &str,
    ) -> Result<Option<TrelloList>, ApiError> {
        let url = self.endpoint("lists", creds, &[("name", name), ("idBoard", board_id)])?;
        let response = self.call(Method::POST, &url, None).await?;
        Self::decode_success(response, "create list")
    }

    /// Copy a card into a destination list.
    pub async fn copy_card(
        &self,
        creds: &Credentials,
        source_card_id: &str,
        dest_list_id: &str,
    ) -> Result<Option<TrelloCard>, ApiError> {
        let url = self.endpoint(
            "cards",
            creds,
            &[("idCardSource", source_card_id), ("idList", dest_list_id)],
        )?;
        let response = self.call(Method::POST, &url, None).await?;
        Self::decode_success(response, "copy card")
    }

    /// Attach a URL to a card. Returns whether Trello accepted it.
    pub async fn attach_url(
        &self,
        creds: &Credentials,
        card_id: &str,
        attachment_url: &str,
        name: &str,
    ) -> Result<bool, ApiError> {
        let url = self.endpoint(&format!("cards/{}/attachments", card_id), creds, &[])?;
        let body = serde_json::json!({ "url": attachment_url, "name": name });
        let response = self.call(Method::POST, &url, Some(&body)).await?;
        Ok(response.is_success())
    }

    pub async fn add_label_to_card(
        &self,
        creds: &Credentials,
        card_id: &str,
        label_id: &str,
    ) -> Result<bool, ApiError> {
        let url = self.endpoint(&format!("cards/{}/idLabels", card_id), creds, &[])?;
        let body = serde_json::json!({ "value": label_id });
        let response = self.call(Method::POST, &url, Some(&body)).await?;
        Ok(response.is_success())
    }

    /// Register a webhook for a board. The raw response is returned so the
    /// caller can surface Trello's message on rejection.
    pub async fn create_webhook(
        &self,
        creds: &Credentials,
        callback_url: &str,
        board_id: &str,
        description: &str,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(
            "webhooks",
            creds,
            &[
                ("callbackURL", callback_url),
                ("idModel", board_id),
                ("description", description),
            ],
        )?;
        self.call(Method::POST, &url, None).await
    }

    pub async fn delete_webhook(
        &self,
        creds: &Credentials,
        webhook_id: &str,
    ) -> Result<bool, ApiError> {
        let url = self.endpoint(&format!("webhooks/{}", webhook_id), creds, &[])?;
        let response = self.call(Method::DELETE, &url, None).await?;
        Ok(response.is_success())
    }

    pub async fn token_webhooks(&self, creds: &Credentials) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(
            &format!("tokens/{}/webhooks", creds.api_token),
            creds,
            &[],
        )?;
        self.call(Method::GET, &url, None).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::{Value, json};
    use tokio::time::Instant;

    use super::{ApiError, ApiResponse, ApiTransport, Credentials, TrelloClient};
    use crate::config::TrelloConfig;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<ApiResponse>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<ApiResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ApiTransport for ScriptedTransport {
        async fn execute(
            &self,
            _method: Method,
            url: &str,
            _body: Option<&Value>,
        ) -> Result<ApiResponse, ApiError> {
            self.calls.lock().push(url.to_string());
            Ok(self
                .responses
                .lock()
                .pop_front()
                .unwrap_or(ApiResponse {
                    status: 429,
                    body: json!({}),
                }))
        }
    }

    fn throttled() -> ApiResponse {
        ApiResponse {
            status: 429,
            body: json!({}),
        }
    }

    fn ok(body: Value) -> ApiResponse {
        ApiResponse { status: 200, body }
    }

    fn client_with(transport: Arc<ScriptedTransport>) -> TrelloClient {
        TrelloClient::with_transport(&TrelloConfig::default(), transport)
    }

    fn creds() -> Credentials {
        Credentials {
            api_key: "k".to_string(),
            api_token: "t".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_throttled_calls_with_doubling_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            throttled(),
            throttled(),
            ok(json!({"id": "M1", "username": "bob"})),
        ]));
        let client = client_with(transport.clone());

        let start = Instant::now();
        let member = client
            .authenticated_member(&creds())
            .await
            .expect("call succeeds")
            .expect("member decoded");

        assert_eq!(member.username, "bob");
        assert_eq!(transport.call_count(), 3);
        // 1s after the first 429, 2s after the second.
        assert_eq!(Instant::now().duration_since(start), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_ceiling() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            throttled(),
            throttled(),
            throttled(),
            throttled(),
        ]));
        let client = client_with(transport.clone());

        let result = client
            .call(Method::GET, "https://api.trello.com/1/members/me", None)
            .await;

        assert!(matches!(
            result,
            Err(ApiError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn non_throttle_errors_pass_through_untouched() {
        let transport = Arc::new(ScriptedTransport::new(vec![ApiResponse {
            status: 404,
            body: json!({"message": "model not found"}),
        }]));
        let client = client_with(transport.clone());

        let response = client
            .call(Method::GET, "https://api.trello.com/1/cards/x", None)
            .await
            .expect("call completes");

        assert_eq!(response.status, 404);
        assert_eq!(response.error_message(), "model not found");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_member_lookup_decodes_to_none() {
        let transport = Arc::new(ScriptedTransport::new(vec![ApiResponse {
            status: 401,
            body: json!("invalid token"),
        }]));
        let client = client_with(transport);

        let member = client
            .authenticated_member(&creds())
            .await
            .expect("call completes");
        assert!(member.is_none());
    }

    #[test]
    fn endpoint_appends_credentials_and_params() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let client = client_with(transport);

        let url = client
            .endpoint("cards", &creds(), &[("idCardSource", "C1"), ("idList", "LL1")])
            .expect("url builds");

        assert!(url.starts_with("https://api.trello.com/1/cards?"));
        assert!(url.contains("key=k"));
        assert!(url.contains("token=t"));
        assert!(url.contains("idCardSource=C1"));
        assert!(url.contains("idList=LL1"));
    }
}
