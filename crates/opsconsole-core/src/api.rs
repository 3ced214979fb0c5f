use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ClientError, ClientResult};
use crate::http::Transport;
use crate::state::Message;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub show_debug: bool,
}

/// Response of `GET /api/chat/state`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBatch {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub has_actions: bool,
    #[serde(default)]
    pub actions_json: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub prompt_updated: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub has_actions: bool,
    #[serde(default)]
    pub actions_json: Option<String>,
    #[serde(default)]
    pub limit_reached: bool,
    #[serde(default)]
    pub debug: Option<Value>,
}

/// Response of `POST /api/chat/action/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionOutcome {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.success != Some(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDraft {
    #[serde(default)]
    pub current_prompt: Option<String>,
}

/// Typed access to the console endpoints.
#[derive(Clone)]
pub struct ConsoleApi {
    transport: Arc<dyn Transport>,
}

impl ConsoleApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn user_settings(&self) -> ClientResult<UserSettings> {
        self.call(Method::GET, "/api/user/id", None).await
    }

    pub async fn chat_state(&self, since: u64) -> ClientResult<StateBatch> {
        self.call(Method::GET, &format!("/api/chat/state?since={}", since), None)
            .await
    }

    pub async fn send(&self, text: &str) -> ClientResult<SendResponse> {
        self.call(Method::POST, "/api/chat/send", Some(json!({ "text": text })))
            .await
    }

    pub async fn execute_action(&self, action_id: &str) -> ClientResult<ActionOutcome> {
        let path = format!("/api/chat/action/{}", urlencoding::encode(action_id));
        self.call(Method::POST, &path, None).await
    }

    pub async fn new_chat(&self) -> ClientResult<()> {
        self.ack(Method::POST, "/api/chat/new", None).await
    }

    pub async fn start_prompt_update(&self) -> ClientResult<PromptDraft> {
        self.call(Method::POST, "/api/prompt/start-update", None).await
    }

    pub async fn submit_prompt(&self, text: &str) -> ClientResult<()> {
        self.ack(Method::POST, "/api/prompt/submit", Some(json!({ "text": text })))
            .await
    }

    pub async fn set_debug(&self, show_debug: bool) -> ClientResult<()> {
        self.ack(
            Method::POST,
            "/api/user/settings/debug",
            Some(json!({ "showDebug": show_debug })),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<T> {
        let value = self.transport.request(method, path, body).await?;
        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Requests whose response body carries nothing we use.
    async fn ack(&self, method: Method, path: &str, body: Option<Value>) -> ClientResult<()> {
        self.transport.request(method, path, body).await.map(|_| ())
    }
}
