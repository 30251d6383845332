use crate::api::UserDirectory;
use crate::runtime::{ChatClient, ChatError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// The parts of a Slack user record authorization looks at
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_app_user: bool,
}

impl SlackUser {
    pub fn is_automated(&self) -> bool {
        self.is_bot || self.is_app_user
    }
}

/// Slack Web API client authenticated with a bot token
#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        Self::with_base_url(token, timeout, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        token: impl Into<String>,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn api_post(&self, method: &str, body: &Value) -> Result<Value, ChatError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("{method}: {e}")))?;
        check_response(method, response).await
    }

    pub async fn users_info(&self, user_id: &str) -> Result<SlackUser, ChatError> {
        let response = self
            .http
            .get(format!("{}/users.info", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("user", user_id)])
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("users.info: {e}")))?;
        let mut body = check_response("users.info", response).await?;
        serde_json::from_value(body["user"].take())
            .map_err(|e| ChatError::Api(format!("users.info: unexpected user record: {e}")))
    }
}

async fn check_response(method: &str, response: reqwest::Response) -> Result<Value, ChatError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ChatError::Transport(format!("{method}: HTTP {status}: {e}")))?;
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown");
        return Err(ChatError::Api(format!("{method} failed: {error}")));
    }
    Ok(body)
}

fn message_ts(method: &str, body: &Value) -> Result<String, ChatError> {
    body.get("ts")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::Api(format!("{method}: response has no ts")))
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post(&self, channel: &str, text: &str, thread_ts: &str) -> Result<String, ChatError> {
        let body = self
            .api_post(
                "chat.postMessage",
                &json!({"channel": channel, "text": text, "thread_ts": thread_ts}),
            )
            .await?;
        message_ts("chat.postMessage", &body)
    }

    async fn update(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let body = self
            .api_post(
                "chat.update",
                &json!({"channel": channel, "ts": message_id, "text": text}),
            )
            .await?;
        message_ts("chat.update", &body)
    }

    async fn delete(&self, channel: &str, message_id: &str) -> Result<(), ChatError> {
        self.api_post("chat.delete", &json!({"channel": channel, "ts": message_id}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SlackClient {
    async fn lookup(&self, user_id: &str) -> Result<SlackUser, ChatError> {
        self.users_info(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SlackClient {
        SlackClient::with_base_url("xoxb-test", Duration::from_secs(5), &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_post_returns_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(json!({
                "channel": "C1", "text": "⌛ Thinking...", "thread_ts": "1.0"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "channel": "C1", "ts": "1700000000.000200"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let ts = client.post("C1", "⌛ Thinking...", "1.0").await.unwrap();
        assert_eq!(ts, "1700000000.000200");
    }

    #[tokio::test]
    async fn test_not_ok_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.update"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "message_not_found"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.update("C1", "1.0", "hi").await.unwrap_err();
        match err {
            ChatError::Api(message) => assert!(message.contains("message_not_found")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.delete"))
            .and(body_json(json!({"channel": "C1", "ts": "1.0"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).delete("C1", "1.0").await.unwrap();
    }

    #[tokio::test]
    async fn test_users_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", "U1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": {"id": "U1", "name": "alice", "is_bot": false, "profile": {}}
            })))
            .mount(&server)
            .await;

        let user = client_for(&server).users_info("U1").await.unwrap();
        assert_eq!(user.name, "alice");
        assert!(!user.is_automated());
    }
}
