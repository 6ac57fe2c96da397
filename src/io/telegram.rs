use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::channel::{with_retries, Channel, ChannelId};
use crate::core::errors::ChannelError;
use crate::core::message::Alert;
use crate::core::state::{SettingsHandle, TelegramSettings};

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// `sendMessage` reply. A missing `ok` counts as no acknowledgement.
#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
    result: Option<SentMessage>,
}

/// Bot API channel. Reads the token and chat id from the live settings on
/// every send.
pub struct TelegramChannel {
    client: Client,
    settings: SettingsHandle,
}

impl TelegramChannel {
    pub fn new(client: Client, settings: SettingsHandle) -> Self {
        Self { client, settings }
    }

    pub async fn send_text(&self, text: &str) -> Result<String, ChannelError> {
        let settings = self.settings.current();
        let telegram = &settings.telegram;
        check_config(telegram)?;
        with_retries(ChannelId::Telegram, telegram.retry(), move || self.post_message(telegram, text)).await
    }

    async fn post_message(&self, telegram: &TelegramSettings, text: &str) -> Result<String, ChannelError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            telegram.api_base.trim_end_matches('/'),
            telegram.bot_token.trim()
        );
        let payload = json!({
            "chat_id": telegram.chat_id.trim(),
            "text": text,
            "parse_mode": "Markdown"
        });

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();
        let body: SendMessageResponse = match res.json().await {
            Ok(body) => body,
            Err(e) if status.is_server_error() => {
                return Err(ChannelError::Transport(format!("Telegram API Error: {} - {}", status, e)))
            }
            Err(e) => return Err(ChannelError::Rejected(format!("unreadable reply ({}): {}", status, e))),
        };

        if !status.is_success() || !body.ok {
            let reason = body
                .description
                .unwrap_or_else(|| format!("Telegram API returned ok: false ({})", status));
            return Err(ChannelError::Rejected(reason));
        }

        Ok(body
            .result
            .map(|m| format!("message {}", m.message_id))
            .unwrap_or_else(|| "ok".to_string()))
    }
}

fn check_config(telegram: &TelegramSettings) -> Result<(), ChannelError> {
    if telegram.bot_token.trim().is_empty() {
        return Err(ChannelError::ConfigurationMissing("telegram.bot_token".to_string()));
    }
    if telegram.chat_id.trim().is_empty() {
        return Err(ChannelError::ConfigurationMissing("telegram.chat_id".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Channel for TelegramChannel {
    fn id(&self) -> ChannelId {
        ChannelId::Telegram
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        self.send_text(&alert.text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Settings;
    use crate::testing::serve;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn settings_for(api_base: &str) -> Settings {
        let mut settings = Settings::default();
        settings.telegram.api_base = api_base.to_string();
        settings.telegram.bot_token = "TEST".to_string();
        settings.telegram.chat_id = "287".to_string();
        settings
    }

    #[tokio::test]
    async fn test_acknowledged_message() -> anyhow::Result<()> {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let seen_in = seen.clone();
        let router = Router::new().route(
            "/botTEST/sendMessage",
            post(move |Json(body): Json<Value>| {
                let seen = seen_in.clone();
                async move {
                    seen.lock().unwrap().push(body);
                    Json(json!({ "ok": true, "result": { "message_id": 7 } }))
                }
            }),
        );
        let base = serve(router).await?;
        let channel = TelegramChannel::new(Client::new(), SettingsHandle::fixed(settings_for(&base)));

        assert_eq!(channel.send_text("hello").await, Ok("message 7".to_string()));
        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["chat_id"], "287");
        assert_eq!(body["text"], "hello");
        assert_eq!(body["parse_mode"], "Markdown");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_ack_is_failure() -> anyhow::Result<()> {
        let router = Router::new().route("/botTEST/sendMessage", post(|| async { Json(json!({})) }));
        let base = serve(router).await?;
        let channel = TelegramChannel::new(Client::new(), SettingsHandle::fixed(settings_for(&base)));
        assert!(matches!(channel.send_text("hi").await, Err(ChannelError::Rejected(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_description_becomes_reason() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/botTEST/sendMessage",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "ok": false, "description": "Bad Request: chat not found" })),
                )
            }),
        );
        let base = serve(router).await?;
        let channel = TelegramChannel::new(Client::new(), SettingsHandle::fixed(settings_for(&base)));
        assert_eq!(
            channel.send_text("hi").await,
            Err(ChannelError::Rejected("Bad Request: chat not found".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_chat_id_fails_fast() {
        let mut settings = settings_for("http://127.0.0.1:9");
        settings.telegram.chat_id.clear();
        let channel = TelegramChannel::new(Client::new(), SettingsHandle::fixed(settings));
        assert_eq!(
            channel.send_text("hi").await,
            Err(ChannelError::ConfigurationMissing("telegram.chat_id".to_string()))
        );
    }
}
