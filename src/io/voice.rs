use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::channel::{with_retries, Channel, ChannelId};
use crate::core::catalog::Locale;
use crate::core::errors::ChannelError;
use crate::core::message::Alert;
use crate::core::state::{SettingsHandle, VoiceSettings};

/// Body posted to the relay's `/make-call`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRequest {
    pub request_type: String,
    pub language: Locale,
    pub to: String,
}

/// Common relay reply: `success` plus either an id or an error message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "callSid", alias = "call_sid", skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayAck {
    pub fn ok_id(id: String) -> Self {
        Self {
            success: true,
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn ok_call(call_sid: String) -> Self {
        Self {
            success: true,
            call_sid: Some(call_sid),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// `+` followed by 8 to 15 digits.
pub fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.trim().strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Posts `body` to a relay endpoint and interprets the `RelayAck`.
pub(crate) async fn post_to_relay<T: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &T,
) -> Result<RelayAck, ChannelError> {
    let res = client.post(url).json(body).send().await?;
    let status = res.status();
    let ack: RelayAck = match res.json().await {
        Ok(ack) => ack,
        Err(e) if status.is_server_error() => {
            return Err(ChannelError::Transport(format!("relay error {}: {}", status, e)))
        }
        Err(e) => return Err(ChannelError::Rejected(format!("unreadable relay reply ({}): {}", status, e))),
    };
    if !status.is_success() || !ack.success {
        let reason = ack
            .error
            .clone()
            .unwrap_or_else(|| format!("relay did not acknowledge ({})", status));
        return Err(ChannelError::Rejected(reason));
    }
    Ok(ack)
}

/// Voice call through the local relay. The relay owns the provider
/// credentials; this side only knows where to call.
pub struct VoiceRelayChannel {
    client: Client,
    settings: SettingsHandle,
}

impl VoiceRelayChannel {
    pub fn new(client: Client, settings: SettingsHandle) -> Self {
        Self { client, settings }
    }

    pub async fn call(&self, request_type: &str, language: Locale) -> Result<String, ChannelError> {
        let settings = self.settings.current();
        let voice = &settings.voice;
        check_config(voice)?;

        let url = format!("{}/make-call", voice.relay_url.trim_end_matches('/'));
        let body = CallRequest {
            request_type: request_type.to_string(),
            language,
            to: voice.caregiver_phone.trim().to_string(),
        };
        let (client, url, body) = (&self.client, url.as_str(), &body);
        with_retries(ChannelId::Voice, voice.retry(), move || async move {
            let ack = post_to_relay(client, url, body).await?;
            Ok(ack.call_sid.or(ack.id).unwrap_or_else(|| "call placed".to_string()))
        })
        .await
    }
}

fn check_config(voice: &VoiceSettings) -> Result<(), ChannelError> {
    if voice.relay_url.trim().is_empty() {
        return Err(ChannelError::ConfigurationMissing("voice.relay_url".to_string()));
    }
    if voice.caregiver_phone.trim().is_empty() {
        return Err(ChannelError::ConfigurationMissing("voice.caregiver_phone".to_string()));
    }
    if !is_e164(&voice.caregiver_phone) {
        return Err(ChannelError::ConfigurationMissing(format!(
            "voice.caregiver_phone is not E.164: {}",
            voice.caregiver_phone
        )));
    }
    Ok(())
}

#[async_trait]
impl Channel for VoiceRelayChannel {
    fn id(&self) -> ChannelId {
        ChannelId::Voice
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        self.call(alert.entry_id, alert.locale).await
    }

    /// The relay journals every call it answers.
    fn journals_downstream(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Settings;
    use crate::testing::serve;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn settings_for(relay: &str, phone: &str) -> SettingsHandle {
        let mut settings = Settings::default();
        settings.voice.relay_url = relay.to_string();
        settings.voice.caregiver_phone = phone.to_string();
        SettingsHandle::fixed(settings)
    }

    #[test]
    fn test_e164() {
        assert!(is_e164("+917093035732"));
        assert!(is_e164(" +14155552671 "));
        assert!(!is_e164("14155552671"));
        assert!(!is_e164("+1415-555"));
        assert!(!is_e164("+"));
    }

    #[tokio::test]
    async fn test_call_acknowledged() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/make-call",
            post(|Json(req): Json<CallRequest>| async move {
                assert_eq!(req.request_type, "help");
                assert_eq!(req.language, Locale::Hindi);
                assert_eq!(req.to, "+917093035732");
                Json(json!({ "success": true, "callSid": "CA123" }))
            }),
        );
        let base = serve(router).await?;
        let channel = VoiceRelayChannel::new(Client::new(), settings_for(&base, "+917093035732"));
        assert_eq!(channel.call("help", Locale::Hindi).await, Ok("CA123".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_relay_error_message_is_reason() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/make-call",
            post(|| async { Json(json!({ "success": false, "error": "provider offline" })) }),
        );
        let base = serve(router).await?;
        let channel = VoiceRelayChannel::new(Client::new(), settings_for(&base, "+917093035732"));
        assert_eq!(
            channel.call("food", Locale::English).await,
            Err(ChannelError::Rejected("provider offline".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_phone_never_reaches_relay() -> anyhow::Result<()> {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/make-call",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "success": true }))
                }
            }),
        );
        let base = serve(router).await?;
        let channel = VoiceRelayChannel::new(Client::new(), settings_for(&base, "7093035732"));
        let res = channel.call("water", Locale::English).await;
        assert!(matches!(res, Err(ChannelError::ConfigurationMissing(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
