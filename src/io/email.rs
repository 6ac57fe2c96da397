use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::channel::{with_retries, Channel, ChannelId};
use super::voice::post_to_relay;
use crate::core::errors::ChannelError;
use crate::core::message::{urgency_of, Alert};
use crate::core::state::SettingsHandle;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Email through the relay (`POST {relay_url}/send-email`), which speaks SMTP.
pub struct EmailChannel {
    client: Client,
    settings: SettingsHandle,
}

impl EmailChannel {
    pub fn new(client: Client, settings: SettingsHandle) -> Self {
        Self { client, settings }
    }
}

fn subject_for(alert: &Alert) -> String {
    match urgency_of(alert.entry_id) {
        Some(urgency) => format!("EyesTalk {}: patient request ({})", urgency.as_str(), alert.entry_id),
        None => format!("EyesTalk: patient request ({})", alert.entry_id),
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn id(&self) -> ChannelId {
        ChannelId::Email
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        let settings = self.settings.current();
        let email = &settings.email;
        if email.relay_url.trim().is_empty() {
            return Err(ChannelError::ConfigurationMissing("email.relay_url".to_string()));
        }
        if !email.recipient.contains('@') {
            return Err(ChannelError::ConfigurationMissing("email.recipient".to_string()));
        }

        let url = format!("{}/send-email", email.relay_url.trim_end_matches('/'));
        let body = EmailRequest {
            to: email.recipient.trim().to_string(),
            subject: subject_for(alert),
            text: alert.text.replace('*', ""),
        };
        let (client, url, body) = (&self.client, url.as_str(), &body);
        with_retries(ChannelId::Email, email.retry(), move || async move {
            let ack = post_to_relay(client, url, body).await?;
            Ok(ack.id.unwrap_or_else(|| "queued".to_string()))
        })
        .await
    }

    fn journals_downstream(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{Catalog, Locale};
    use crate::core::state::Settings;
    use crate::testing::serve;
    use axum::{routing::post, Json, Router};
    use chrono::{FixedOffset, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn alert() -> Alert {
        let catalog = Catalog::standard();
        Alert::compose(
            Uuid::new_v4(),
            catalog.find("food").unwrap(),
            Locale::English,
            Utc::now(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_plain_text_mail() -> anyhow::Result<()> {
        let router = Router::new().route(
            "/send-email",
            post(|Json(req): Json<EmailRequest>| async move {
                let ok = req.to == "care@example.com" && !req.text.contains('*') && req.subject == "EyesTalk Urgent: patient request (food)";
                Json(json!({ "success": ok, "id": "m-1" }))
            }),
        );
        let base = serve(router).await?;
        let mut settings = Settings::default();
        settings.email.relay_url = base;
        settings.email.recipient = "care@example.com".to_string();
        let channel = EmailChannel::new(Client::new(), SettingsHandle::fixed(settings));
        assert_eq!(channel.send(&alert()).await, Ok("m-1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_recipient() {
        let mut settings = Settings::default();
        settings.email.relay_url = "http://127.0.0.1:9".to_string();
        let channel = EmailChannel::new(Client::new(), SettingsHandle::fixed(settings));
        assert_eq!(
            channel.send(&alert()).await,
            Err(ChannelError::ConfigurationMissing("email.recipient".to_string()))
        );
    }
}
