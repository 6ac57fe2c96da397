use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::channel::{with_retries, Channel, ChannelId};
use super::voice::{is_e164, post_to_relay};
use crate::core::errors::ChannelError;
use crate::core::message::Alert;
use crate::core::state::{SettingsHandle, SmsSettings};

/// Body posted to the relay's `/send-sms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsRequest {
    pub to: String,
    pub message: String,
}

/// Text message through the relay, which holds the Twilio credentials.
pub struct SmsRelayChannel {
    client: Client,
    settings: SettingsHandle,
}

impl SmsRelayChannel {
    pub fn new(client: Client, settings: SettingsHandle) -> Self {
        Self { client, settings }
    }
}

fn check_config(sms: &SmsSettings) -> Result<(), ChannelError> {
    if sms.relay_url.trim().is_empty() {
        return Err(ChannelError::ConfigurationMissing("sms.relay_url".to_string()));
    }
    if !is_e164(&sms.caregiver_phone) {
        return Err(ChannelError::ConfigurationMissing("sms.caregiver_phone".to_string()));
    }
    Ok(())
}

/// SMS bodies are plain text; Markdown emphasis would show up literally.
fn plain(text: &str) -> String {
    text.replace('*', "")
}

#[async_trait]
impl Channel for SmsRelayChannel {
    fn id(&self) -> ChannelId {
        ChannelId::Sms
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        let settings = self.settings.current();
        let sms = &settings.sms;
        check_config(sms)?;

        let url = format!("{}/send-sms", sms.relay_url.trim_end_matches('/'));
        let body = SmsRequest {
            to: sms.caregiver_phone.trim().to_string(),
            message: plain(&alert.text),
        };
        let (client, url, body) = (&self.client, url.as_str(), &body);
        with_retries(ChannelId::Sms, sms.retry(), move || async move {
            let ack = post_to_relay(client, url, body).await?;
            Ok(ack.id.unwrap_or_else(|| "sms queued".to_string()))
        })
        .await
    }

    fn journals_downstream(&self) -> bool {
        true
    }
}
