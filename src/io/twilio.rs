//! Outbound call through the Twilio REST API. Used by the relay only; the
//! session side never holds provider credentials.

use reqwest::Client;
use serde::Deserialize;

use crate::core::catalog::{Locale, MenuEntry};
use crate::core::errors::ChannelError;
use crate::core::state::RelaySettings;
use crate::io::voice::is_e164;

/// Request type used by `eyestalk test-call`; not a catalog entry.
pub const TEST_REQUEST: &str = "test";

/// Reply shape shared by `Calls.json` and `Messages.json`.
#[derive(Debug, Deserialize)]
struct Resource {
    sid: Option<String>,
    message: Option<String>,
}

pub struct TwilioClient {
    client: Client,
}

impl TwilioClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Places the call and returns the call SID.
    pub async fn place_call(&self, relay: &RelaySettings, to: &str, twiml: &str) -> Result<String, ChannelError> {
        self.create(relay, "Calls.json", to, ("Twiml", twiml)).await
    }

    /// Sends a text message and returns the message SID.
    pub async fn send_sms(&self, relay: &RelaySettings, to: &str, body: &str) -> Result<String, ChannelError> {
        self.create(relay, "Messages.json", to, ("Body", body)).await
    }

    async fn create(
        &self,
        relay: &RelaySettings,
        resource: &str,
        to: &str,
        content: (&str, &str),
    ) -> Result<String, ChannelError> {
        check_config(relay)?;
        if !is_e164(to) {
            return Err(ChannelError::ConfigurationMissing(format!("destination is not E.164: {}", to)));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/{}",
            relay.twilio_api_base.trim_end_matches('/'),
            relay.twilio_account_sid.trim(),
            resource
        );
        let form = [("To", to.trim()), ("From", relay.twilio_from_number.trim()), content];
        let res = self
            .client
            .post(&url)
            .basic_auth(relay.twilio_account_sid.trim(), Some(relay.twilio_auth_token.trim()))
            .form(&form)
            .send()
            .await?;

        let status = res.status();
        let created: Resource = match res.json().await {
            Ok(created) => created,
            Err(e) if status.is_server_error() => {
                return Err(ChannelError::Transport(format!("Twilio error {}: {}", status, e)))
            }
            Err(e) => return Err(ChannelError::Rejected(format!("unreadable Twilio reply ({}): {}", status, e))),
        };
        match (status.is_success(), created.sid) {
            (true, Some(sid)) => Ok(sid),
            _ => Err(ChannelError::Rejected(
                created
                    .message
                    .unwrap_or_else(|| format!("Twilio did not create {} ({})", resource, status)),
            )),
        }
    }
}

fn check_config(relay: &RelaySettings) -> Result<(), ChannelError> {
    for (key, value) in [
        ("relay.twilio_account_sid", &relay.twilio_account_sid),
        ("relay.twilio_auth_token", &relay.twilio_auth_token),
        ("relay.twilio_from_number", &relay.twilio_from_number),
    ] {
        if value.trim().is_empty() {
            return Err(ChannelError::ConfigurationMissing(key.to_string()));
        }
    }
    Ok(())
}

/// Spoken script: the request name in the patient's language, then an
/// English sentence for the caregiver.
pub fn call_script(entry: &MenuEntry, locale: Locale) -> String {
    let english = entry.name.get(Locale::English);
    let mut twiml = String::from("<Response>");
    if locale != Locale::English {
        twiml.push_str(&format!(
            "<Say language=\"{}\">{}</Say>",
            locale.speech_code(),
            xml_escape(entry.name.get(locale))
        ));
    }
    twiml.push_str(&format!(
        "<Say language=\"en-IN\">EyesTalk alert. Your patient is asking for {}. Please check on them.</Say>",
        xml_escape(&english.to_lowercase())
    ));
    twiml.push_str("</Response>");
    twiml
}

pub fn test_script() -> String {
    "<Response><Say language=\"en-IN\">This is a test call from EyesTalk. No action is needed.</Say></Response>".to_string()
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
