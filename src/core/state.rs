use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::catalog::Locale;
use super::dispatcher::{DispatchPolicy, DispatchTiming};
use super::navigation::Flow;
use crate::io::channel::{ChannelId, RetryPolicy};
use crate::io::console::line;
use crate::io::voice::is_e164;

pub const EYESTALK_DIR: &str = ".eyestalk";

/// Bounds for how long a resolved outcome stays on screen.
pub const DISPLAY_WINDOW_MS: std::ops::RangeInclusive<u64> = 2500..=3000;

const LOCAL_RELAY: &str = "http://localhost:3001";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
    Auto,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub locale: Locale,
    pub voice_feedback: bool,
    pub flow: Flow,
    pub policy: DispatchPolicy,
    /// Delivery channels in priority order.
    pub channels: Vec<ChannelId>,
    pub display_window_ms: u64,
    pub channel_timeout_ms: u64,
    /// Offset applied to alert timestamps (IST by default).
    pub utc_offset_minutes: i32,
    pub journal_dir: PathBuf,
    pub retention_days: u32,
    pub telegram: TelegramSettings,
    pub voice: VoiceSettings,
    pub sms: SmsSettings,
    pub email: EmailSettings,
    pub relay: RelaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            locale: Locale::English,
            voice_feedback: true,
            flow: Flow::Confirm,
            policy: DispatchPolicy::FirstSuccess,
            channels: vec![ChannelId::Telegram],
            display_window_ms: 2500,
            channel_timeout_ms: 8000,
            utc_offset_minutes: 330,
            journal_dir: PathBuf::from(EYESTALK_DIR).join("journal"),
            retention_days: 30,
            telegram: TelegramSettings::default(),
            voice: VoiceSettings::default(),
            sms: SmsSettings::default(),
            email: EmailSettings::default(),
            relay: RelaySettings::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            retries: 0,
            retry_delay_ms: 2000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VoiceSettings {
    pub relay_url: String,
    pub caregiver_phone: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            relay_url: LOCAL_RELAY.to_string(),
            caregiver_phone: String::new(),
            retries: 0,
            retry_delay_ms: 2000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SmsSettings {
    pub relay_url: String,
    pub caregiver_phone: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            relay_url: LOCAL_RELAY.to_string(),
            caregiver_phone: String::new(),
            retries: 0,
            retry_delay_ms: 2000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EmailSettings {
    pub relay_url: String,
    pub recipient: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            relay_url: LOCAL_RELAY.to_string(),
            recipient: String::new(),
            retries: 0,
            retry_delay_ms: 2000,
        }
    }
}

/// Credentials owned by the relay service, never by the session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RelaySettings {
    pub port: u16,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub twilio_api_base: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    /// Sender address; the SMTP username when empty.
    pub email_from: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            port: 3001,
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_from_number: String::new(),
            twilio_api_base: "https://api.twilio.com".to_string(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            email_from: String::new(),
        }
    }
}

impl TelegramSettings {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay_ms)
    }
}

impl VoiceSettings {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay_ms)
    }
}

impl SmsSettings {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay_ms)
    }
}

impl EmailSettings {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay_ms)
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        Path::new(EYESTALK_DIR).join("config.toml")
    }

    /// Reads `path` when it exists, falls back to defaults otherwise, then
    /// layers environment overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            Self::load_file(path)?
        } else {
            Self::default()
        };
        settings.apply_env();
        for warning in settings.sanitize() {
            line(&format!("⚠️ {}", warning));
        }
        Ok(settings)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = v;
        }
        if let Some(v) = get("CAREGIVER_PHONE") {
            self.voice.caregiver_phone = v.clone();
            self.sms.caregiver_phone = v;
        }
        if let Some(v) = get("EYESTALK_RELAY_URL") {
            self.voice.relay_url = v.clone();
            self.sms.relay_url = v.clone();
            self.email.relay_url = v;
        }
        if let Some(v) = get("CAREGIVER_EMAIL") {
            self.email.recipient = v;
        }
        if let Some(v) = get("EYESTALK_LOCALE") {
            match v.parse() {
                Ok(locale) => self.locale = locale,
                Err(e) => eprintln!("⚠️ Ignoring EYESTALK_LOCALE: {}", e),
            }
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.relay.twilio_account_sid = v;
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.relay.twilio_auth_token = v;
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.relay.twilio_from_number = v;
        }
        if let Some(v) = get("EMAIL_SMTP_HOST") {
            self.relay.smtp_host = v;
        }
        if let Some(v) = get("EMAIL_USER") {
            self.relay.smtp_username = v;
        }
        if let Some(v) = get("EMAIL_APP_PASSWORD") {
            self.relay.smtp_password = v;
        }
    }

    /// Drops repeated channels and pulls the display window into range.
    /// Returns what was changed so the caller can report it.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut seen = Vec::with_capacity(self.channels.len());
        for channel in self.channels.drain(..) {
            if seen.contains(&channel) {
                warnings.push(format!("Channel {} is listed more than once; using it once", channel));
            } else {
                seen.push(channel);
            }
        }
        self.channels = seen;

        let clamped = self
            .display_window_ms
            .clamp(*DISPLAY_WINDOW_MS.start(), *DISPLAY_WINDOW_MS.end());
        if clamped != self.display_window_ms {
            warnings.push(format!(
                "display_window_ms = {} is outside {}..={}; using {}",
                self.display_window_ms,
                DISPLAY_WINDOW_MS.start(),
                DISPLAY_WINDOW_MS.end(),
                clamped
            ));
            self.display_window_ms = clamped;
        }
        warnings
    }

    /// Configured channels that cannot work with the current credentials.
    pub fn missing_credentials(&self) -> Vec<ChannelId> {
        self.channels
            .iter()
            .copied()
            .filter(|channel| match channel {
                ChannelId::Telegram => {
                    self.telegram.bot_token.trim().is_empty() || self.telegram.chat_id.trim().is_empty()
                }
                ChannelId::Voice => {
                    self.voice.relay_url.trim().is_empty() || !is_e164(&self.voice.caregiver_phone)
                }
                ChannelId::Sms => self.sms.relay_url.trim().is_empty() || !is_e164(&self.sms.caregiver_phone),
                ChannelId::Email => {
                    self.email.relay_url.trim().is_empty() || !self.email.recipient.contains('@')
                }
                ChannelId::Log => self.journal_dir.as_os_str().is_empty(),
            })
            .collect()
    }

    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }

    pub fn timing(&self) -> DispatchTiming {
        DispatchTiming {
            channel_timeout: Duration::from_millis(self.channel_timeout_ms),
            display_window: Duration::from_millis(self.display_window_ms),
        }
    }
}

/// Owner side of the live settings channel.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Arc<Settings>>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(settings));
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> SettingsHandle {
        SettingsHandle { rx: self.tx.subscribe() }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, settings: Settings) {
        self.tx.send_replace(Arc::new(settings));
    }
}

/// Read side handed to the dispatcher, channels and presenter at construction.
#[derive(Clone)]
pub struct SettingsHandle {
    rx: watch::Receiver<Arc<Settings>>,
}

impl SettingsHandle {
    /// A handle that will never change. Useful for one-shot commands and tests.
    pub fn fixed(settings: Settings) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(settings));
        Self { rx }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published snapshot. Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
