use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::{ChannelError, FailureKind};
use crate::core::message::Alert;
use crate::core::state::SettingsHandle;
use crate::io::console::line;
use crate::io::email::EmailChannel;
use crate::io::journal::{Journal, LogChannel};
use crate::io::sms::SmsRelayChannel;
use crate::io::telegram::TelegramChannel;
use crate::io::voice::VoiceRelayChannel;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    Telegram,
    Voice,
    Sms,
    Email,
    Log,
}

impl ChannelId {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Telegram => "telegram",
            ChannelId::Voice => "voice",
            ChannelId::Sms => "sms",
            ChannelId::Email => "email",
            ChannelId::Log => "log",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(ChannelId::Telegram),
            "voice" => Ok(ChannelId::Voice),
            "sms" => Ok(ChannelId::Sms),
            "email" => Ok(ChannelId::Email),
            "log" => Ok(ChannelId::Log),
            other => Err(anyhow::anyhow!("Unknown channel: {}", other)),
        }
    }
}

/// One external delivery mechanism. Implementations check their own
/// configuration before touching the network.
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Delivers the alert. `Ok` carries the service acknowledgement
    /// (message id, call id, ...) for the log.
    async fn send(&self, alert: &Alert) -> Result<String, ChannelError>;

    /// Whether whatever answers this channel writes its own journal record.
    /// The dispatcher skips results that such a service answered.
    fn journals_downstream(&self) -> bool {
        false
    }
}

/// Per-channel outcome of one dispatch. Telemetry only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResult {
    pub channel: ChannelId,
    pub success: bool,
    pub detail: String,
    pub failure: Option<FailureKind>,
    pub elapsed_ms: u64,
}

impl ChannelResult {
    pub fn from_send(channel: ChannelId, result: Result<String, ChannelError>, elapsed: Duration) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        match result {
            Ok(ack) => Self {
                channel,
                success: true,
                detail: ack,
                failure: None,
                elapsed_ms,
            },
            Err(e) => Self {
                channel,
                success: false,
                detail: e.to_string(),
                failure: Some(e.kind()),
                elapsed_ms,
            },
        }
    }
}

impl ChannelResult {
    /// The channel's service answered, whether it accepted or refused.
    pub fn reached_service(&self) -> bool {
        matches!(self.failure, None | Some(FailureKind::Rejected))
    }
}

/// Transient retry budget for a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay_ms: u64) -> Self {
        Self {
            retries,
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }
}

/// Runs `op` once, then again up to `policy.retries` times while it keeps
/// failing with a retryable error.
pub async fn with_retries<F, Fut>(channel: ChannelId, policy: RetryPolicy, mut op: F) -> Result<String, ChannelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ChannelError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                line(&format!("🔁 [{}] attempt {} failed ({}), retrying", channel, attempt, e));
                tokio::time::sleep(policy.delay).await;
            }
            other => return other,
        }
    }
}

/// Builds the configured channels in priority order.
pub fn build_channels(
    order: &[ChannelId],
    client: &Client,
    settings: &SettingsHandle,
    journal: Option<Arc<Journal>>,
) -> Vec<Arc<dyn Channel>> {
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    for id in order {
        match id {
            ChannelId::Telegram => channels.push(Arc::new(TelegramChannel::new(client.clone(), settings.clone()))),
            ChannelId::Voice => channels.push(Arc::new(VoiceRelayChannel::new(client.clone(), settings.clone()))),
            ChannelId::Sms => channels.push(Arc::new(SmsRelayChannel::new(client.clone(), settings.clone()))),
            ChannelId::Email => channels.push(Arc::new(EmailChannel::new(client.clone(), settings.clone()))),
            ChannelId::Log => match &journal {
                Some(journal) => channels.push(Arc::new(LogChannel::new(journal.clone()))),
                None => eprintln!("⚠️ Log channel configured without a journal, skipping"),
            },
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_only_transport_failures() {
        let calls = AtomicU32::new(0);
        let res = with_retries(ChannelId::Voice, RetryPolicy::new(2, 1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChannelError::Transport("connection refused".into())) }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let res = with_retries(ChannelId::Voice, RetryPolicy::new(2, 1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChannelError::Rejected("no ack".into())) }
        })
        .await;
        assert_eq!(res, Err(ChannelError::Rejected("no ack".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let calls = AtomicU32::new(0);
        let res = with_retries(ChannelId::Telegram, RetryPolicy::new(1, 1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ChannelError::Transport("reset".into()))
                } else {
                    Ok("42".to_string())
                }
            }
        })
        .await;
        assert_eq!(res, Ok("42".to_string()));
    }

    #[test]
    fn test_channel_id_parse() {
        assert_eq!("Telegram".parse::<ChannelId>().unwrap(), ChannelId::Telegram);
        assert_eq!(" SMS ".parse::<ChannelId>().unwrap(), ChannelId::Sms);
        assert!("fax".parse::<ChannelId>().is_err());
    }
}
