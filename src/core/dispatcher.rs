//! Caregiver alert dispatcher.
//!
//! One dispatch at a time. `dispatch` flips the outcome to `InFlight` under
//! the watch channel's lock before any task is spawned, so a second caller
//! either sees the gate closed or gets `ProtocolViolation`. Channel attempts
//! run as their own tasks and are folded into `ChannelResult`s; nothing a
//! channel does can escape `dispatch` as an error or leave the gate closed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::catalog::{Locale, MenuEntry};
use super::errors::{ChannelError, DispatchError, FailureKind};
use super::feedback::Presenter;
use super::message::Alert;
use super::phrases::{self, StatusCue};
use super::state::SettingsHandle;
use crate::io::channel::{Channel, ChannelId, ChannelResult};
use crate::io::console::line;
use crate::io::journal::{Journal, JournalRecord};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    #[default]
    Idle,
    InFlight,
    Delivered,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Channels in order, stop at the first success.
    #[default]
    FirstSuccess,
    /// Every channel concurrently; delivered if any succeeded.
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Upper bound for one channel, retries included.
    pub channel_timeout: Duration,
    /// How long `Delivered`/`Failed` stays visible before reverting to `Idle`.
    pub display_window: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self {
            channel_timeout: Duration::from_secs(8),
            display_window: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub id: Uuid,
    pub entry: MenuEntry,
    pub locale: Locale,
    pub created_at: DateTime<Utc>,
}

impl DispatchRequest {
    pub fn new(entry: MenuEntry, locale: Locale) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry,
            locale,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub request: DispatchRequest,
    pub outcome: DispatchOutcome,
    /// In attempt order.
    pub results: Vec<ChannelResult>,
}

impl DispatchReport {
    pub fn configuration_needed(&self) -> Vec<ChannelId> {
        self.results
            .iter()
            .filter(|r| r.failure == Some(FailureKind::ConfigurationMissing))
            .map(|r| r.channel)
            .collect()
    }

    pub fn attempted(&self) -> Vec<ChannelId> {
        self.results.iter().map(|r| r.channel).collect()
    }

    /// First channel that accepted the alert.
    pub fn delivered_by(&self) -> Option<ChannelId> {
        self.results.iter().find(|r| r.success).map(|r| r.channel)
    }
}

/// A dispatch that has been accepted and is running in the background.
pub struct InFlightDispatch {
    pub request: DispatchRequest,
    handle: JoinHandle<DispatchReport>,
}

impl InFlightDispatch {
    pub async fn resolved(self) -> Result<DispatchReport> {
        self.handle.await.context("Dispatch task failed")
    }
}

struct Inner {
    channels: Vec<Arc<dyn Channel>>,
    policy: DispatchPolicy,
    timing: DispatchTiming,
    presenter: Arc<dyn Presenter>,
    settings: SettingsHandle,
    journal: Option<Arc<Journal>>,
    outcome: watch::Sender<DispatchOutcome>,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        channels: Vec<Arc<dyn Channel>>,
        policy: DispatchPolicy,
        timing: DispatchTiming,
        presenter: Arc<dyn Presenter>,
        settings: SettingsHandle,
        journal: Option<Arc<Journal>>,
    ) -> Self {
        let (outcome, _rx) = watch::channel(DispatchOutcome::Idle);
        Self {
            inner: Arc::new(Inner {
                channels,
                policy,
                timing,
                presenter,
                settings,
                journal,
                outcome,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn outcome(&self) -> DispatchOutcome {
        *self.inner.outcome.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchOutcome> {
        self.inner.outcome.subscribe()
    }

    /// The InFlight gate: input is only processed while this holds.
    pub fn accepts_input(&self) -> bool {
        self.outcome() != DispatchOutcome::InFlight
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.inner.channels.iter().map(|c| c.id()).collect()
    }

    /// Starts delivering `entry`. Returns immediately; the outcome is already
    /// `InFlight` when this returns `Ok`. Must be called inside a tokio runtime.
    pub fn dispatch(&self, entry: MenuEntry, locale: Locale) -> Result<InFlightDispatch, DispatchError> {
        let mut generation = 0;
        let claimed = self.inner.outcome.send_if_modified(|current| {
            if *current == DispatchOutcome::InFlight {
                return false;
            }
            generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = DispatchOutcome::InFlight;
            true
        });
        if !claimed {
            line(&format!("{} dispatch({}) rejected: another request is in flight", "⚠️".red(), entry.id));
            return Err(DispatchError::ProtocolViolation);
        }

        let request = DispatchRequest::new(entry, locale);
        line(&format!(
            "{} Dispatching {} [{}] via {:?} ({:?})",
            "📨".cyan(),
            request.entry.id.bold(),
            request.id,
            self.channel_ids(),
            self.inner.policy
        ));
        self.inner
            .presenter
            .show_status(DispatchOutcome::InFlight, phrases::status(StatusCue::Sending, locale));

        let handle = tokio::spawn(run_dispatch(self.inner.clone(), request.clone(), generation));
        Ok(InFlightDispatch { request, handle })
    }
}

async fn run_dispatch(inner: Arc<Inner>, request: DispatchRequest, generation: u64) -> DispatchReport {
    let offset = inner.settings.current().utc_offset();
    let alert = Arc::new(Alert::compose(
        request.id,
        &request.entry,
        request.locale,
        request.created_at,
        offset,
    ));
    let limit = inner.timing.channel_timeout;

    let results = match inner.policy {
        DispatchPolicy::FirstSuccess => {
            let mut results = Vec::with_capacity(inner.channels.len());
            for channel in &inner.channels {
                let result = attempt_isolated(channel.clone(), alert.clone(), limit).await;
                let delivered = result.success;
                results.push(result);
                if delivered {
                    break;
                }
            }
            results
        }
        DispatchPolicy::Broadcast => {
            join_all(
                inner
                    .channels
                    .iter()
                    .map(|channel| attempt_isolated(channel.clone(), alert.clone(), limit)),
            )
            .await
        }
    };

    if results.is_empty() {
        line(&format!("{} No delivery channels configured", "⚠️".red()));
    }
    for r in &results {
        if r.success {
            line(&format!("   {} [{}] ok in {}ms: {}", "✅".green(), r.channel, r.elapsed_ms, r.detail));
        } else {
            line(&format!("   {} [{}] failed in {}ms: {}", "❌".red(), r.channel, r.elapsed_ms, r.detail));
        }
    }

    if let Some(journal) = &inner.journal {
        // Results a downstream service answered are already in its journal.
        let downstream: Vec<ChannelId> = inner
            .channels
            .iter()
            .filter(|c| c.journals_downstream())
            .map(|c| c.id())
            .collect();
        let now = Utc::now();
        let records: Vec<JournalRecord> = results
            .iter()
            .filter(|r| !(downstream.contains(&r.channel) && r.reached_service()))
            .map(|r| JournalRecord::from_result(r, &alert.text, now))
            .collect();
        if let Err(e) = journal.append_all(records).await {
            line(&format!("{} Journal write failed: {:#}", "⚠️".red(), e));
        }
    }

    let outcome = if results.iter().any(|r| r.success) {
        DispatchOutcome::Delivered
    } else {
        DispatchOutcome::Failed
    };
    let report = DispatchReport {
        request,
        outcome,
        results,
    };

    inner.outcome.send_replace(outcome);

    let locale = report.request.locale;
    match report.delivered_by() {
        Some(channel) => {
            inner.presenter.show_status(outcome, &phrases::delivered_via(channel, locale));
            inner.presenter.announce(phrases::sent_subtitle(locale));
        }
        None => inner.presenter.show_status(outcome, phrases::status(StatusCue::Error, locale)),
    }
    let missing = report.configuration_needed();
    if !missing.is_empty() {
        inner.presenter.configuration_needed(&missing);
    }

    let resetter = inner.clone();
    tokio::spawn(async move {
        tokio::time::sleep(resetter.timing.display_window).await;
        reset_to_idle(&resetter, generation);
    });

    report
}

/// Reverts a resolved outcome to `Idle` unless a newer dispatch has started.
fn reset_to_idle(inner: &Inner, generation: u64) {
    let reset = inner.outcome.send_if_modified(|current| {
        let resolved = matches!(*current, DispatchOutcome::Delivered | DispatchOutcome::Failed);
        if resolved && inner.generation.load(Ordering::SeqCst) == generation {
            *current = DispatchOutcome::Idle;
            true
        } else {
            false
        }
    });
    if reset {
        inner.presenter.clear_status();
    }
}

async fn attempt(channel: Arc<dyn Channel>, alert: Arc<Alert>, limit: Duration) -> ChannelResult {
    let started = Instant::now();
    let result = match tokio::time::timeout(limit, channel.send(&alert)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout(limit.as_millis() as u64)),
    };
    ChannelResult::from_send(channel.id(), result, started.elapsed())
}

/// Runs one attempt in its own task so a panicking adapter becomes a failed
/// result instead of a stuck gate.
async fn attempt_isolated(channel: Arc<dyn Channel>, alert: Arc<Alert>, limit: Duration) -> ChannelResult {
    let id = channel.id();
    match tokio::spawn(attempt(channel, alert, limit)).await {
        Ok(result) => result,
        Err(e) => ChannelResult::from_send(
            id,
            Err(ChannelError::Transport(format!("channel task aborted: {}", e))),
            Duration::ZERO,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use crate::core::state::Settings;
    use crate::io::journal::LogChannel;
    use crate::testing::{PresenterEvent, RecordingPresenter, Script, ScriptedChannel};

    fn timing(window_ms: u64) -> DispatchTiming {
        DispatchTiming {
            channel_timeout: Duration::from_millis(200),
            display_window: Duration::from_millis(window_ms),
        }
    }

    fn dispatcher(
        channels: &[Arc<ScriptedChannel>],
        policy: DispatchPolicy,
        window_ms: u64,
    ) -> (Dispatcher, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::default());
        let channels = channels.iter().map(|c| c.clone() as Arc<dyn Channel>).collect();
        let d = Dispatcher::new(
            channels,
            policy,
            timing(window_ms),
            presenter.clone(),
            SettingsHandle::fixed(Settings::default()),
            None,
        );
        (d, presenter)
    }

    fn help() -> MenuEntry {
        Catalog::standard().find("help").cloned().unwrap()
    }

    async fn wait_for(d: &Dispatcher, want: DispatchOutcome) {
        let mut rx = d.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|o| *o == want))
            .await
            .expect("outcome never reached")
            .expect("dispatcher dropped");
    }

    #[tokio::test]
    async fn test_first_success_stops_early() -> Result<()> {
        let a = ScriptedChannel::new(ChannelId::Voice, Script::Fail(ChannelError::Transport("down".into())));
        let b = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let c = ScriptedChannel::new(ChannelId::Email, Script::Succeed);
        let (d, _) = dispatcher(&[a.clone(), b.clone(), c.clone()], DispatchPolicy::FirstSuccess, 1000);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Delivered);
        assert_eq!(report.attempted(), vec![ChannelId::Voice, ChannelId::Telegram]);
        assert_eq!((a.attempts(), b.attempts(), c.attempts()), (1, 1, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_broadcast_attempts_everything_once() -> Result<()> {
        let a = ScriptedChannel::new(ChannelId::Voice, Script::Fail(ChannelError::Rejected("busy".into())));
        let b = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let (d, _) = dispatcher(&[a.clone(), b.clone()], DispatchPolicy::Broadcast, 1000);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Delivered);
        assert_eq!(report.attempted(), vec![ChannelId::Voice, ChannelId::Telegram]);
        assert_eq!((a.attempts(), b.attempts()), (1, 1));
        assert_eq!(report.results[0].failure, Some(FailureKind::Rejected));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_configuration_fails_and_signals() -> Result<()> {
        let only = ScriptedChannel::new(
            ChannelId::Telegram,
            Script::Fail(ChannelError::ConfigurationMissing("telegram.chat_id".into())),
        );
        let (d, presenter) = dispatcher(&[only], DispatchPolicy::FirstSuccess, 1000);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Failed);
        assert_eq!(report.configuration_needed(), vec![ChannelId::Telegram]);
        assert!(presenter
            .events()
            .contains(&PresenterEvent::ConfigurationNeeded(vec![ChannelId::Telegram])));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_channels_fails() -> Result<()> {
        let (d, _) = dispatcher(&[], DispatchPolicy::Broadcast, 1000);
        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Failed);
        assert!(report.results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_is_per_channel() -> Result<()> {
        let slow = ScriptedChannel::new(ChannelId::Voice, Script::Delay(Duration::from_secs(5)));
        let fast = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let (d, _) = dispatcher(&[slow, fast], DispatchPolicy::Broadcast, 1000);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Delivered);
        assert_eq!(report.results[0].failure, Some(FailureKind::Timeout));
        assert!(report.results[1].success);
        Ok(())
    }

    #[tokio::test]
    async fn test_panicking_channel_does_not_wedge_gate() -> Result<()> {
        let bad = ScriptedChannel::new(ChannelId::Email, Script::Panic);
        let (d, _) = dispatcher(&[bad], DispatchPolicy::FirstSuccess, 20);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Failed);
        assert_eq!(report.results[0].failure, Some(FailureKind::Transport));
        wait_for(&d, DispatchOutcome::Idle).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_gate_is_closed_synchronously() -> Result<()> {
        let slow = ScriptedChannel::new(ChannelId::Telegram, Script::Delay(Duration::from_millis(50)));
        let (d, _) = dispatcher(&[slow.clone()], DispatchPolicy::FirstSuccess, 30);

        let pending = d.dispatch(help(), Locale::English).unwrap();
        assert_eq!(d.outcome(), DispatchOutcome::InFlight);
        assert!(!d.accepts_input());
        assert_eq!(
            d.dispatch(help(), Locale::English).err(),
            Some(DispatchError::ProtocolViolation)
        );

        let report = pending.resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Delivered);
        assert!(d.accepts_input());
        wait_for(&d, DispatchOutcome::Idle).await;
        assert_eq!(slow.attempts(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_outcome_reverts_to_idle_after_window() -> Result<()> {
        let ok = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let (d, presenter) = dispatcher(&[ok], DispatchPolicy::FirstSuccess, 40);

        let started = Instant::now();
        d.dispatch(help(), Locale::Hindi).unwrap().resolved().await?;
        assert_eq!(d.outcome(), DispatchOutcome::Delivered);
        wait_for(&d, DispatchOutcome::Idle).await;
        assert!(started.elapsed() >= Duration::from_millis(40));

        let events = presenter.events();
        assert_eq!(
            events,
            vec![
                PresenterEvent::Status(
                    DispatchOutcome::InFlight,
                    phrases::status(StatusCue::Sending, Locale::Hindi).to_string()
                ),
                PresenterEvent::Status(
                    DispatchOutcome::Delivered,
                    phrases::delivered_via(ChannelId::Telegram, Locale::Hindi)
                ),
                PresenterEvent::Announce(phrases::sent_subtitle(Locale::Hindi).to_string()),
                PresenterEvent::Cleared,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_reset_does_not_clobber_newer_dispatch() -> Result<()> {
        let fast = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let (d, _) = dispatcher(&[fast.clone()], DispatchPolicy::FirstSuccess, 40);
        d.dispatch(help(), Locale::English).unwrap().resolved().await?;

        // Second dispatch while the first outcome is still on display.
        fast.set_script(Script::Delay(Duration::from_millis(150)));
        let second = d.dispatch(help(), Locale::English).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(d.outcome(), DispatchOutcome::InFlight);

        second.resolved().await?;
        wait_for(&d, DispatchOutcome::Idle).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_toast_names_the_delivering_channel() -> Result<()> {
        let voice = ScriptedChannel::new(ChannelId::Voice, Script::Succeed);
        let (d, presenter) = dispatcher(&[voice], DispatchPolicy::FirstSuccess, 1000);

        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.delivered_by(), Some(ChannelId::Voice));

        let toasts: Vec<String> = presenter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PresenterEvent::Status(_, text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(toasts.len(), 2);
        assert!(toasts.iter().all(|t| !t.contains("Telegram")));
        assert_eq!(toasts[1], "✓ Caregiver notified via phone call");
        Ok(())
    }

    #[tokio::test]
    async fn test_log_channel_dispatch_is_journaled_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Arc::new(Journal::open(dir.path())?);
        let d = Dispatcher::new(
            vec![Arc::new(LogChannel::new(journal.clone())) as Arc<dyn Channel>],
            DispatchPolicy::FirstSuccess,
            timing(1000),
            Arc::new(RecordingPresenter::default()),
            SettingsHandle::fixed(Settings::default()),
            Some(journal.clone()),
        );
        let report = d.dispatch(help(), Locale::English).unwrap().resolved().await?;
        assert_eq!(report.outcome, DispatchOutcome::Delivered);

        let records = journal.recent(1)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel, "log");
        Ok(())
    }

    #[tokio::test]
    async fn test_results_are_journaled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Arc::new(Journal::open(dir.path())?);
        let a = ScriptedChannel::new(ChannelId::Voice, Script::Fail(ChannelError::Transport("down".into())));
        let b = ScriptedChannel::new(ChannelId::Telegram, Script::Succeed);
        let d = Dispatcher::new(
            vec![a as Arc<dyn Channel>, b as Arc<dyn Channel>],
            DispatchPolicy::Broadcast,
            timing(1000),
            Arc::new(RecordingPresenter::default()),
            SettingsHandle::fixed(Settings::default()),
            Some(journal.clone()),
        );
        d.dispatch(help(), Locale::English).unwrap().resolved().await?;

        let records = journal.recent(1)?;
        assert_eq!(records.len(), 2);
        let mut channels: Vec<&str> = records.iter().map(|r| r.channel.as_str()).collect();
        channels.sort();
        assert_eq!(channels, ["telegram", "voice"]);
        assert!(records.iter().all(|r| r.message.contains("HELP")));
        Ok(())
    }
}
