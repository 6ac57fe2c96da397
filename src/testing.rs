//! Shared fixtures for in-crate tests.

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::dispatcher::DispatchOutcome;
use crate::core::errors::ChannelError;
use crate::core::feedback::Presenter;
use crate::core::message::Alert;
use crate::io::channel::{Channel, ChannelId};

/// Serves `router` on an ephemeral localhost port and returns its base URL.
pub async fn serve(router: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{}", addr))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Announce(String),
    Status(DispatchOutcome, String),
    Cleared,
    ConfigurationNeeded(Vec<ChannelId>),
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn announcements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresenterEvent::Announce(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PresenterEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Presenter for RecordingPresenter {
    fn announce(&self, text: &str) {
        self.push(PresenterEvent::Announce(text.to_string()));
    }

    fn show_status(&self, outcome: DispatchOutcome, phrase: &str) {
        self.push(PresenterEvent::Status(outcome, phrase.to_string()));
    }

    fn clear_status(&self) {
        self.push(PresenterEvent::Cleared);
    }

    fn configuration_needed(&self, channels: &[ChannelId]) {
        self.push(PresenterEvent::ConfigurationNeeded(channels.to_vec()));
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Fail(ChannelError),
    /// Sleeps, then succeeds.
    Delay(Duration),
    Panic,
}

/// Channel double with a swappable script and an attempt counter.
pub struct ScriptedChannel {
    id: ChannelId,
    script: Mutex<Script>,
    attempts: AtomicU32,
}

impl ScriptedChannel {
    pub fn new(id: ChannelId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(script),
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed => Ok(format!("{} ok", alert.entry_id)),
            Script::Fail(e) => Err(e),
            Script::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(format!("{} ok after {:?}", alert.entry_id, d))
            }
            Script::Panic => panic!("scripted channel panic"),
        }
    }
}
