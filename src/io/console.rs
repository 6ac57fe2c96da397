use colored::*;
use std::io::Write;

use super::channel::ChannelId;
use super::speech::Speech;
use crate::core::dispatcher::DispatchOutcome;
use crate::core::feedback::Presenter;
use crate::core::state::SettingsHandle;

/// Writes one status line. Raw mode leaves `\n` untranslated, so the carriage
/// return is explicit.
pub fn line(text: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r{}\r\n", text);
    let _ = out.flush();
}

/// Terminal toasts plus spoken cues.
pub struct ConsolePresenter {
    settings: SettingsHandle,
    speech: Speech,
}

impl ConsolePresenter {
    pub fn new(settings: SettingsHandle, speech: Speech) -> Self {
        Self { settings, speech }
    }
}

impl Presenter for ConsolePresenter {
    fn announce(&self, text: &str) {
        line(&format!("{} {}", "🔊".cyan(), text.bold()));
        let settings = self.settings.current();
        if settings.voice_feedback {
            self.speech.say(text, settings.locale);
        }
    }

    fn show_status(&self, outcome: DispatchOutcome, phrase: &str) {
        let toast = match outcome {
            DispatchOutcome::InFlight => phrase.yellow(),
            DispatchOutcome::Delivered => phrase.green().bold(),
            DispatchOutcome::Failed => phrase.red().bold(),
            DispatchOutcome::Idle => return,
        };
        line(&format!("   [ {} ]", toast));
    }

    fn clear_status(&self) {
        line(&format!("   {}", "·".dimmed()));
    }

    fn configuration_needed(&self, channels: &[ChannelId]) {
        let names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
        line(&format!(
            "{} {} {}",
            "⚙️".yellow(),
            "Caregiver contact not configured for:".yellow().bold(),
            names.join(", ")
        ));
        line(&format!("   Edit {} or set the matching environment variables.", ".eyestalk/config.toml".bold()));
    }
}
