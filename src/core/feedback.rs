use super::dispatcher::DispatchOutcome;
use crate::io::channel::ChannelId;

/// Presentation collaborator: speech and toast. Every call is
/// fire-and-forget; nothing here may block the caller.
pub trait Presenter: Send + Sync {
    /// Spoken cue in the active locale.
    fn announce(&self, text: &str);

    /// Toast for a visible dispatch state with its localized phrase.
    fn show_status(&self, outcome: DispatchOutcome, phrase: &str);

    /// The toast window elapsed and the outcome is back to idle.
    fn clear_status(&self) {}

    /// A dispatch failed because these channels lack credentials.
    fn configuration_needed(&self, channels: &[ChannelId]);
}
