//! Localized feedback phrases.
//!
//! Tables are sparse on purpose: a locale missing from a table falls back to
//! english instead of failing.

use super::catalog::Locale;
use crate::io::channel::ChannelId;

pub const FALLBACK_LOCALE: Locale = Locale::English;

/// Phrase keys for the channel-independent dispatch toasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCue {
    Sending,
    Error,
}

struct StatusPhrases {
    sending: &'static str,
    /// `{}` is replaced by the delivering channel's name.
    success_via: &'static str,
    error: &'static str,
}

const STATUS: &[(Locale, StatusPhrases)] = &[
    (
        Locale::English,
        StatusPhrases {
            sending: "📱 Notifying caregiver...",
            success_via: "✓ Caregiver notified via {}",
            error: "❌ Failed to notify caregiver.",
        },
    ),
    (
        Locale::Hindi,
        StatusPhrases {
            sending: "📱 देखभाल करने वाले को सूचित किया जा रहा है...",
            success_via: "✓ देखभाल करने वाले को {} के माध्यम से सूचित किया गया",
            error: "❌ देखभाल करने वाले को सूचित करने में विफल।",
        },
    ),
    (
        Locale::Tamil,
        StatusPhrases {
            sending: "📱 பராமரிப்பாளருக்கு அறிவிக்கப்படுகிறது...",
            success_via: "✓ பராமரிப்பாளருக்கு {} மூலம் அறிவிக்கப்பட்டது",
            error: "❌ பராமரிப்பாளருக்கு அறிவிக்கத் தவறிவிட்டது.",
        },
    ),
    (
        Locale::Telugu,
        StatusPhrases {
            sending: "📱 సంరక్షకుడికి తెలియజేస్తోంది...",
            success_via: "✓ సంరక్షకుడికి {} ద్వారా తెలియజేయబడింది",
            error: "❌ సంరక్షకుడికి తెలియజేయడంలో విఫలమైంది.",
        },
    ),
];

const SENT_SUBTITLE: &[(Locale, &str)] = &[
    (Locale::English, "Request Sent Successfully"),
    (Locale::Hindi, "अनुरोध सफलतापूर्वक भेजा गया"),
    (Locale::Tamil, "கோரிக்கை வெற்றிகரமாக அனுப்பப்பட்டது"),
    (Locale::Telugu, "అభ్యర్థన విజయవంతంగా పంపబడింది"),
];

const SELECTED: &[(Locale, &str)] = &[(Locale::English, "You selected {}.")];

const OPENING_DIVERSION: &[(Locale, &str)] = &[(Locale::English, "Opening entertainment.")];

fn lookup<T>(table: &'static [(Locale, T)], locale: Locale) -> Option<&'static T> {
    table
        .iter()
        .find(|(l, _)| *l == locale)
        .or_else(|| table.iter().find(|(l, _)| *l == FALLBACK_LOCALE))
        .map(|(_, v)| v)
}

pub fn status(cue: StatusCue, locale: Locale) -> &'static str {
    match lookup(STATUS, locale) {
        Some(p) => match cue {
            StatusCue::Sending => p.sending,
            StatusCue::Error => p.error,
        },
        None => "",
    }
}

/// Success toast naming the channel that actually delivered.
pub fn delivered_via(channel: ChannelId, locale: Locale) -> String {
    match lookup(STATUS, locale) {
        Some(p) => p.success_via.replacen("{}", channel_name(channel), 1),
        None => channel_name(channel).to_string(),
    }
}

fn channel_name(channel: ChannelId) -> &'static str {
    match channel {
        ChannelId::Telegram => "Telegram",
        ChannelId::Voice => "phone call",
        ChannelId::Sms => "SMS",
        ChannelId::Email => "email",
        ChannelId::Log => "local log",
    }
}

pub fn sent_subtitle(locale: Locale) -> &'static str {
    lookup(SENT_SUBTITLE, locale).copied().unwrap_or_default()
}

pub fn selected(name: &str, locale: Locale) -> String {
    lookup(SELECTED, locale)
        .map(|t| t.replacen("{}", name, 1))
        .unwrap_or_else(|| name.to_string())
}

pub fn opening_diversion(locale: Locale) -> &'static str {
    lookup(OPENING_DIVERSION, locale).copied().unwrap_or_default()
}
