use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use super::catalog::{Locale, MenuEntry};

/// What every channel receives for one confirmed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub request_id: Uuid,
    pub entry_id: &'static str,
    pub locale: Locale,
    pub created_at: DateTime<Utc>,
    /// Caregiver-facing text, Telegram Markdown.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Urgent,
    Critical,
    Request,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Urgent => "Urgent",
            Urgency::Critical => "CRITICAL",
            Urgency::Request => "Request",
        }
    }

    fn emoji(self) -> &'static str {
        match self {
            Urgency::Critical => "🚨",
            Urgency::Request => "📌",
            Urgency::Urgent => "⚠️",
        }
    }
}

struct RequestDetails {
    emoji: &'static str,
    label: &'static str,
    urgency: Urgency,
}

fn details(id: &str) -> Option<RequestDetails> {
    let (emoji, label, urgency) = match id {
        "water" => ("💧", "WATER", Urgency::Urgent),
        "food" => ("🍽️", "FOOD", Urgency::Urgent),
        "help" => ("🆘", "HELP", Urgency::Critical),
        "washroom" => ("🚻", "WASHROOM", Urgency::Urgent),
        "outing" => ("🚗", "OUTING", Urgency::Request),
        _ => return None,
    };
    Some(RequestDetails { emoji, label, urgency })
}

pub fn urgency_of(id: &str) -> Option<Urgency> {
    details(id).map(|d| d.urgency)
}

pub fn compose_text(entry: &MenuEntry, locale: Locale, at: DateTime<Utc>, offset: FixedOffset) -> String {
    let Some(d) = details(entry.id) else {
        return format!("Patient made an unknown request: {}", entry.name.english);
    };
    let time = at.with_timezone(&offset).format("%d %b %Y, %I:%M %p");
    format!(
        "{} *Patient Request: {}*\n\n⏰ *Time:* {}\n🌐 *Language:* {}\n{} *Status:* {}",
        d.emoji,
        d.label,
        time,
        locale.display_name(),
        d.urgency.emoji(),
        d.urgency.as_str()
    )
}

impl Alert {
    pub fn compose(
        request_id: Uuid,
        entry: &MenuEntry,
        locale: Locale,
        created_at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            request_id,
            entry_id: entry.id,
            locale,
            created_at,
            text: compose_text(entry, locale, created_at, offset),
        }
    }
}
