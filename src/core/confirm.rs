use super::catalog::{Locale, Localized, MenuEntry};

/// Highlighted answer inside an open confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmChoice {
    #[default]
    Accept,
    Reject,
}

impl ConfirmChoice {
    pub fn toggled(self) -> Self {
        match self {
            ConfirmChoice::Accept => ConfirmChoice::Reject,
            ConfirmChoice::Reject => ConfirmChoice::Accept,
        }
    }

    pub fn label(self, locale: Locale) -> &'static str {
        match self {
            ConfirmChoice::Accept => YES.get(locale),
            ConfirmChoice::Reject => NO.get(locale),
        }
    }
}

const PROMPT: Localized = Localized {
    english: "Confirm selection?",
    hindi: "चयन की पुष्टि करें?",
    tamil: "தேர்வை உறுதிப்படுத்தவா?",
    telugu: "ఎంపికను నిర్ధారించాలా?",
};

const YES: Localized = Localized { english: "Yes", hindi: "हाँ", tamil: "ஆம்", telugu: "అవును" };

const NO: Localized = Localized { english: "No", hindi: "नहीं", tamil: "இல்லை", telugu: "కాదు" };

/// Borrowed view over the confirmation fields of a `NavigationContext`.
/// Has no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationView<'a> {
    pub entry: &'a MenuEntry,
    pub choice: ConfirmChoice,
}

impl ConfirmationView<'_> {
    pub fn prompt(&self, locale: Locale) -> String {
        format!("{} {}", self.entry.name.get(locale), PROMPT.get(locale))
    }
}
