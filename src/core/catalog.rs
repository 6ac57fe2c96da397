//! Static request catalog shown to the user.
//!
//! The catalog is loaded once at startup and never mutated; every other part
//! of the session refers to entries by position or by `id`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Id of the entry that opens the entertainment diversion instead of alerting.
pub const DIVERSION_ID: &str = "entertainment";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Hindi,
    Tamil,
    Telugu,
}

impl Locale {
    pub const ALL: [Locale; 4] = [Locale::English, Locale::Hindi, Locale::Tamil, Locale::Telugu];

    /// BCP-47 tag handed to the speech engine.
    pub fn speech_code(self) -> &'static str {
        match self {
            Locale::English => "en-US",
            Locale::Hindi => "hi-IN",
            Locale::Tamil => "ta-IN",
            Locale::Telugu => "te-IN",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Locale::English => "english",
            Locale::Hindi => "hindi",
            Locale::Tamil => "tamil",
            Locale::Telugu => "telugu",
        }
    }

    /// Capitalised id, used in caregiver alerts.
    pub fn display_name(self) -> &'static str {
        match self {
            Locale::English => "English",
            Locale::Hindi => "Hindi",
            Locale::Tamil => "Tamil",
            Locale::Telugu => "Telugu",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Locale::ALL
            .into_iter()
            .find(|l| l.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown locale: {}", s))
    }
}

/// One string per supported locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Localized {
    pub english: &'static str,
    pub hindi: &'static str,
    pub tamil: &'static str,
    pub telugu: &'static str,
}

impl Localized {
    pub fn get(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::English => self.english,
            Locale::Hindi => self.hindi,
            Locale::Tamil => self.tamil,
            Locale::Telugu => self.telugu,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub id: &'static str,
    pub name: Localized,
    pub description: Localized,
    /// Opaque handle for whatever renders the card.
    pub icon: &'static str,
}

impl MenuEntry {
    pub fn is_diversion(&self) -> bool {
        self.id == DIVERSION_ID
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<MenuEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<MenuEntry>) -> Result<Self> {
        if entries.is_empty() {
            bail!("Catalog must contain at least one entry");
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.id) {
                bail!("Duplicate catalog id: {}", entry.id);
            }
        }
        Ok(Self { entries })
    }

    /// The six-entry catalog the device ships with.
    pub fn standard() -> Self {
        Self {
            entries: standard_entries(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MenuEntry> {
        self.entries.get(index)
    }

    pub fn find(&self, id: &str) -> Option<&MenuEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }
}

fn standard_entries() -> Vec<MenuEntry> {
    vec![
        MenuEntry {
            id: "food",
            name: Localized { english: "Food", hindi: "खाना", tamil: "உணவு", telugu: "ఆహారం" },
            description: Localized {
                english: "Request a meal or snack",
                hindi: "भोजन या नाश्ते का अनुरोध करें",
                tamil: "உணவு அல்லது சிற்றுண்டி கோருங்கள்",
                telugu: "భోజనం లేదా అల్పాహారం అభ్యర్థించండి",
            },
            icon: "utensils",
        },
        MenuEntry {
            id: "water",
            name: Localized { english: "Water", hindi: "पानी", tamil: "தண்ணீர்", telugu: "నీరు" },
            description: Localized {
                english: "Ask for a drink of water",
                hindi: "पानी पीने के लिए कहें",
                tamil: "குடிப்பதற்கு தண்ணீர் கேட்கவும்",
                telugu: "త్రాగడానికి నీరు అడగండి",
            },
            icon: "droplets",
        },
        MenuEntry {
            id: "help",
            name: Localized { english: "Help", hindi: "मदद", tamil: "உதவி", telugu: "సహాయం" },
            description: Localized {
                english: "Call for assistance",
                hindi: "सहायता के लिए बुलाएं",
                tamil: "உதவிக்கு அழைக்கவும்",
                telugu: "సహాయం కోసం కాల్ చేయండి",
            },
            icon: "phone",
        },
        MenuEntry {
            id: "outing",
            name: Localized { english: "Outing", hindi: "बाहर जाना", tamil: "வெளிச்செலவு", telugu: "విహారయాత్ర" },
            description: Localized {
                english: "Request to go outside",
                hindi: "बाहर जाने का अनुरोध करें",
                tamil: "வெளியே செல்லக் கோருங்கள்",
                telugu: "బయటికి వెళ్లాలని అభ్యర్థించండి",
            },
            icon: "accessibility",
        },
        MenuEntry {
            id: "washroom",
            name: Localized { english: "Washroom", hindi: "शौचालय", tamil: "கழிவறை", telugu: "వాష్రూమ్" },
            description: Localized {
                english: "Request to use the washroom",
                hindi: "शौचालय का उपयोग करने का अनुरोध करें",
                tamil: "கழிப்பறையைப் பயன்படுத்தக் கோருங்கள்",
                telugu: "వాష్రూమ్ ఉపయోగించడానికి అభ్యర్థించండి",
            },
            icon: "wind",
        },
        MenuEntry {
            id: DIVERSION_ID,
            name: Localized { english: "Entertainment", hindi: "मनोरंजन", tamil: "பொழுதுபோக்கு", telugu: "వినోదం" },
            description: Localized {
                english: "Watch short videos",
                hindi: "छोटे वीडियो देखें",
                tamil: "குறுகிய வீடியோக்களைப் பார்க்கவும்",
                telugu: "చిన్న వీడియోలను చూడండి",
            },
            icon: "tv",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_order() {
        let catalog = Catalog::standard();
        let ids: Vec<&str> = catalog.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, ["food", "water", "help", "outing", "washroom", "entertainment"]);
        assert!(catalog.find(DIVERSION_ID).unwrap().is_diversion());
        assert_eq!(catalog.get(2).unwrap().name.get(Locale::Hindi), "मदद");
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(Catalog::new(vec![]).is_err());
        let food = Catalog::standard().get(0).unwrap().clone();
        assert!(Catalog::new(vec![food.clone(), food]).is_err());
    }

    #[test]
    fn test_locale_parse() {
        assert_eq!("Tamil".parse::<Locale>().unwrap(), Locale::Tamil);
        assert!("klingon".parse::<Locale>().is_err());
    }
}
