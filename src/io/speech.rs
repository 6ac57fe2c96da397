// Spoken feedback through the platform speech command.

use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use crate::core::catalog::Locale;

pub struct Speech {
    program: Option<&'static str>,
    current: Mutex<Option<Child>>,
}

impl Speech {
    /// `say` on macOS, `espeak` everywhere else.
    pub fn detect() -> Self {
        let program = if cfg!(target_os = "macos") { "say" } else { "espeak" };
        Self {
            program: Some(program),
            current: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            program: None,
            current: Mutex::new(None),
        }
    }

    /// Interrupts whatever is being spoken and starts `text`. Never waits.
    pub fn say(&self, text: &str, locale: Locale) {
        let Some(program) = self.program else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let mut cmd = Command::new(program);
        match program {
            "espeak" => {
                cmd.arg("-v").arg(voice_for(locale));
            }
            _ => {
                cmd.arg("-r").arg("180");
            }
        }
        cmd.arg(text).stdout(Stdio::null()).stderr(Stdio::null());

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut previous) = current.take() {
            let _ = previous.kill();
            let _ = previous.wait();
        }
        // A missing speech binary just means a silent session.
        *current = cmd.spawn().ok();
    }
}

fn voice_for(locale: Locale) -> &'static str {
    // espeak voice names are the language part of the tag.
    locale.speech_code().split('-').next().unwrap_or("en")
}
