//! Keyboard stand-in for the switch: raw terminal events in, logical signals out.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::core::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Signal(Signal),
    Quit,
}

/// At most one input per raw event. Key repeats and releases produce nothing.
pub fn normalize(event: &Event) -> Option<Input> {
    let Event::Key(KeyEvent {
        code, modifiers, kind, ..
    }) = event
    else {
        return None;
    };
    if *kind != KeyEventKind::Press {
        return None;
    }
    match code {
        KeyCode::Down => Some(Input::Signal(Signal::Next)),
        KeyCode::Char(' ') | KeyCode::Enter => Some(Input::Signal(Signal::Activate)),
        KeyCode::Esc => Some(Input::Signal(Signal::Exit)),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Input::Quit),
        KeyCode::Char('q') => Some(Input::Quit),
        _ => None,
    }
}

/// Restores cooked mode when dropped.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads the terminal on a blocking thread. Signals go out with `try_send`:
/// if the session has not caught up, the signal is lost rather than queued.
pub fn spawn_keyboard_reader(tx: Sender<Input>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || loop {
        let event = match event::read() {
            Ok(event) => event,
            Err(e) => {
                eprintln!("⚠️ Keyboard read failed: {}", e);
                let _ = tx.blocking_send(Input::Quit);
                break;
            }
        };
        match normalize(&event) {
            Some(Input::Quit) => {
                let _ = tx.blocking_send(Input::Quit);
                break;
            }
            Some(input) => {
                if let Err(TrySendError::Closed(_)) = tx.try_send(input) {
                    break;
                }
            }
            None => {}
        }
    })
}
