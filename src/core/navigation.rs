//! Single-switch navigation state machine.
//!
//! `apply` is synchronous and runs to completion before the next signal is
//! looked at. It never talks to the dispatcher itself: it returns an `Effect`
//! and the session performs it. Gating on an in-flight dispatch happens one
//! level up, in `Session::handle`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::catalog::{Catalog, MenuEntry};
use super::confirm::{ConfirmChoice, ConfirmationView};
use super::Signal;

/// Whether a selection passes through a yes/no gate before dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    #[default]
    Confirm,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    Confirming,
    Diversion,
}

/// Exactly one of these holds; the pending entry only exists while confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Browsing,
    Confirming { pending: usize, choice: ConfirmChoice },
    Diversion,
}

/// What the session has to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Highlighted(MenuEntry),
    ConfirmOpened(MenuEntry),
    ConfirmToggled(ConfirmChoice),
    Dispatch(MenuEntry),
    Cancelled,
    DiversionOpened,
    DiversionClosed,
}

#[derive(Debug, Clone)]
pub struct NavigationContext {
    catalog: Arc<Catalog>,
    flow: Flow,
    cursor: usize,
    phase: Phase,
}

impl NavigationContext {
    pub fn new(catalog: Arc<Catalog>, flow: Flow) -> Self {
        Self {
            catalog,
            flow,
            cursor: 0,
            phase: Phase::Browsing,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.phase {
            Phase::Browsing => Mode::Browsing,
            Phase::Confirming { .. } => Mode::Confirming,
            Phase::Diversion => Mode::Diversion,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn highlighted(&self) -> &MenuEntry {
        &self.catalog.entries()[self.cursor]
    }

    pub fn pending_entry(&self) -> Option<&MenuEntry> {
        match self.phase {
            Phase::Confirming { pending, .. } => self.catalog.get(pending),
            _ => None,
        }
    }

    pub fn confirm_choice(&self) -> Option<ConfirmChoice> {
        match self.phase {
            Phase::Confirming { choice, .. } => Some(choice),
            _ => None,
        }
    }

    pub fn confirmation(&self) -> Option<ConfirmationView<'_>> {
        match self.phase {
            Phase::Confirming { pending, choice } => self
                .catalog
                .get(pending)
                .map(|entry| ConfirmationView { entry, choice }),
            _ => None,
        }
    }

    /// Applies one signal. `None` means the signal has no meaning in the
    /// current mode and nothing changed.
    pub fn apply(&mut self, signal: Signal) -> Option<Effect> {
        match (self.phase, signal) {
            (Phase::Browsing, Signal::Next) => {
                self.cursor = (self.cursor + 1) % self.catalog.len();
                Some(Effect::Highlighted(self.highlighted().clone()))
            }
            (Phase::Browsing, Signal::Activate) => {
                let entry = self.highlighted().clone();
                if entry.is_diversion() {
                    self.phase = Phase::Diversion;
                    Some(Effect::DiversionOpened)
                } else {
                    match self.flow {
                        Flow::Confirm => {
                            self.phase = Phase::Confirming {
                                pending: self.cursor,
                                choice: ConfirmChoice::Accept,
                            };
                            Some(Effect::ConfirmOpened(entry))
                        }
                        Flow::Direct => {
                            self.cursor = 0;
                            Some(Effect::Dispatch(entry))
                        }
                    }
                }
            }
            (Phase::Browsing, Signal::Exit) => None,
            (Phase::Confirming { pending, choice }, Signal::Next) => {
                let choice = choice.toggled();
                self.phase = Phase::Confirming { pending, choice };
                Some(Effect::ConfirmToggled(choice))
            }
            (Phase::Confirming { pending, choice }, Signal::Activate) => {
                let entry = self.catalog.get(pending).cloned();
                self.return_to_menu();
                match (choice, entry) {
                    (ConfirmChoice::Accept, Some(entry)) => Some(Effect::Dispatch(entry)),
                    _ => Some(Effect::Cancelled),
                }
            }
            (Phase::Confirming { .. }, Signal::Exit) => {
                self.return_to_menu();
                Some(Effect::Cancelled)
            }
            (Phase::Diversion, Signal::Exit) => {
                self.return_to_menu();
                Some(Effect::DiversionClosed)
            }
            // The diversion owns NEXT/ACTIVATE while it is open.
            (Phase::Diversion, _) => None,
        }
    }

    fn return_to_menu(&mut self) {
        self.phase = Phase::Browsing;
        self.cursor = 0;
    }
}
