//! One user's interactive session: navigation plus the dispatcher it feeds.

use colored::*;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

use super::dispatcher::{DispatchOutcome, Dispatcher, InFlightDispatch};
use super::feedback::Presenter;
use super::navigation::{Effect, NavigationContext};
use super::phrases;
use super::state::SettingsHandle;
use super::Signal;
use crate::io::console::line;
use crate::io::input::Input;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// A dispatch was in flight; the signal is gone.
    Dropped,
    /// Meaningless in the current mode.
    Ignored,
    Applied(Effect),
}

pub struct Session {
    nav: NavigationContext,
    dispatcher: Dispatcher,
    presenter: Arc<dyn Presenter>,
    settings: SettingsHandle,
    pending: Option<InFlightDispatch>,
}

impl Session {
    pub fn new(
        nav: NavigationContext,
        dispatcher: Dispatcher,
        presenter: Arc<dyn Presenter>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            nav,
            dispatcher,
            presenter,
            settings,
            pending: None,
        }
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.nav
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The most recent dispatch started by this session, if not yet taken.
    pub fn take_pending(&mut self) -> Option<InFlightDispatch> {
        self.pending.take()
    }

    /// Applies one signal to completion. Nothing is queued: a signal that
    /// arrives while a dispatch is in flight is discarded.
    pub fn handle(&mut self, signal: Signal) -> Handled {
        if !self.dispatcher.accepts_input() {
            return Handled::Dropped;
        }
        let Some(effect) = self.nav.apply(signal) else {
            return Handled::Ignored;
        };
        self.perform(&effect);
        Handled::Applied(effect)
    }

    fn perform(&mut self, effect: &Effect) {
        let locale = self.settings.current().locale;
        match effect {
            Effect::Highlighted(entry) => self.presenter.announce(entry.name.get(locale)),
            Effect::ConfirmOpened(_) => {
                if let Some(view) = self.nav.confirmation() {
                    self.presenter.announce(&view.prompt(locale));
                }
            }
            Effect::ConfirmToggled(choice) => self.presenter.announce(choice.label(locale)),
            Effect::Dispatch(entry) => {
                self.presenter
                    .announce(&phrases::selected(entry.name.get(locale), locale));
                match self.dispatcher.dispatch(entry.clone(), locale) {
                    Ok(pending) => self.pending = Some(pending),
                    Err(e) => eprintln!("{} {}", "⚠️".red(), e),
                }
            }
            Effect::Cancelled => self.presenter.announce(self.nav.highlighted().name.get(locale)),
            Effect::DiversionOpened => self.presenter.announce(phrases::opening_diversion(locale)),
            Effect::DiversionClosed => self.presenter.announce(self.nav.highlighted().name.get(locale)),
        }
    }

    fn ready(&self) {
        let locale = self.settings.current().locale;
        line(&format!("{} {}", "▶".cyan(), self.nav.highlighted().name.get(locale).bold()));
    }
}

/// Drives a session from the input channel until `Quit` or the sender closes.
/// Outcome changes are watched alongside so the ready line reappears once a
/// dispatch has cleared.
pub async fn session_loop(mut input_rx: Receiver<Input>, mut session: Session) -> Session {
    line(&"👁️  EyesTalk session: ONLINE".green().bold().to_string());
    let mut outcomes = session.dispatcher.subscribe();
    session.ready();

    loop {
        tokio::select! {
            biased;

            changed = outcomes.changed() => {
                if changed.is_err() {
                    break;
                }
                let outcome = *outcomes.borrow_and_update();
                if outcome == DispatchOutcome::Idle {
                    session.ready();
                }
            }
            input = input_rx.recv() => match input {
                Some(Input::Signal(signal)) => {
                    if session.handle(signal) == Handled::Dropped {
                        line(&format!("   {} {:?} ignored while sending", "⏳".yellow(), signal));
                    }
                }
                Some(Input::Quit) | None => break,
            },
        }
    }

    line(&"👋 Session closed.".green().to_string());
    session
}
