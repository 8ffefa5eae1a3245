//! The access flow at a door terminal.
//!
//! Idle until the first keypress or card swipe. Typed digits collect
//! into a code; `#` submits it, `*` clears, and five seconds of silence
//! forgets a half-typed code. An RFID card counts as a fully typed code
//! and is debounced, since a held card repeats every few hundred
//! milliseconds. The verdict shows for two seconds (green/short high
//! buzz/open strike, or red/long low buzz/reason on the LCD), then the
//! terminal is idle again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use porter_auth::{Access, Authenticator};
use porter_core::constants::{CODE_ENTRY_TIMEOUT, FEEDBACK_HOLD, MAX_CODE_LENGTH, RFID_DEBOUNCE};
use porter_core::{DoorbellUi, Leds, PhysicalActions, Target, Tone};
use porter_terminal::{EventHandler, TerminalPort, TerminalResult};

use crate::dispatch::Backends;

const GRANT_BUZZ: Duration = Duration::from_millis(200);
const DENY_BUZZ: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Collecting { last_key: Instant },
    Granted { until: Instant },
    Denied { until: Instant },
}

pub struct AccessHandler {
    target: Target,
    auth: Arc<Authenticator>,
    actions: Arc<dyn PhysicalActions>,
    doorbell: Arc<dyn DoorbellUi>,
    state: State,
    buffer: String,
    /// Last RFID evaluation, for debouncing the card's re-emissions.
    last_rfid: Option<(String, Instant)>,
}

impl AccessHandler {
    #[must_use]
    pub fn new(target: Target, backends: &Backends) -> Self {
        Self {
            target,
            auth: Arc::clone(&backends.authenticator),
            actions: Arc::clone(&backends.actions),
            doorbell: Arc::clone(&backends.doorbell),
            state: State::Idle,
            buffer: String::new(),
            last_rfid: None,
        }
    }

    async fn show_idle(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        self.state = State::Idle;
        self.buffer.clear();
        term.show_leds(Leds::BLUE).await?;
        term.write_lcd(0, "Enter code or swipe").await?;
        term.write_lcd(1, "").await?;
        Ok(())
    }

    async fn show_collecting(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        let masked = "*".repeat(self.buffer.len());
        term.write_lcd(1, &masked).await
    }

    async fn evaluate(&mut self, term: &mut impl TerminalPort, code: &str) -> TerminalResult<()> {
        let access = self.auth.auth_user(code, self.target);
        self.buffer.clear();

        match access {
            Access::Granted => {
                info!(target = %self.target, "access granted");
                term.show_leds(Leds::GREEN).await?;
                term.buzz(Tone::High, GRANT_BUZZ).await?;
                term.write_lcd(0, "Welcome!").await?;
                term.write_lcd(1, "").await?;
                self.actions.open_door(self.target);
                self.state = State::Granted {
                    until: Instant::now() + FEEDBACK_HOLD,
                };
            }
            Access::Denied {
                reason,
                outside_hours,
            } => {
                info!(target = %self.target, %reason, "access denied");
                term.show_leds(Leds::RED).await?;
                term.buzz(Tone::Low, DENY_BUZZ).await?;
                term.write_lcd(0, "No access").await?;
                term.write_lcd(1, &reason).await?;
                if outside_hours {
                    // Valid code at the wrong hour rings the bell instead.
                    self.doorbell.handle_doorbell(self.target, &reason);
                }
                self.state = State::Denied {
                    until: Instant::now() + FEEDBACK_HOLD,
                };
            }
        }
        Ok(())
    }
}

impl EventHandler for AccessHandler {
    async fn init(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        self.show_idle(term).await
    }

    async fn handle_keypress(
        &mut self,
        term: &mut impl TerminalPort,
        key: char,
    ) -> TerminalResult<()> {
        match key {
            '0'..='9' => {
                if self.buffer.len() < MAX_CODE_LENGTH {
                    self.buffer.push(key);
                }
                self.state = State::Collecting {
                    last_key: Instant::now(),
                };
                self.show_collecting(term).await
            }
            '*' => self.show_idle(term).await,
            '#' => {
                if self.buffer.is_empty() {
                    return Ok(());
                }
                let code = std::mem::take(&mut self.buffer);
                self.evaluate(term, &code).await
            }
            other => {
                debug!(target = %self.target, key = %other, "ignoring unexpected key");
                Ok(())
            }
        }
    }

    async fn handle_rfid(&mut self, term: &mut impl TerminalPort, id: &str) -> TerminalResult<()> {
        if let Some((last_id, at)) = &self.last_rfid
            && last_id.as_str() == id
            && at.elapsed() < RFID_DEBOUNCE
        {
            return Ok(());
        }
        self.last_rfid = Some((id.to_string(), Instant::now()));
        self.evaluate(term, id).await
    }

    async fn handle_tick(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        match self.state {
            State::Idle => Ok(()),
            State::Collecting { last_key } => {
                if last_key.elapsed() >= CODE_ENTRY_TIMEOUT {
                    self.show_idle(term).await
                } else {
                    Ok(())
                }
            }
            State::Granted { until } | State::Denied { until } => {
                if Instant::now() >= until {
                    self.show_idle(term).await
                } else {
                    Ok(())
                }
            }
        }
    }

    fn shutdown(&mut self) {
        debug!(target = %self.target, "access handler shutting down");
    }
}
