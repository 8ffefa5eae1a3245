//! The enrollment flow at the control terminal.
//!
//! A member sponsors a new user in three steps: sponsor code (typed or
//! swiped), the new user's code, then an optional numeric contact
//! string. `#` submits each step, `*` abandons the whole flow, and
//! thirty seconds of silence does the same. The committed record is a
//! level `user` with the sponsor's name on it; real names and proper
//! contact details are filled in by hand later.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use porter_auth::{Authenticator, User};
use porter_core::constants::{
    ENROLLMENT_IDLE_TIMEOUT, FEEDBACK_HOLD, MAX_CODE_LENGTH, MIN_AUTH_CODE_LENGTH,
};
use porter_core::{Leds, Tone, UserLevel};
use porter_terminal::{EventHandler, TerminalPort, TerminalResult};

use crate::dispatch::Backends;

const PROMPT_SPONSOR: &str = "Swipe member card";
const PROMPT_NEW_CODE: &str = "New user code + #";
const PROMPT_CONTACT: &str = "Contact (opt) + #";

#[derive(Debug)]
enum State {
    AwaitSponsor,
    AwaitNewCode { sponsor: String },
    AwaitContact { sponsor: String, code: String },
    ShowingResult { until: Instant },
}

pub struct ControlHandler {
    auth: Arc<Authenticator>,
    state: State,
    buffer: String,
    last_input: Instant,
}

impl ControlHandler {
    #[must_use]
    pub fn new(backends: &Backends) -> Self {
        Self {
            auth: Arc::clone(&backends.authenticator),
            state: State::AwaitSponsor,
            buffer: String::new(),
            last_input: Instant::now(),
        }
    }

    async fn show_prompt(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        let prompt = match &self.state {
            State::AwaitSponsor => PROMPT_SPONSOR,
            State::AwaitNewCode { .. } => PROMPT_NEW_CODE,
            State::AwaitContact { .. } => PROMPT_CONTACT,
            State::ShowingResult { .. } => return Ok(()),
        };
        term.show_leds(Leds::BLUE).await?;
        term.write_lcd(0, prompt).await?;
        term.write_lcd(1, &"*".repeat(self.buffer.len())).await
    }

    async fn restart(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        self.state = State::AwaitSponsor;
        self.buffer.clear();
        self.show_prompt(term).await
    }

    async fn show_error(&mut self, term: &mut impl TerminalPort, text: &str) -> TerminalResult<()> {
        term.show_leds(Leds::RED).await?;
        term.buzz(Tone::Low, std::time::Duration::from_millis(500)).await?;
        term.write_lcd(0, "Rejected").await?;
        term.write_lcd(1, text).await?;
        self.buffer.clear();
        self.state = State::ShowingResult {
            until: Instant::now() + FEEDBACK_HOLD,
        };
        Ok(())
    }

    async fn show_success(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        term.show_leds(Leds::GREEN).await?;
        term.buzz(Tone::High, std::time::Duration::from_millis(200)).await?;
        term.write_lcd(0, "User added").await?;
        term.write_lcd(1, "").await?;
        self.buffer.clear();
        self.state = State::ShowingResult {
            until: Instant::now() + FEEDBACK_HOLD,
        };
        Ok(())
    }

    /// `#` was pressed (or a card swiped): feed the collected input to
    /// the step we are in.
    async fn submit(&mut self, term: &mut impl TerminalPort, input: String) -> TerminalResult<()> {
        match std::mem::replace(&mut self.state, State::AwaitSponsor) {
            State::AwaitSponsor => match self.auth.validate_sponsor(&input) {
                Ok(()) => {
                    debug!("sponsor accepted");
                    self.state = State::AwaitNewCode { sponsor: input };
                    self.buffer.clear();
                    self.show_prompt(term).await
                }
                Err(e) => {
                    warn!(error = %e, "sponsor rejected");
                    self.show_error(term, &e.to_string()).await
                }
            },
            State::AwaitNewCode { sponsor } => {
                if input.len() < MIN_AUTH_CODE_LENGTH {
                    return self.show_error(term, "Code too short").await;
                }
                if self.auth.find_user(&input).is_some() {
                    return self.show_error(term, "Code already in use").await;
                }
                self.state = State::AwaitContact {
                    sponsor,
                    code: input,
                };
                self.buffer.clear();
                self.show_prompt(term).await
            }
            State::AwaitContact { sponsor, code } => {
                let mut user = User::new("", UserLevel::User);
                user.contact_info = input;
                if user.set_auth_code(&code).is_err() {
                    return self.show_error(term, "Code too short").await;
                }
                match self.auth.add_new_user(&sponsor, user) {
                    Ok(()) => {
                        info!("enrolled new user at control terminal");
                        self.show_success(term).await
                    }
                    Err(e) => {
                        warn!(error = %e, "enrollment failed");
                        self.show_error(term, &e.to_string()).await
                    }
                }
            }
            state @ State::ShowingResult { .. } => {
                self.state = state;
                Ok(())
            }
        }
    }
}

impl EventHandler for ControlHandler {
    async fn init(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        self.show_prompt(term).await
    }

    async fn handle_keypress(
        &mut self,
        term: &mut impl TerminalPort,
        key: char,
    ) -> TerminalResult<()> {
        self.last_input = Instant::now();
        match key {
            '0'..='9' => {
                if matches!(self.state, State::ShowingResult { .. }) {
                    return Ok(());
                }
                if self.buffer.len() < MAX_CODE_LENGTH {
                    self.buffer.push(key);
                }
                self.show_prompt(term).await
            }
            '*' => self.restart(term).await,
            '#' => {
                // Only the contact step accepts an empty submission.
                if self.buffer.is_empty()
                    && matches!(self.state, State::AwaitSponsor | State::AwaitNewCode { .. })
                {
                    return Ok(());
                }
                let input = std::mem::take(&mut self.buffer);
                self.submit(term, input).await
            }
            other => {
                debug!(key = %other, "ignoring unexpected key");
                Ok(())
            }
        }
    }

    async fn handle_rfid(&mut self, term: &mut impl TerminalPort, id: &str) -> TerminalResult<()> {
        self.last_input = Instant::now();
        // A swipe is a complete code for the steps that want one.
        if matches!(
            self.state,
            State::AwaitSponsor | State::AwaitNewCode { .. }
        ) {
            self.buffer.clear();
            self.submit(term, id.to_string()).await
        } else {
            Ok(())
        }
    }

    async fn handle_tick(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        match &self.state {
            State::ShowingResult { until } => {
                if Instant::now() >= *until {
                    self.restart(term).await
                } else {
                    Ok(())
                }
            }
            State::AwaitSponsor if self.buffer.is_empty() => Ok(()),
            State::AwaitSponsor | State::AwaitNewCode { .. } | State::AwaitContact { .. } => {
                if self.last_input.elapsed() >= ENROLLMENT_IDLE_TIMEOUT {
                    debug!("enrollment abandoned, resetting");
                    self.restart(term).await
                } else {
                    Ok(())
                }
            }
        }
    }

    fn shutdown(&mut self) {
        debug!("control handler shutting down");
    }
}
