//! The terminal driver.
//!
//! [`Terminal`] owns the command side of one connected device. Commands
//! are strictly sequenced: each is written and fully acknowledged (or
//! failed) before the next one goes out. The terminal echoes the
//! command's opcode as the first character of its reply; any other reply,
//! or silence for two seconds, means the link is bad and the connection
//! is abandoned.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use porter_core::constants::{DRAIN_SILENCE, MAX_LCD_COLS, MAX_LCD_ROWS, RESPONSE_TIMEOUT};
use porter_core::{Leds, Tone};

use crate::codec::{Command, Event, TerminalCodec};
use crate::error::{TerminalError, TerminalResult};

/// What an event handler may do with its terminal.
///
/// Handlers are written against this trait so they can be exercised with
/// a scripted port in tests; [`Terminal`] is the production
/// implementation.
pub trait TerminalPort {
    /// The terminal's self-reported name.
    fn name(&self) -> &str;

    /// Set the LED state.
    async fn show_leds(&mut self, leds: Leds) -> TerminalResult<()>;

    /// Buzz the speaker.
    async fn buzz(&mut self, tone: Tone, duration: Duration) -> TerminalResult<()>;

    /// Write one LCD row, truncating to the display width. Rewriting a
    /// row with its current content sends nothing.
    async fn write_lcd(&mut self, row: usize, text: &str) -> TerminalResult<()>;
}

/// Callback interface driven by a terminal's event loop.
///
/// Each method should return quickly; anything time-dependent belongs in
/// `handle_tick`, which fires roughly every 500 ms while the terminal is
/// idle. An `Err` from any method abandons the connection.
pub trait EventHandler: Send {
    /// Called once when the terminal is connected and identified.
    async fn init(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()>;

    /// One keypad character, in `0-9`, `*`, `#`.
    async fn handle_keypress(
        &mut self,
        term: &mut impl TerminalPort,
        key: char,
    ) -> TerminalResult<()>;

    /// An RFID card is present; repeats while it is held to the reader.
    async fn handle_rfid(&mut self, term: &mut impl TerminalPort, id: &str) -> TerminalResult<()>;

    /// Idle tick for timers.
    async fn handle_tick(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()>;

    /// The connection to this handler is going away.
    fn shutdown(&mut self);
}

/// Driver for one connected terminal.
pub struct Terminal<W> {
    sink: FramedWrite<W, TerminalCodec>,
    responses: mpsc::Receiver<String>,
    events: mpsc::Receiver<Event>,
    name: String,
    last_lcd: [Option<String>; MAX_LCD_ROWS],
    log_prefix: String,
}

impl<W: AsyncWrite + Unpin> Terminal<W> {
    /// Bring up the driver on a freshly opened link: drain whatever
    /// stale bytes the line holds, then learn the terminal's name.
    ///
    /// # Errors
    /// Fails when the link dies or the name request gets no well-formed
    /// answer; the connection is useless then.
    pub async fn connect(
        writer: W,
        responses: mpsc::Receiver<String>,
        events: mpsc::Receiver<Event>,
        log_prefix: String,
    ) -> TerminalResult<Self> {
        let mut terminal = Self {
            sink: FramedWrite::new(writer, TerminalCodec::new()),
            responses,
            events,
            name: String::new(),
            last_lcd: Default::default(),
            log_prefix,
        };
        terminal.discard_initial_input().await?;
        terminal.name = terminal.request_name().await?;
        Ok(terminal)
    }

    /// The first connect may catch the line mid-sentence with
    /// undiscarded input. Send one dummy name request to blow out the
    /// TX side, then discard everything that arrives until the link has
    /// been quiet for a second.
    async fn discard_initial_input(&mut self) -> TerminalResult<()> {
        self.sink.send(Command::RequestName).await?;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(DRAIN_SILENCE) => return Ok(()),
                response = self.responses.recv() => {
                    if response.is_none() {
                        return Err(TerminalError::ConnectionClosed);
                    }
                }
                event = self.events.recv() => {
                    if event.is_none() {
                        return Err(TerminalError::ConnectionClosed);
                    }
                }
            }
        }
    }

    /// Send one command and wait for the matching reply.
    async fn send_and_await(&mut self, command: Command) -> TerminalResult<String> {
        let opcode = command.opcode();
        self.sink.send(command).await?;

        match tokio::time::timeout(RESPONSE_TIMEOUT, self.responses.recv()).await {
            Ok(Some(line)) if line.as_bytes().first() == Some(&opcode) => Ok(line),
            Ok(Some(line)) => {
                warn!(
                    prefix = %self.log_prefix,
                    expected = %(opcode as char),
                    got = %line,
                    "unexpected response"
                );
                Err(TerminalError::UnexpectedResponse {
                    expected: opcode as char,
                    got: line,
                })
            }
            Ok(None) => Err(TerminalError::ConnectionClosed),
            // The terminal answers immediately or not at all.
            Err(_) => Err(TerminalError::ResponseTimeout(RESPONSE_TIMEOUT)),
        }
    }

    /// Ask the terminal for its name.
    pub async fn request_name(&mut self) -> TerminalResult<String> {
        let reply = self.send_and_await(Command::RequestName).await?;
        Ok(reply[1..].trim().to_string())
    }

    /// Re-request the name and compare: detects a cable swapped to a
    /// different terminal or a rebooted one.
    ///
    /// # Errors
    /// `NameChanged` when a different terminal answers; I/O and timeout
    /// errors as usual.
    pub async fn verify_connected(&mut self) -> TerminalResult<()> {
        let now = self.request_name().await?;
        if now != self.name {
            warn!(prefix = %self.log_prefix, was = %self.name, %now, "terminal name changed");
            return Err(TerminalError::NameChanged {
                was: self.name.clone(),
                now,
            });
        }
        Ok(())
    }

    /// The next spontaneous event, `None` when the reader is gone.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

impl<W: AsyncWrite + Unpin> TerminalPort for Terminal<W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn show_leds(&mut self, leds: Leds) -> TerminalResult<()> {
        self.send_and_await(Command::SetLeds(leds)).await?;
        Ok(())
    }

    async fn buzz(&mut self, tone: Tone, duration: Duration) -> TerminalResult<()> {
        self.send_and_await(Command::Buzz { tone, duration }).await?;
        Ok(())
    }

    async fn write_lcd(&mut self, row: usize, text: &str) -> TerminalResult<()> {
        if row >= MAX_LCD_ROWS {
            return Ok(());
        }
        let text: String = text.chars().take(MAX_LCD_COLS).collect();
        // Skip the write if the row already shows this; spares the LCD
        // and the link.
        if self.last_lcd[row].as_deref() == Some(text.as_str()) {
            return Ok(());
        }
        self.send_and_await(Command::WriteLcd {
            row,
            text: text.clone(),
        })
        .await?;
        debug!(prefix = %self.log_prefix, row, %text, "lcd");
        self.last_lcd[row] = Some(text);
        Ok(())
    }
}
