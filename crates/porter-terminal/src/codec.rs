//! Framing and classification for the terminal wire protocol.
//!
//! All traffic is ASCII lines terminated by `\n`. The first character of
//! a line decides what it is:
//!
//! - `K<c>` — one keypress, `c` in `0-9*#`
//! - `I<hexid>` — an RFID card currently held at the reader
//! - `#` or NUL — firmware comment or line noise, dropped
//! - anything else — the response to the command in flight, echoing its
//!   opcode as the first character
//!
//! The codec decodes incoming bytes into classified [`Line`]s and
//! encodes outgoing [`Command`]s. It does not enforce the
//! request/response discipline; that is the driver's job.

use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};

use porter_core::{Leds, Tone};

use crate::error::TerminalError;

/// Lines longer than this are not protocol traffic but a wedged or
/// misconfigured link; give up on the connection rather than buffer.
const MAX_LINE_LENGTH: usize = 256;

/// A spontaneous input event from the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One key typed on the pad.
    Keypress(char),
    /// The ID of an RFID card held at the reader. Repeats every few
    /// hundred milliseconds while the card is present.
    Rfid(String),
}

/// One classified line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Event(Event),
    Response(String),
}

/// A command the controller can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the terminal for its self-reported name.
    RequestName,
    /// Set the LED state.
    SetLeds(Leds),
    /// Buzz the speaker for the given duration.
    Buzz { tone: Tone, duration: Duration },
    /// Write one LCD row. The text is sent as given; truncation and
    /// coalescing happen in the driver.
    WriteLcd { row: usize, text: String },
}

impl Command {
    /// The opcode character this command starts with; the terminal's
    /// reply echoes it.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Command::RequestName => b'n',
            Command::SetLeds(_) => b'L',
            Command::Buzz { .. } => b'T',
            Command::WriteLcd { .. } => b'M',
        }
    }
}

#[derive(Debug, Default)]
pub struct TerminalCodec;

impl TerminalCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn classify(text: &str) -> Option<Line> {
    match text.as_bytes().first() {
        None | Some(b'#') | Some(0) => None,
        Some(b'K') => text[1..].chars().next().map(|c| Line::Event(Event::Keypress(c))),
        Some(b'I') => {
            let id = text[1..].trim();
            if id.is_empty() {
                None
            } else {
                Some(Line::Event(Event::Rfid(id.to_string())))
            }
        }
        Some(_) => Some(Line::Response(text.to_string())),
    }
}

impl Decoder for TerminalCodec {
    type Item = Line;
    type Error = TerminalError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Line>, TerminalError> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(TerminalError::LineTooLong {
                        max: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            };
            let raw = src.split_to(pos + 1);
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(line) = classify(text.trim_end_matches('\r')) {
                return Ok(Some(line));
            }
            // comment or garbage, keep scanning
        }
    }
}

impl Encoder<Command> for TerminalCodec {
    type Error = TerminalError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), TerminalError> {
        match command {
            Command::RequestName => dst.put_u8(b'n'),
            Command::SetLeds(leds) => {
                dst.put_u8(b'L');
                dst.put_slice(leds.encode().as_bytes());
            }
            Command::Buzz { tone, duration } => {
                dst.put_u8(b'T');
                dst.put_u8(tone.code() as u8);
                dst.put_slice(duration.as_millis().to_string().as_bytes());
            }
            Command::WriteLcd { row, text } => {
                dst.put_u8(b'M');
                dst.put_slice(row.to_string().as_bytes());
                dst.put_slice(text.as_bytes());
            }
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}
