//! Terminal I/O for the porter access controller.
//!
//! A terminal is a microcontroller with keypad, RFID reader, LCD, LEDs
//! and buzzer on the far end of a serial line, speaking a line-oriented
//! ASCII protocol: single-char opcode, payload, `\n`. The controller
//! sends commands and the terminal echoes the opcode in its reply;
//! keypresses and card reads arrive spontaneously in between.
//!
//! Layering, bottom up:
//!
//! - [`codec`] — framing and line classification (tokio-util codec)
//! - [`terminal`] — the [`Terminal`] driver: strictly sequenced
//!   request/response with timeout, LCD write coalescing, liveness ping
//! - [`connection`] — reader task + event loop + per-endpoint supervisor
//!   with exponential reconnect backoff
//!
//! Everything is generic over `AsyncRead + AsyncWrite`, so tests drive a
//! terminal over [`tokio::io::duplex`] and production code hands in a
//! serial stream.

pub mod codec;
pub mod connection;
pub mod error;
pub mod terminal;

pub use codec::{Command, Event, Line, TerminalCodec};
pub use connection::{Backoff, Connection, run_endpoint};
pub use error::{TerminalError, TerminalResult};
pub use terminal::{EventHandler, Terminal, TerminalPort};
