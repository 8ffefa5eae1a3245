//! Connection lifecycle around the terminal driver.
//!
//! Two tasks cooperate per connected terminal: a reader that owns the
//! input half of the link and sorts lines into event and response
//! queues, and the driver/event loop that owns the output half. The
//! queues are small and lossy so a babbling firmware can slow us down
//! but never deadlock us.
//!
//! Teardown is one-way: any error makes the event loop return, the
//! [`Connection`] is dropped, and dropping aborts the reader task and
//! closes the transport halves — aborting the blocked read is our
//! cancellation primitive. The per-endpoint supervisor then reconnects
//! with exponential backoff.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use porter_core::constants::{
    IDLE_TICK, INITIAL_RECONNECT_DELAY, LIVENESS_PING_TICKS, MAX_RECONNECT_DELAY, QUEUE_DEPTH,
};

use crate::codec::{Event, Line, TerminalCodec};
use crate::error::{TerminalError, TerminalResult};
use crate::terminal::{EventHandler, Terminal, TerminalPort};

/// Read the input side of the link and sort lines into the right queue.
/// Exits on any read error or when either queue's receiver is gone.
async fn read_loop<R: AsyncRead + Unpin>(
    reader: R,
    events: mpsc::Sender<Event>,
    responses: mpsc::Sender<String>,
    log_prefix: String,
) {
    let mut framed = FramedRead::new(reader, TerminalCodec::new());
    loop {
        match framed.next().await {
            Some(Ok(Line::Event(event))) => match events.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(prefix = %log_prefix, ?event, "event queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            },
            Some(Ok(Line::Response(line))) => match responses.try_send(line) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(line)) => {
                    warn!(prefix = %log_prefix, %line, "response queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            },
            Some(Err(e)) => {
                warn!(prefix = %log_prefix, error = %e, "reading input");
                return;
            }
            None => {
                debug!(prefix = %log_prefix, "input side closed");
                return;
            }
        }
    }
}

/// One live terminal connection: the driver plus its reader task.
pub struct Connection<T> {
    terminal: Terminal<WriteHalf<T>>,
    reader: JoinHandle<()>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split the transport, start the reader and run the connect
    /// handshake (input drain + name request).
    ///
    /// # Errors
    /// Anything failing here means this connection never becomes
    /// usable; the caller should back off and retry.
    pub async fn establish(transport: T, log_prefix: impl Into<String>) -> TerminalResult<Self> {
        let log_prefix = log_prefix.into();
        let (read_half, write_half) = tokio::io::split(transport);

        let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);
        let (response_tx, response_rx) = mpsc::channel(QUEUE_DEPTH);
        let reader = tokio::spawn(read_loop(
            read_half,
            event_tx,
            response_tx,
            log_prefix.clone(),
        ));

        match Terminal::connect(write_half, response_rx, event_rx, log_prefix).await {
            Ok(terminal) => Ok(Self { terminal, reader }),
            Err(e) => {
                reader.abort();
                Err(e)
            }
        }
    }

    /// Name the terminal reported during the handshake.
    #[must_use]
    pub fn terminal_name(&self) -> &str {
        self.terminal.name()
    }

    /// Direct access to the driver, for callers running their own loop.
    pub fn terminal_mut(&mut self) -> &mut Terminal<WriteHalf<T>> {
        &mut self.terminal
    }

    /// Drive `handler` with this terminal's events until the connection
    /// dies. Ticks fire every 500 ms while idle, with a liveness name
    /// ping every ten ticks; when events pour in fast enough to starve
    /// the idle arm, a tick is injected so handler timers still advance.
    ///
    /// # Errors
    /// Always returns an error eventually: the loop only ends when the
    /// connection is lost or misbehaving.
    pub async fn run<H: EventHandler>(&mut self, handler: &mut H) -> TerminalResult<()> {
        let term = &mut self.terminal;
        let mut tick_count: u32 = 0;
        let mut last_tick = Instant::now();

        handler.init(term).await?;
        loop {
            if last_tick.elapsed() > IDLE_TICK * 4 {
                handler.handle_tick(term).await?;
                last_tick = Instant::now();
            }
            tokio::select! {
                maybe_event = term.next_event() => {
                    match maybe_event {
                        Some(Event::Keypress(key)) => handler.handle_keypress(term, key).await?,
                        Some(Event::Rfid(id)) => handler.handle_rfid(term, &id).await?,
                        None => return Err(TerminalError::ConnectionClosed),
                    }
                }
                _ = tokio::time::sleep(IDLE_TICK) => {
                    handler.handle_tick(term).await?;
                    last_tick = Instant::now();
                    tick_count += 1;
                    if tick_count % LIVENESS_PING_TICKS == 0 {
                        term.verify_connected().await?;
                    }
                }
            }
        }
    }
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reconnect delay schedule: doubles per failure, capped, reset on a
/// successful connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: INITIAL_RECONNECT_DELAY,
        }
    }

    /// The delay to sleep before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(MAX_RECONNECT_DELAY);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = INITIAL_RECONNECT_DELAY;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Supervise one serial endpoint forever.
///
/// `open` produces a fresh transport per attempt (reopening the serial
/// device); `dispatch` maps the terminal's self-reported name to an
/// event handler, or `None` for names we do not recognize. Failed
/// attempts back off exponentially; a session that got as far as running
/// a handler resets the backoff and reconnects immediately.
pub async fn run_endpoint<T, H>(
    label: String,
    mut open: impl AsyncFnMut() -> std::io::Result<T>,
    mut dispatch: impl FnMut(&str) -> Option<H>,
) where
    T: AsyncRead + AsyncWrite + Send + 'static,
    H: EventHandler,
{
    let mut backoff = Backoff::new();
    loop {
        match run_session(&label, &mut open, &mut dispatch).await {
            Ok(()) => backoff.reset(),
            Err(e) => {
                let delay = backoff.next_delay();
                debug!(%label, error = %e, ?delay, "connect failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One connect-serve-teardown cycle.
///
/// `Ok(())` means a handler ran and the connection later died (retry
/// immediately); `Err` means the session never became serviceable.
async fn run_session<T, H>(
    label: &str,
    open: &mut impl AsyncFnMut() -> std::io::Result<T>,
    dispatch: &mut impl FnMut(&str) -> Option<H>,
) -> TerminalResult<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    H: EventHandler,
{
    let transport = open().await?;
    let mut connection = Connection::establish(transport, label.to_string()).await?;

    let name = connection.terminal_name().to_string();
    let Some(mut handler) = dispatch(&name) else {
        warn!(%label, %name, "terminal with unrecognized name");
        return Err(TerminalError::UnknownTerminal(name));
    };

    info!(%label, %name, "connected");
    let result = connection.run(&mut handler).await;
    handler.shutdown();
    if let Err(e) = result {
        info!(%label, %name, error = %e, "connection lost");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new();
        let mut delays = Vec::new();
        for _ in 0..7 {
            delays.push(backoff.next_delay().as_secs());
        }
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_RECONNECT_DELAY);
    }
}
