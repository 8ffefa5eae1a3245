//! Driver and connection behavior against a scripted peer on an
//! in-memory duplex pipe. Time is paused, so the protocol timeouts and
//! the backoff delays elapse instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use porter_core::{Leds, Tone};
use porter_terminal::{Connection, Event, EventHandler, TerminalError, TerminalPort};

/// How the peer answers commands.
#[derive(Clone, Copy, PartialEq)]
enum ReplyMode {
    /// Echo the command line back (opcode matches); `n` gets the name.
    Echo,
    /// Answer with a line starting with the wrong opcode.
    WrongOpcode,
    /// Say nothing at all, but keep the line open.
    Mute,
}

/// Scripted far end of the serial link: answers `n` with its current
/// name, logs every command, and lets the test inject raw lines
/// (events) at any point.
struct FakePeer {
    name: Arc<Mutex<String>>,
    mode: Arc<Mutex<ReplyMode>>,
    commands: Arc<Mutex<Vec<String>>>,
    inject: mpsc::UnboundedSender<String>,
}

impl FakePeer {
    fn spawn(stream: DuplexStream, name: &str) -> Self {
        let name = Arc::new(Mutex::new(name.to_string()));
        let mode = Arc::new(Mutex::new(ReplyMode::Echo));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (inject, mut inject_rx) = mpsc::unbounded_channel::<String>();

        let peer_name = Arc::clone(&name);
        let peer_mode = Arc::clone(&mode);
        let peer_commands = Arc::clone(&commands);
        tokio::spawn(async move {
            let (mut read, mut write) = tokio::io::split(stream);
            let mut buf = [0u8; 256];
            let mut pending = String::new();
            loop {
                tokio::select! {
                    injected = inject_rx.recv() => {
                        let Some(line) = injected else { return };
                        if write.write_all(line.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    n = read.read(&mut buf) => {
                        let Ok(n) = n else { return };
                        if n == 0 {
                            return;
                        }
                        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(pos) = pending.find('\n') {
                            let line: String = pending.drain(..=pos).take(pos).collect();
                            peer_commands.lock().unwrap().push(line.clone());
                            let mode = *peer_mode.lock().unwrap();
                            let reply = match mode {
                                ReplyMode::Mute => continue,
                                ReplyMode::WrongOpcode => "X?\n".to_string(),
                                ReplyMode::Echo if line.starts_with('n') => {
                                    format!("n{}\n", peer_name.lock().unwrap())
                                }
                                ReplyMode::Echo => format!("{line}\n"),
                            };
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self {
            name,
            mode,
            commands,
            inject,
        }
    }

    fn set_name(&self, name: &str) {
        *self.name.lock().unwrap() = name.to_string();
    }

    fn set_mode(&self, mode: ReplyMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn inject(&self, line: &str) {
        self.inject.send(line.to_string()).unwrap();
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn lcd_writes(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with('M'))
            .collect()
    }
}

async fn connected_pair(name: &str) -> (Connection<DuplexStream>, FakePeer) {
    let (ours, theirs) = tokio::io::duplex(1024);
    let peer = FakePeer::spawn(theirs, name);
    let connection = Connection::establish(ours, "test").await.unwrap();
    (connection, peer)
}

#[tokio::test(start_paused = true)]
async fn handshake_learns_terminal_name() {
    let (connection, peer) = connected_pair("upstairs").await;
    assert_eq!(connection.terminal_name(), "upstairs");

    // The drain sent one dummy name request before the real one.
    let commands = peer.commands();
    assert!(commands.len() >= 2);
    assert!(commands.iter().all(|c| c == "n"));
}

#[tokio::test(start_paused = true)]
async fn handshake_fails_when_terminal_is_mute() {
    let (ours, theirs) = tokio::io::duplex(1024);
    let peer = FakePeer::spawn(theirs, "upstairs");
    peer.set_mode(ReplyMode::Mute);

    let result = Connection::establish(ours, "test").await;
    assert!(matches!(result, Err(TerminalError::ResponseTimeout(_))));
}

#[tokio::test(start_paused = true)]
async fn event_line_does_not_corrupt_response_channel() {
    let (mut connection, peer) = connected_pair("gate").await;
    let term = connection.terminal_mut();

    // A keypress arrives while a command is in flight.
    peer.inject("K5\n");
    term.show_leds(Leds::GREEN).await.unwrap();

    assert_eq!(term.next_event().await, Some(Event::Keypress('5')));
}

#[tokio::test(start_paused = true)]
async fn response_timeout_fails_the_command() {
    let (mut connection, peer) = connected_pair("gate").await;

    peer.set_mode(ReplyMode::Mute);
    let result = connection
        .terminal_mut()
        .buzz(Tone::High, Duration::from_millis(200))
        .await;
    assert!(matches!(result, Err(TerminalError::ResponseTimeout(_))));
}

#[tokio::test(start_paused = true)]
async fn wrong_opcode_fails_the_command() {
    let (mut connection, peer) = connected_pair("gate").await;

    peer.set_mode(ReplyMode::WrongOpcode);
    let result = connection.terminal_mut().show_leds(Leds::RED).await;
    assert!(matches!(
        result,
        Err(TerminalError::UnexpectedResponse { expected: 'L', .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn identical_lcd_writes_are_coalesced() {
    let (mut connection, peer) = connected_pair("gate").await;
    let term = connection.terminal_mut();

    term.write_lcd(0, "Hello").await.unwrap();
    term.write_lcd(0, "Hello").await.unwrap();
    term.write_lcd(0, "Hello").await.unwrap();
    assert_eq!(peer.lcd_writes(), vec!["M0Hello"]);

    // Different content writes again; each row coalesces independently.
    term.write_lcd(0, "Other").await.unwrap();
    term.write_lcd(1, "Hello").await.unwrap();
    assert_eq!(peer.lcd_writes(), vec!["M0Hello", "M0Other", "M1Hello"]);
}

#[tokio::test(start_paused = true)]
async fn lcd_text_is_truncated_to_display_width() {
    let (mut connection, peer) = connected_pair("gate").await;
    connection
        .terminal_mut()
        .write_lcd(0, "0123456789012345678901234567890")
        .await
        .unwrap();

    assert_eq!(peer.lcd_writes(), vec!["M0012345678901234567890123"]);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_lcd_row_is_ignored() {
    let (mut connection, peer) = connected_pair("gate").await;
    connection.terminal_mut().write_lcd(2, "nope").await.unwrap();
    assert!(peer.lcd_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn name_change_fails_liveness_check() {
    let (mut connection, peer) = connected_pair("gate").await;

    connection.terminal_mut().verify_connected().await.unwrap();

    // Someone replugged the cable into a different terminal.
    peer.set_name("elevator");
    let result = connection.terminal_mut().verify_connected().await;
    assert!(matches!(result, Err(TerminalError::NameChanged { .. })));
}

#[derive(Clone, Default)]
struct Recording {
    keys: Arc<Mutex<Vec<char>>>,
    rfids: Arc<Mutex<Vec<String>>>,
    ticks: Arc<Mutex<usize>>,
    shutdowns: Arc<Mutex<usize>>,
}

struct RecordingHandler {
    record: Recording,
}

impl EventHandler for RecordingHandler {
    async fn init(&mut self, term: &mut impl TerminalPort) -> Result<(), TerminalError> {
        term.write_lcd(0, "ready").await
    }

    async fn handle_keypress(
        &mut self,
        _term: &mut impl TerminalPort,
        key: char,
    ) -> Result<(), TerminalError> {
        self.record.keys.lock().unwrap().push(key);
        Ok(())
    }

    async fn handle_rfid(
        &mut self,
        _term: &mut impl TerminalPort,
        id: &str,
    ) -> Result<(), TerminalError> {
        self.record.rfids.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn handle_tick(&mut self, _term: &mut impl TerminalPort) -> Result<(), TerminalError> {
        *self.record.ticks.lock().unwrap() += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        *self.record.shutdowns.lock().unwrap() += 1;
    }
}

#[tokio::test(start_paused = true)]
async fn event_loop_delivers_events_in_order_then_dies_with_the_link() {
    let (mut connection, peer) = connected_pair("gate").await;

    let record = Recording::default();
    let mut handler = RecordingHandler {
        record: record.clone(),
    };

    peer.inject("K1\n");
    peer.inject("K2\n");
    peer.inject("I04ABCDEF\n");

    let run = tokio::spawn(async move {
        let result = connection.run(&mut handler).await;
        handler.shutdown();
        result
    });

    // Let the events drain and a few idle ticks pass.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(record.keys.lock().unwrap().clone(), vec!['1', '2']);
    assert_eq!(
        record.rfids.lock().unwrap().clone(),
        vec!["04ABCDEF".to_string()]
    );
    assert!(*record.ticks.lock().unwrap() >= 2);

    // Kill the far end; the loop must exit with an error.
    drop(peer);
    let result = run.await.unwrap();
    assert!(result.is_err());
    assert_eq!(*record.shutdowns.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn liveness_ping_tears_down_renamed_terminal() {
    let (mut connection, peer) = connected_pair("gate").await;

    let record = Recording::default();
    let mut handler = RecordingHandler {
        record: record.clone(),
    };

    // Rename before the tenth idle tick; the ping must notice.
    peer.set_name("upstairs");
    let result = connection.run(&mut handler).await;
    assert!(matches!(result, Err(TerminalError::NameChanged { .. })));
}
