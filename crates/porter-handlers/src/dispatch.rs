//! Handler selection by terminal name.
//!
//! Terminals are dispatched by the name they report: door names get an
//! [`AccessHandler`], the control terminal gets a [`ControlHandler`].
//! The enum wrapper gives the connection supervisor one concrete
//! handler type without boxing the async trait.

use std::sync::Arc;

use porter_auth::Authenticator;
use porter_core::{DoorbellUi, PhysicalActions, Target};
use porter_terminal::{EventHandler, TerminalPort, TerminalResult};

use crate::access::AccessHandler;
use crate::control::ControlHandler;

/// Shared backends handed to every handler.
#[derive(Clone)]
pub struct Backends {
    pub authenticator: Arc<Authenticator>,
    pub actions: Arc<dyn PhysicalActions>,
    pub doorbell: Arc<dyn DoorbellUi>,
}

/// Either kind of per-terminal handler.
pub enum Handler {
    Access(AccessHandler),
    Control(ControlHandler),
}

/// Pick the handler for a terminal's self-reported name, `None` for
/// names that map to no known target.
#[must_use]
pub fn dispatch(name: &str, backends: &Backends) -> Option<Handler> {
    let target = name.parse::<Target>().ok()?;
    Some(match target {
        Target::Control => Handler::Control(ControlHandler::new(backends)),
        door => Handler::Access(AccessHandler::new(door, backends)),
    })
}

impl EventHandler for Handler {
    async fn init(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        match self {
            Handler::Access(h) => h.init(term).await,
            Handler::Control(h) => h.init(term).await,
        }
    }

    async fn handle_keypress(
        &mut self,
        term: &mut impl TerminalPort,
        key: char,
    ) -> TerminalResult<()> {
        match self {
            Handler::Access(h) => h.handle_keypress(term, key).await,
            Handler::Control(h) => h.handle_keypress(term, key).await,
        }
    }

    async fn handle_rfid(&mut self, term: &mut impl TerminalPort, id: &str) -> TerminalResult<()> {
        match self {
            Handler::Access(h) => h.handle_rfid(term, id).await,
            Handler::Control(h) => h.handle_rfid(term, id).await,
        }
    }

    async fn handle_tick(&mut self, term: &mut impl TerminalPort) -> TerminalResult<()> {
        match self {
            Handler::Access(h) => h.handle_tick(term).await,
            Handler::Control(h) => h.handle_tick(term).await,
        }
    }

    fn shutdown(&mut self) {
        match self {
            Handler::Access(h) => h.shutdown(),
            Handler::Control(h) => h.shutdown(),
        }
    }
}
