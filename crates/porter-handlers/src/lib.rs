//! Event handlers for the porter access controller.
//!
//! A handler is a short-lived state machine owning the conversation with
//! one connected terminal: the access flow at doors (type a code or
//! swipe a card, get the door or a reason why not) and the enrollment
//! flow at the control terminal. Handlers are created when a terminal
//! identifies itself and die with the connection.

pub mod access;
pub mod control;
pub mod dispatch;
pub mod doorbell;

pub use access::AccessHandler;
pub use control::ControlHandler;
pub use dispatch::{Backends, Handler, dispatch};
pub use doorbell::SimpleDoorbell;
