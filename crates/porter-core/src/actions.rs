//! Capability traits for the physical side effects of access control.
//!
//! The controller itself never touches GPIO; it asks a [`PhysicalActions`]
//! implementation to open strikes and ring the bell. The traits are
//! synchronous on purpose: a pin write returns immediately and must never
//! be able to stall a terminal's event loop.

use crate::types::Target;
use std::sync::Mutex;

/// Physical actuation triggered by controller activity.
pub trait PhysicalActions: Send + Sync {
    /// Open the strike for the given door.
    fn open_door(&self, target: Target);

    /// Generate an audible tone inside the space.
    fn ring_bell(&self, target: Target);
}

/// Someone outside wants in but cannot open the door themselves.
pub trait DoorbellUi: Send + Sync {
    fn handle_doorbell(&self, target: Target, message: &str);
}

/// Actions backend that does nothing. Stands in where no GPIO exists,
/// e.g. on a development machine.
#[derive(Debug, Default)]
pub struct NullActions;

impl PhysicalActions for NullActions {
    fn open_door(&self, target: Target) {
        tracing::debug!(%target, "open_door (no-op)");
    }

    fn ring_bell(&self, target: Target) {
        tracing::debug!(%target, "ring_bell (no-op)");
    }
}

/// Actions backend that records every call, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingActions {
    opened: Mutex<Vec<Target>>,
    rang: Mutex<Vec<Target>>,
}

impl RecordingActions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn opened(&self) -> Vec<Target> {
        self.opened.lock().unwrap().clone()
    }

    #[must_use]
    pub fn rang(&self) -> Vec<Target> {
        self.rang.lock().unwrap().clone()
    }
}

impl PhysicalActions for RecordingActions {
    fn open_door(&self, target: Target) {
        self.opened.lock().unwrap().push(target);
    }

    fn ring_bell(&self, target: Target) {
        self.rang.lock().unwrap().push(target);
    }
}
