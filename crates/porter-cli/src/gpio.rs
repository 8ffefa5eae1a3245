//! Sysfs GPIO implementation of the physical actions.
//!
//! One strike pin per door plus one bell pin, pulsed from a short-lived
//! thread so the caller returns immediately. GPIO trouble is logged and
//! swallowed: a flaky pin must never take the controller down with it.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use porter_core::{PhysicalActions, Target};

const STRIKE_PULSE: Duration = Duration::from_secs(2);
const BELL_PULSE: Duration = Duration::from_millis(500);

/// BCM pin numbers as wired on the controller board.
fn strike_pin(target: Target) -> Option<u32> {
    match target {
        Target::Gate => Some(17),
        Target::Upstairs => Some(27),
        Target::Elevator => Some(22),
        Target::Control => None,
    }
}

const BELL_PIN: u32 = 23;

pub struct GpioActions {
    base: PathBuf,
}

impl GpioActions {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base("/sys/class/gpio")
    }

    /// Separate base path so tests can point at a temp directory.
    #[must_use]
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        let actions = Self { base: base.into() };
        for pin in [17, 27, 22, BELL_PIN] {
            actions.export(pin);
        }
        actions
    }

    fn export(&self, pin: u32) {
        let export = self.base.join("export");
        // Already-exported pins make this write fail; that is fine.
        let _ = fs::write(&export, pin.to_string());
        let direction = self.base.join(format!("gpio{pin}/direction"));
        if let Err(e) = fs::write(&direction, "out") {
            warn!(pin, error = %e, "could not configure gpio pin");
        }
    }

    fn pulse(&self, pin: u32, hold: Duration) {
        let value = self.base.join(format!("gpio{pin}/value"));
        if let Err(e) = fs::write(&value, "1") {
            warn!(pin, error = %e, "could not raise gpio pin");
            return;
        }
        std::thread::spawn(move || {
            std::thread::sleep(hold);
            if let Err(e) = fs::write(&value, "0") {
                warn!(pin, error = %e, "could not lower gpio pin");
            }
        });
    }
}

impl Default for GpioActions {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalActions for GpioActions {
    fn open_door(&self, target: Target) {
        let Some(pin) = strike_pin(target) else {
            warn!(%target, "no strike wired for target");
            return;
        };
        info!(%target, pin, "opening door strike");
        self.pulse(pin, STRIKE_PULSE);
    }

    fn ring_bell(&self, target: Target) {
        info!(%target, pin = BELL_PIN, "ringing bell");
        self.pulse(BELL_PIN, BELL_PULSE);
    }
}
