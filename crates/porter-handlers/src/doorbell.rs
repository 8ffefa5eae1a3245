use std::sync::Arc;

use tracing::info;

use porter_core::{DoorbellUi, PhysicalActions, Target};

/// Simplest possible doorbell: log who is outside and ring.
pub struct SimpleDoorbell {
    actions: Arc<dyn PhysicalActions>,
}

impl SimpleDoorbell {
    #[must_use]
    pub fn new(actions: Arc<dyn PhysicalActions>) -> Self {
        Self { actions }
    }
}

impl DoorbellUi for SimpleDoorbell {
    fn handle_doorbell(&self, target: Target, message: &str) {
        info!(%target, %message, "doorbell");
        self.actions.ring_bell(target);
    }
}
