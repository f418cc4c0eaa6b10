use heater_common::{DriverError, SwitchState};
use tokio::sync::Mutex;
use tracing::info;

/// Opaque vendor boundary. The relay may be flipped by parties outside the
/// system at any time, so a `read` is authoritative only until the next one.
#[allow(async_fn_in_trait)]
pub trait DeviceDriver {
    async fn read(&self) -> Result<SwitchState, DriverError>;
    async fn set(&self, target: SwitchState) -> Result<(), DriverError>;
}

/// In-process relay stand-in used by the default host wiring and tests.
/// `force` models interference from a physical wall switch.
#[derive(Debug)]
pub struct SimulatedRelay {
    state: Mutex<SwitchState>,
}

impl SimulatedRelay {
    pub fn new(initial: SwitchState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub async fn force(&self, state: SwitchState) {
        let mut current = self.state.lock().await;
        *current = state;
    }
}

impl Default for SimulatedRelay {
    fn default() -> Self {
        Self::new(SwitchState::Off)
    }
}

impl DeviceDriver for SimulatedRelay {
    async fn read(&self) -> Result<SwitchState, DriverError> {
        Ok(*self.state.lock().await)
    }

    async fn set(&self, target: SwitchState) -> Result<(), DriverError> {
        let mut current = self.state.lock().await;
        if *current != target {
            info!("simulated relay switched {}", target.as_str());
        }
        *current = target;
        Ok(())
    }
}
