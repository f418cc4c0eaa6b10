pub mod config;
pub mod error;
pub mod resolve;
pub mod schedule;
pub mod session;
pub mod state;
pub mod types;

pub use config::{ControllerConfig, RuntimeConfig};
pub use error::{DriverError, StoreError};
pub use schedule::{Schedule, ScheduleDecision, ScheduleWindow};
pub use state::ControlState;
pub use types::{ActualState, CommandResult, ControllerStatus, SwitchState};
