use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    Off,
    On,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Last device-verified reading. `Unknown` means the most recent read
/// attempt failed; it is never inferred from a command's presumed success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActualState {
    Off,
    On,
    Unknown,
}

impl ActualState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<SwitchState> for ActualState {
    fn from(state: SwitchState) -> Self {
        match state {
            SwitchState::Off => Self::Off,
            SwitchState::On => Self::On,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandResult {
    Ok,
    Failed,
}

impl CommandResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub desired: &'static str,
    pub actual: &'static str,
    #[serde(rename = "overrideActive")]
    pub override_active: bool,
    #[serde(rename = "overrideRemainingMs")]
    pub override_remaining_ms: u64,
    #[serde(rename = "overrideRemainingMin")]
    pub override_remaining_min: u64,
    #[serde(rename = "accumulatedSeconds")]
    pub accumulated_seconds: u64,
    #[serde(rename = "sessionStartEpoch")]
    pub session_start_epoch: Option<i64>,
    #[serde(rename = "lastVerifiedEpoch")]
    pub last_verified_epoch: Option<i64>,
    #[serde(rename = "lastCommandEpoch")]
    pub last_command_epoch: Option<i64>,
    #[serde(rename = "lastCommandResult")]
    pub last_command_result: Option<&'static str>,
    #[serde(rename = "scheduledOn")]
    pub scheduled_on: bool,
    pub timezone: String,
}
