use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActualState, CommandResult, ControllerStatus, SwitchState};

/// The single persisted control record. Every loop reads it, computes the
/// next value, and writes it back conditioned on the revision it read; the
/// revision itself travels alongside the record in the store, not in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub desired_state: SwitchState,
    pub manual_override_active: bool,
    pub manual_override_set_at: Option<DateTime<Utc>>,
    pub actual_state: ActualState,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_command_at: Option<DateTime<Utc>>,
    pub last_command_result: Option<CommandResult>,
    pub session_start: Option<DateTime<Utc>>,
    pub accumulated_seconds: u64,
    /// Schedule membership observed by the previous resolution; boundary
    /// crossings are detected against this value.
    pub last_scheduled_on: Option<bool>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            desired_state: SwitchState::Off,
            manual_override_active: false,
            manual_override_set_at: None,
            actual_state: ActualState::Off,
            last_verified_at: None,
            last_command_at: None,
            last_command_result: None,
            session_start: None,
            accumulated_seconds: 0,
            last_scheduled_on: None,
        }
    }
}

impl ControlState {
    /// The one user-facing mutation: request a state now, marking it as a
    /// manual override. The next resolution decides how long it survives.
    pub fn apply_manual(&mut self, requested: SwitchState, now: DateTime<Utc>) {
        self.desired_state = requested;
        self.manual_override_active = true;
        self.manual_override_set_at = Some(now);
    }

    pub fn clear_override(&mut self) {
        self.manual_override_active = false;
        self.manual_override_set_at = None;
    }

    pub fn override_age_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        if !self.manual_override_active {
            return None;
        }
        self.manual_override_set_at
            .map(|set_at| (now - set_at).num_milliseconds().max(0) as u64)
    }

    pub fn override_remaining_ms(&self, now: DateTime<Utc>, ttl_ms: u64) -> u64 {
        match self.override_age_ms(now) {
            Some(age) => ttl_ms.saturating_sub(age),
            None => 0,
        }
    }

    pub fn record_command(&mut self, result: CommandResult, now: DateTime<Utc>) {
        self.last_command_at = Some(now);
        self.last_command_result = Some(result);
    }

    pub fn status(
        &self,
        now: DateTime<Utc>,
        ttl_ms: u64,
        scheduled_on: bool,
        timezone: &str,
    ) -> ControllerStatus {
        ControllerStatus {
            desired: self.desired_state.as_str(),
            actual: self.actual_state.as_str(),
            override_active: self.manual_override_active,
            override_remaining_ms: self.override_remaining_ms(now, ttl_ms),
            override_remaining_min: self.override_remaining_ms(now, ttl_ms) / 60_000,
            accumulated_seconds: self.accumulated_seconds,
            session_start_epoch: self.session_start.map(|t| t.timestamp()),
            last_verified_epoch: self.last_verified_at.map(|t| t.timestamp()),
            last_command_epoch: self.last_command_at.map(|t| t.timestamp()),
            last_command_result: self.last_command_result.map(CommandResult::as_str),
            scheduled_on,
            timezone: timezone.to_string(),
        }
    }
}
