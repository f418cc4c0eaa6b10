use chrono::{DateTime, Utc};

use crate::{state::ControlState, types::ActualState};

/// Folds one verified device reading into the session bookkeeping.
///
/// Runtime is metered from verified readings only: a session starts on the
/// (Off|Unknown)->On transition, accrues between consecutive verified On
/// readings, and freezes (without resetting) when the device is seen Off.
/// A failed read records `Unknown` and touches nothing else, so a flaky
/// link can never inflate or reset the counter.
pub fn apply_reading(state: &mut ControlState, reading: ActualState, now: DateTime<Utc>) {
    let previous = state.actual_state;

    match reading {
        ActualState::Unknown => {
            state.actual_state = ActualState::Unknown;
        }
        ActualState::On => {
            if previous == ActualState::On {
                if let Some(last) = state.last_verified_at {
                    let elapsed = (now - last).num_seconds();
                    if elapsed > 0 {
                        state.accumulated_seconds += elapsed as u64;
                    }
                }
            } else {
                state.session_start = Some(now);
                state.accumulated_seconds = 0;
            }
            state.actual_state = ActualState::On;
            state.last_verified_at = Some(now);
        }
        ActualState::Off => {
            state.session_start = None;
            state.actual_state = ActualState::Off;
            state.last_verified_at = Some(now);
        }
    }
}
