use chrono::{DateTime, Utc};

use crate::{schedule::ScheduleDecision, state::ControlState, types::SwitchState};

/// Resolves the effective desired state from a manual override and the
/// schedule's opinion. Precedence, in order:
///
/// 1. a boundary crossing hands control back to the schedule and clears
///    the override, in both directions;
/// 2. an override older than the TTL expires the same way;
/// 3. an unexpired override wins and the schedule is ignored;
/// 4. with no override the desired state follows the schedule.
///
/// The boundary check deliberately runs before the expiry check, so a
/// crossing that lands exactly at the TTL edge is attributed to the
/// schedule. Pure apart from mutating `state`; idempotent, so a store
/// conflict can simply re-run it on the re-read record.
pub fn resolve(
    state: &mut ControlState,
    decision: ScheduleDecision,
    now: DateTime<Utc>,
    override_ttl_ms: u64,
) -> SwitchState {
    let scheduled = if decision.scheduled_on {
        SwitchState::On
    } else {
        SwitchState::Off
    };
    state.last_scheduled_on = Some(decision.scheduled_on);

    if decision.boundary_crossed {
        state.clear_override();
        state.desired_state = scheduled;
        return scheduled;
    }

    if state.manual_override_active {
        // A missing set_at timestamp cannot age out on its own; treat it
        // as already expired rather than holding the override forever.
        let expired = state
            .override_age_ms(now)
            .is_none_or(|age| age >= override_ttl_ms);
        if !expired {
            return state.desired_state;
        }
        state.clear_override();
    }

    state.desired_state = scheduled;
    scheduled
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schedule::{Schedule, ScheduleWindow};

    const TTL_MS: u64 = 1_800_000;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn decision(scheduled_on: bool, boundary_crossed: bool) -> ScheduleDecision {
        ScheduleDecision {
            scheduled_on,
            boundary_crossed,
        }
    }

    fn evening_schedule() -> Schedule {
        Schedule {
            windows: vec![ScheduleWindow {
                id: "evening".to_string(),
                start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                enabled: true,
            }],
        }
    }

    /// Evaluates the schedule at wall-clock `(hour, minute)` against the
    /// persisted previous membership, then resolves.
    fn tick(state: &mut ControlState, schedule: &Schedule, hour: u32, minute: u32) -> SwitchState {
        let now_local = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
        let decision = schedule.evaluate(now_local, state.last_scheduled_on);
        resolve(state, decision, at(hour, minute), TTL_MS)
    }

    #[test]
    fn boundary_beats_any_override_regardless_of_age() {
        for minutes_old in [0, 1, 29, 30, 500] {
            let mut state = ControlState::default();
            state.apply_manual(SwitchState::Off, at(10, 0));
            state.last_scheduled_on = Some(false);

            let now = at(10, 0) + chrono::Duration::minutes(minutes_old);
            let effective = resolve(&mut state, decision(true, true), now, TTL_MS);

            assert_eq!(effective, SwitchState::On);
            assert_eq!(state.desired_state, SwitchState::On);
            assert!(!state.manual_override_active);
            assert_eq!(state.manual_override_set_at, None);
        }
    }

    #[test]
    fn boundary_clears_override_on_window_close_too() {
        let mut state = ControlState::default();
        state.apply_manual(SwitchState::On, at(19, 50));
        state.last_scheduled_on = Some(true);

        let effective = resolve(&mut state, decision(false, true), at(20, 0), TTL_MS);

        assert_eq!(effective, SwitchState::Off);
        assert!(!state.manual_override_active);
    }

    #[test]
    fn override_holds_inside_the_ttl() {
        let mut state = ControlState::default();
        state.apply_manual(SwitchState::Off, at(18, 30));
        state.last_scheduled_on = Some(true);

        for minute in [31, 45, 59] {
            let effective = resolve(&mut state, decision(true, false), at(18, minute), TTL_MS);
            assert_eq!(effective, SwitchState::Off);
            assert!(state.manual_override_active);
        }
    }

    #[test]
    fn override_expires_at_exactly_thirty_minutes() {
        let mut state = ControlState::default();
        state.apply_manual(SwitchState::Off, at(18, 30));
        state.last_scheduled_on = Some(true);

        let before = resolve(&mut state, decision(true, false), at(18, 59), TTL_MS);
        assert_eq!(before, SwitchState::Off);
        assert!(state.manual_override_active);

        let after = resolve(&mut state, decision(true, false), at(19, 0), TTL_MS);
        assert_eq!(after, SwitchState::On);
        assert!(!state.manual_override_active);
        assert_eq!(state.desired_state, SwitchState::On);
    }

    #[test]
    fn override_without_timestamp_is_treated_as_expired() {
        let mut state = ControlState::default();
        state.manual_override_active = true;
        state.manual_override_set_at = None;
        state.desired_state = SwitchState::On;

        let effective = resolve(&mut state, decision(false, false), at(12, 0), TTL_MS);

        assert_eq!(effective, SwitchState::Off);
        assert!(!state.manual_override_active);
    }

    #[test]
    fn without_override_desired_follows_schedule() {
        let mut state = ControlState::default();

        let on = resolve(&mut state, decision(true, false), at(18, 30), TTL_MS);
        assert_eq!(on, SwitchState::On);
        assert_eq!(state.desired_state, SwitchState::On);
        assert_eq!(state.last_scheduled_on, Some(true));

        let off = resolve(&mut state, decision(false, false), at(21, 0), TTL_MS);
        assert_eq!(off, SwitchState::Off);
        assert_eq!(state.desired_state, SwitchState::Off);
        assert_eq!(state.last_scheduled_on, Some(false));
    }

    #[test]
    fn resolve_is_idempotent_within_a_tick() {
        let mut state = ControlState::default();
        state.apply_manual(SwitchState::Off, at(18, 30));
        state.last_scheduled_on = Some(true);

        let first = resolve(&mut state, decision(true, false), at(18, 45), TTL_MS);
        let snapshot = state.clone();
        let second = resolve(&mut state, decision(true, false), at(18, 45), TTL_MS);

        assert_eq!(first, second);
        assert_eq!(state, snapshot);
    }

    // Window 18:00-20:00. Override ON at 17:30 is swept away by the 18:00
    // boundary; override OFF at 18:30 then holds, and the 20:00 boundary
    // (checked before the expiry rule) leaves the heater off.
    #[test]
    fn scenario_override_before_window_opens() {
        let schedule = evening_schedule();
        let mut state = ControlState::default();

        assert_eq!(tick(&mut state, &schedule, 17, 0), SwitchState::Off);

        state.apply_manual(SwitchState::On, at(17, 30));
        assert_eq!(tick(&mut state, &schedule, 17, 31), SwitchState::On);

        let at_open = tick(&mut state, &schedule, 18, 0);
        assert_eq!(at_open, SwitchState::On);
        assert!(!state.manual_override_active, "boundary clears the override");

        state.apply_manual(SwitchState::Off, at(18, 30));
        assert_eq!(tick(&mut state, &schedule, 18, 35), SwitchState::Off);

        let at_close = tick(&mut state, &schedule, 20, 1);
        assert_eq!(at_close, SwitchState::Off);
        assert!(!state.manual_override_active);
        assert_eq!(state.desired_state, SwitchState::Off);
    }

    // Window 18:00-20:00, heater on via schedule. Override OFF at 19:00
    // still holds at 19:15; the 20:00 close matches the override's value
    // but must still clear the flag.
    #[test]
    fn scenario_override_during_active_window() {
        let schedule = evening_schedule();
        let mut state = ControlState::default();

        assert_eq!(tick(&mut state, &schedule, 17, 55), SwitchState::Off);
        assert_eq!(tick(&mut state, &schedule, 18, 30), SwitchState::On);

        state.apply_manual(SwitchState::Off, at(19, 0));
        assert_eq!(tick(&mut state, &schedule, 19, 15), SwitchState::Off);
        assert!(state.manual_override_active);

        let at_close = tick(&mut state, &schedule, 20, 1);
        assert_eq!(at_close, SwitchState::Off);
        assert!(
            !state.manual_override_active,
            "no observable change, but the flag must be cleared"
        );
    }
}
