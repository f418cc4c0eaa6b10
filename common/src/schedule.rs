use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// One daily activation window. `start > end` wraps past midnight
/// (e.g. 23:00-06:00). Membership is inclusive at both edges, at
/// minute-of-day granularity supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleWindow {
    pub id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub enabled: bool,
}

impl ScheduleWindow {
    pub fn validate(&self) -> bool {
        self.start != self.end
    }

    pub fn covers(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub windows: Vec<ScheduleWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDecision {
    pub scheduled_on: bool,
    pub boundary_crossed: bool,
}

impl Schedule {
    /// Drops malformed windows and orders the rest. Returns how many were
    /// dropped so callers can log it; a bad window never fails the tick.
    pub fn normalize(&mut self) -> usize {
        let before = self.windows.len();
        self.windows.retain(ScheduleWindow::validate);
        self.windows.sort_by_key(|window| window.start);
        before - self.windows.len()
    }

    pub fn is_on_at(&self, now: NaiveTime) -> bool {
        self.windows
            .iter()
            .any(|window| window.enabled && window.covers(now))
    }

    /// Membership plus boundary detection against the previous tick's
    /// membership. `previous = None` (first ever evaluation) is not a
    /// crossing.
    pub fn evaluate(&self, now: NaiveTime, previous: Option<bool>) -> ScheduleDecision {
        let scheduled_on = self.is_on_at(now);
        ScheduleDecision {
            scheduled_on,
            boundary_crossed: previous.is_some_and(|was_on| was_on != scheduled_on),
        }
    }
}
