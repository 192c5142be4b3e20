// streak math for the progress ledger
// pure date arithmetic - callers pass "today" so tests can pin the clock

use chrono::NaiveDate;
use serde::Serialize;

// per-user aggregate, one row per user
// only the four counters go over the wire; the date is bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total_minutes: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub sessions_completed: i64,
    #[serde(skip)]
    pub last_session_date: Option<NaiveDate>,
}

impl Progress {
    pub fn zero() -> Self {
        Self {
            total_minutes: 0,
            current_streak: 0,
            longest_streak: 0,
            sessions_completed: 0,
            last_session_date: None,
        }
    }

    // apply one completed session to the aggregate
    pub fn after_session(&self, duration_seconds: i64, today: NaiveDate) -> Self {
        // partial minutes are dropped, never rounded up; the total
        // saturates rather than wrapping
        let total_minutes = self.total_minutes.saturating_add(duration_seconds / 60);
        let sessions_completed = self.sessions_completed + 1;

        let current_streak = match self.last_session_date {
            // first session ever
            None => 1,
            // repeat session on the same day keeps the streak as-is
            Some(last) if last == today => self.current_streak,
            // exactly one calendar day later extends it
            Some(last) if last.succ_opt() == Some(today) => self.current_streak + 1,
            // gap of two or more days, or a date in the future: start over
            Some(_) => 1,
        };

        Self {
            total_minutes,
            current_streak,
            longest_streak: self.longest_streak.max(current_streak),
            sessions_completed,
            last_session_date: Some(today),
        }
    }
}
