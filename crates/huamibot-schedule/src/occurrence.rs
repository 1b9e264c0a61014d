//! Next-occurrence calculation for a weekly schedule.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone};

use crate::ScheduleConfig;

/// Compute the smallest instant at or after `now` whose weekday and
/// time-of-day match `schedule`.
///
/// If `now` already sits on the target weekday at or past the target time
/// (equality included, down to the second), the result is exactly one week
/// out — never "today, slightly earlier" and never `now` itself.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, schedule: &ScheduleConfig) -> DateTime<Tz> {
    let target_time = schedule.time_of_day();

    let mut days_ahead = (schedule.weekday().num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    if days_ahead == 0 && now.time() >= target_time {
        days_ahead = 7;
    }

    let date = now.date_naive() + Duration::days(days_ahead);
    resolve_local(&now.timezone(), date.and_time(target_time))
}

/// Human-readable duration until `target`, matching the `/next_send` reply
/// format: `"2d 3h 4m"`, `"3h 4m"`, or `"4m"`.
pub fn time_remaining<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> String {
    let delta = target.clone().signed_duration_since(now.clone());
    if delta <= Duration::zero() {
        return "0m".to_string();
    }

    let days = delta.num_days();
    let hours = delta.num_hours() % 24;
    let minutes = delta.num_minutes() % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Map a wall-clock datetime into `tz`. A DST fold takes the earlier
/// instant; a target inside a DST gap snaps to the first wall-clock minute
/// that exists again, i.e. the end of the gap. Timezone transitions fall
/// on whole minutes, so minute steps cannot overshoot.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = naive;
    loop {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earlier, _) => return earlier,
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
}
