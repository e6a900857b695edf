use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use yarnnn_core::types::Schedule;

/// Resolves a stored timezone string to an IANA zone, defaulting to UTC when
/// the field is missing or not a zone chrono-tz recognizes (§8 "Timezone
/// resolution uses the user's stored timezone; default `UTC` when missing").
fn resolve_tz(timezone: &str) -> Tz {
    timezone.parse().unwrap_or(Tz::UTC)
}

/// Builds a local wall-clock instant, preferring the earlier of two
/// candidates across a DST fall-back ambiguity and falling back to the
/// post-gap instant across a DST spring-forward gap.
fn at(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    match tz.with_ymd_and_hms(year, month, day, hour, minute, 0) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest),
        chrono::LocalResult::None => None,
    }
}

/// Compute the next UTC execution time for `schedule` starting *after* `from`.
///
/// Returns `None` for `Schedule::None` (signal-emergent deliverables have no
/// recurrence — they run once via `trigger_existing` or not at all).
///
/// Candidates are resolved in the schedule's own `timezone` field (§3
/// invariant (c)) and converted back to UTC once chosen, so a `09:00`
/// schedule fires at 09:00 local time regardless of the user's offset.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::None => None,

        Schedule::Daily { time, timezone } => {
            let tz = resolve_tz(timezone);
            let local_from = from.with_timezone(&tz);
            let candidate = at(tz, local_from.year(), local_from.month(), local_from.day(), time.hour as u32, time.minute as u32)?;
            let candidate = if candidate > local_from { candidate } else { candidate + Duration::days(1) };
            Some(candidate.with_timezone(&Utc))
        }

        Schedule::Weekly { day, time, timezone } => {
            let tz = resolve_tz(timezone);
            let local_from = from.with_timezone(&tz);
            let today_dow = local_from.weekday().num_days_from_monday() as i64;
            let target_dow = day.num_days_from_monday();
            let days_ahead = target_dow - today_dow;
            let candidate_day =
                if days_ahead < 0 { local_from + Duration::days(7 + days_ahead) } else { local_from + Duration::days(days_ahead) };

            let candidate = at(
                tz,
                candidate_day.year(),
                candidate_day.month(),
                candidate_day.day(),
                time.hour as u32,
                time.minute as u32,
            )?;

            let candidate = if candidate > local_from {
                candidate
            } else {
                let push = if days_ahead <= 0 { 7 } else { 7 - days_ahead };
                candidate + Duration::days(push)
            };
            Some(candidate.with_timezone(&Utc))
        }

        Schedule::Monthly { day_of_month, time, timezone } => {
            let tz = resolve_tz(timezone);
            let local_from = from.with_timezone(&tz);
            let candidate = next_monthly_candidate(tz, local_from.year(), local_from.month(), *day_of_month, time.hour, time.minute)?;
            let candidate = if candidate > local_from {
                candidate
            } else {
                let (y, m) = next_month(local_from.year(), local_from.month());
                next_monthly_candidate(tz, y, m, *day_of_month, time.hour, time.minute)?
            };
            Some(candidate.with_timezone(&Utc))
        }
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Clamps `day_of_month` to the last valid day of the target month (e.g. a
/// `31` rule on a 30-day month fires on the 30th), matching how calendar
/// apps resolve end-of-month recurrences.
fn next_monthly_candidate(tz: Tz, year: i32, month: u32, day_of_month: u8, hour: u8, minute: u8) -> Option<DateTime<Tz>> {
    let days_in_month = days_in_month(year, month);
    let day = (day_of_month as u32).min(days_in_month);
    at(tz, year, month, day, hour as u32, minute as u32)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = next_month(year, month);
    let first_of_next = Utc.with_ymd_and_hms(ny, nm, 1, 0, 0, 0).single().unwrap();
    let first_of_this = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().unwrap();
    (first_of_next - first_of_this).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_core::types::{NaiveTimeOfDay, Weekday};

    fn t(hour: u8, minute: u8) -> NaiveTimeOfDay {
        NaiveTimeOfDay { hour, minute }
    }

    #[test]
    fn none_schedule_has_no_next_run() {
        assert!(compute_next_run(&Schedule::None, Utc::now()).is_none());
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_time_has_passed() {
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let next = compute_next_run(&Schedule::Daily { time: t(9, 0), timezone: "UTC".into() }, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 16, 9, 0, 0).unwrap());
    }

    #[test]
    fn daily_stays_today_if_time_still_ahead() {
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 6, 0, 0).unwrap();
        let next = compute_next_run(&Schedule::Daily { time: t(9, 0), timezone: "UTC".into() }, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn weekly_picks_next_occurrence_of_target_weekday() {
        // 2026-01-15 is a Thursday.
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let next = compute_next_run(
            &Schedule::Weekly { day: Weekday::Mon, time: t(9, 0), timezone: "UTC".into() },
            from,
        )
        .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap());
    }

    #[test]
    fn monthly_clamps_to_last_day_of_short_month() {
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let next = compute_next_run(
            &Schedule::Monthly { day_of_month: 31, time: t(9, 0), timezone: "UTC".into() },
            from,
        )
        .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap());
    }

    #[test]
    fn daily_honors_a_non_utc_timezone() {
        // 09:00 in New York (UTC-5 in January) is 14:00 UTC.
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let next =
            compute_next_run(&Schedule::Daily { time: t(9, 0), timezone: "America/New_York".into() }, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 6, 0, 0).unwrap();
        let next = compute_next_run(&Schedule::Daily { time: t(9, 0), timezone: "Nowhere/Imaginary".into() }, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap());
    }
}
