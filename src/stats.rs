use crate::errors::ChallengeError;
use crate::models::{BathRecord, ChallengeState, PairWindow, Stats};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

pub fn build_stats_at(today: NaiveDate, records: &[BathRecord]) -> Stats {
    let mut activities = records.to_vec();
    activities.sort_by(|a, b| b.date.cmp(&a.date).then(b.time.cmp(&a.time)));

    let dates = distinct_dates(&activities);
    let total: u64 = activities.iter().map(|r| u64::from(r.duration_seconds)).sum();
    let longest = activities.iter().map(|r| r.duration_seconds).max().unwrap_or(0);
    let average = if activities.is_empty() {
        0
    } else {
        total / activities.len() as u64
    };

    let (latest_bath, latest_time) = match activities.first() {
        Some(latest) => (
            latest.date.to_string(),
            latest.time.format("%H:%M").to_string(),
        ),
        None => (String::new(), String::new()),
    };

    Stats {
        days_completed: current_streak(today, &dates),
        total_baths: activities.len() as u64,
        longest_bath: format_duration(u64::from(longest)),
        average_duration: format_duration(average),
        latest_bath,
        latest_time,
        activities,
    }
}

/// Consecutive logged days walking back from today. A day without a bath
/// today does not break the streak until tomorrow.
pub fn current_streak(today: NaiveDate, dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut cursor = if dates.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut streak = 0;
    while dates.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

/// Distinct days in `[started_at, today)` with a bath, plus one if today has one.
pub fn compute_my_progress_days(
    activities: &[BathRecord],
    challenge_started_at: Option<NaiveDate>,
    today: NaiveDate,
) -> u32 {
    let Some(start) = challenge_started_at.filter(|start| *start <= today) else {
        return 0;
    };
    let dates = distinct_dates(activities);
    let before_today = dates.range(start..today).count() as u32;
    let logged_today = u32::from(dates.contains(&today));
    before_today + logged_today
}

pub fn compute_friend_progress(
    dates: &BTreeSet<NaiveDate>,
    pair_start: NaiveDate,
    include_today: bool,
    today: NaiveDate,
) -> u32 {
    dates
        .range(pair_start..)
        .filter(|date| include_today || **date != today)
        .count() as u32
}

/// Days in `[started_at, today)` that have no bath.
pub fn missed_days(activities: &[BathRecord], started_at: NaiveDate, today: NaiveDate) -> i64 {
    let elapsed = (today - started_at).num_days();
    if elapsed <= 0 {
        return 0;
    }
    let dates = distinct_dates(activities);
    elapsed - dates.range(started_at..today).count() as i64
}

/// Shared window of two running challenges: latest start, shortest length.
pub fn pair_window(mine: &ChallengeState, theirs: &ChallengeState) -> Option<PairWindow> {
    let (a, b) = (mine.running_since()?, theirs.running_since()?);
    Some(PairWindow {
        start: a.max(b),
        length_days: mine.length_days.min(theirs.length_days),
    })
}

pub fn distinct_dates(records: &[BathRecord]) -> BTreeSet<NaiveDate> {
    records.iter().map(|r| r.date).collect()
}

/// Parses `m:ss` into seconds.
pub fn parse_duration(value: &str) -> Result<u32, ChallengeError> {
    let invalid = || ChallengeError::validation(format!("invalid duration '{value}', expected m:ss"));
    let (minutes, seconds) = value.trim().split_once(':').ok_or_else(invalid)?;
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(minutes) || !all_digits(seconds) || seconds.len() != 2 {
        return Err(invalid());
    }
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u32 = seconds.parse().map_err(|_| invalid())?;
    if seconds > 59 {
        return Err(invalid());
    }
    minutes
        .checked_mul(60)
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(invalid)
}

pub fn format_duration(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
