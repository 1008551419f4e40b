use crate::models::UserInfo;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h|d)").expect("duration pattern is valid")
});

fn unit_ms(unit: &str) -> f64 {
    match unit {
        "ns" => 1e-6,
        "us" | "µs" => 1e-3,
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => 0.0,
    }
}

/// Parses server durations such as `"10s"`, `"1h30m"` or `"604800s"` into
/// milliseconds. Anything that is not entirely made of `<number><unit>`
/// parts yields 0.
pub fn parse_duration_ms(raw: &str) -> u64 {
    let raw = raw.trim();
    let mut consumed = 0;
    let mut total = 0.0;
    for captures in DURATION_PART.captures_iter(raw) {
        let Some(whole) = captures.get(0) else {
            return 0;
        };
        if whole.start() != consumed {
            return 0;
        }
        consumed = whole.end();
        let value = captures[1].parse::<f64>().unwrap_or(0.0);
        total += value * unit_ms(&captures[2]);
    }
    if consumed == 0 || consumed != raw.len() {
        return 0;
    }
    total.round() as u64
}

/// The user snoozed exactly this release and the snooze window has not
/// elapsed yet.
pub fn snooze_active(
    latest_version: Option<&str>,
    user: &UserInfo,
    snooze_duration: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some(latest) = latest_version.filter(|version| !version.is_empty()) else {
        return false;
    };
    if user.snoozed_pmm_version != latest {
        return false;
    }
    let Some(snoozed_at) = user.snoozed_at else {
        return false;
    };
    let elapsed_ms = (now - snoozed_at).num_milliseconds();
    elapsed_ms < 0 || (elapsed_ms as u64) < parse_duration_ms(snooze_duration)
}
