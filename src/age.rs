//! Age & freshness arithmetic (§4.1). Pure functions over headers and
//! instants; no I/O, no store access.

use std::time::SystemTime;

use crate::dates::parse_http_date;
use crate::headers::{CacheControl, HeaderList};

/// Clamp sentinel used when `Date` is missing or `Age` is present but
/// unparseable, per §4.1's "treat as a clamped sentinel". Large enough that
/// it always wins a `max(...)` against any realistic elapsed time -- an
/// undatable response must look maximally aged, never brand-new -- but
/// finite so arithmetic on it doesn't overflow. Matches the `MAX_AGE`
/// sentinel used by the reference `CacheValidityPolicy` this arithmetic is
/// ported from, and the same cap `capped_age_header_value` applies below.
const CLAMPED_SENTINEL_S: i64 = 2_147_483_648;

fn secs_between(later: SystemTime, earlier: SystemTime) -> i64 {
    match later.duration_since(earlier) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// `max(0, (response_date - Date_header) / 1s)`; clamped if Date is absent
/// or unparseable.
pub fn apparent_age_s(headers: &HeaderList, response_date: SystemTime) -> i64 {
    match headers.get("date").and_then(parse_http_date) {
        Some(date) => secs_between(response_date, date).max(0),
        None => CLAMPED_SENTINEL_S,
    }
}

/// The `Age` header's contribution: `None` when the header is absent
/// entirely (it simply doesn't participate), `Some(sentinel)` when present
/// but malformed or negative (conservatively maximal, never brand-new),
/// else the parsed value.
fn age_header_seconds(headers: &HeaderList) -> Option<i64> {
    let raw = headers.get("age")?;
    Some(raw.trim().parse::<i64>().ok().filter(|&v| v >= 0).unwrap_or(CLAMPED_SENTINEL_S))
}

/// `max(apparent_age, Age header)` when an `Age` header is present;
/// `apparent_age` alone otherwise.
pub fn received_age_s(headers: &HeaderList, response_date: SystemTime) -> i64 {
    let apparent = apparent_age_s(headers, response_date);
    match age_header_seconds(headers) {
        Some(age_header) => apparent.max(age_header),
        None => apparent,
    }
}

/// `(response_date - request_date) / 1s`.
pub fn response_delay_s(request_date: SystemTime, response_date: SystemTime) -> i64 {
    secs_between(response_date, request_date).max(0)
}

/// `received_age + response_delay`.
pub fn corrected_initial_age_s(
    headers: &HeaderList,
    request_date: SystemTime,
    response_date: SystemTime,
) -> i64 {
    received_age_s(headers, response_date) + response_delay_s(request_date, response_date)
}

/// `(now - response_date) / 1s`, clamped to 0 if `now` precedes
/// `response_date` (clock skew).
pub fn resident_time_s(response_date: SystemTime, now: SystemTime) -> i64 {
    secs_between(now, response_date).max(0)
}

/// `corrected_initial_age + resident_time`.
pub fn current_age_s(
    headers: &HeaderList,
    request_date: SystemTime,
    response_date: SystemTime,
    now: SystemTime,
) -> i64 {
    corrected_initial_age_s(headers, request_date, response_date) + resident_time_s(response_date, now)
}

/// First present wins: (a) smallest of `max-age`/`s-maxage` (shared cache
/// only) treating an unparseable value as 0, (b) `Expires - Date`, else 0.
pub fn freshness_lifetime_s(headers: &HeaderList, shared_cache: bool) -> i64 {
    let cc = CacheControl::parse(headers);

    let max_age = cc.seconds("max-age").map(|v| v.unwrap_or(0) as i64);
    let s_maxage = if shared_cache {
        cc.seconds("s-maxage").map(|v| v.unwrap_or(0) as i64)
    } else {
        None
    };

    if max_age.is_some() || s_maxage.is_some() {
        return match (max_age, s_maxage) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => unreachable!(),
        };
    }

    if let (Some(expires), Some(date)) =
        (headers.get("expires").and_then(parse_http_date), headers.get("date").and_then(parse_http_date))
    {
        return secs_between(expires, date);
    }

    0
}

/// `coeff * max(0, Date - Last-Modified)` if both parse, else `default`.
pub fn heuristic_lifetime_s(headers: &HeaderList, coeff: f64, default: i64) -> i64 {
    match (
        headers.get("date").and_then(parse_http_date),
        headers.get("last-modified").and_then(parse_http_date),
    ) {
        (Some(date), Some(last_modified)) => {
            let delta = secs_between(date, last_modified).max(0);
            (coeff * delta as f64) as i64
        }
        _ => default,
    }
}

/// Whether a response is still within its freshness lifetime.
pub fn is_fresh(current_age_s: i64, freshness_lifetime_s: i64) -> bool {
    current_age_s < freshness_lifetime_s
}

/// How far past its freshness lifetime a response is, floored at zero.
pub fn staleness_s(current_age_s: i64, freshness_lifetime_s: i64) -> i64 {
    (current_age_s - freshness_lifetime_s).max(0)
}

/// `min(age, 2147483648)`, the cap the Response Generator applies to the
/// `Age` header it emits (§4.11).
pub fn capped_age_header_value(age_s: i64) -> i64 {
    age_s.clamp(0, 2_147_483_648)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn fresh_response_within_max_age() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=60");
        let request_date = t(1000);
        let response_date = t(1000);
        let now = t(1030);
        let age = current_age_s(&h, request_date, response_date, now);
        let lifetime = freshness_lifetime_s(&h, true);
        assert_eq!(age, 30);
        assert_eq!(lifetime, 60);
        assert!(is_fresh(age, lifetime));
    }

    #[test]
    fn stale_response_past_max_age() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=60");
        let age = current_age_s(&h, t(1000), t(1000), t(1100));
        let lifetime = freshness_lifetime_s(&h, true);
        assert!(!is_fresh(age, lifetime));
        assert_eq!(staleness_s(age, lifetime), 40);
    }

    #[test]
    fn s_maxage_wins_smaller_value_in_shared_cache() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "max-age=100, s-maxage=10");
        assert_eq!(freshness_lifetime_s(&h, true), 10);
        // In a private cache s-maxage is ignored.
        assert_eq!(freshness_lifetime_s(&h, false), 100);
    }

    #[test]
    fn expires_minus_date_used_without_max_age() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Expires", crate::dates::format_http_date(t(1060)));
        assert_eq!(freshness_lifetime_s(&h, true), 60);
    }

    #[test]
    fn missing_date_gives_zero_freshness_by_default() {
        let h = HeaderList::new();
        assert_eq!(freshness_lifetime_s(&h, true), 0);
    }

    #[test]
    fn age_header_value_is_capped() {
        assert_eq!(capped_age_header_value(10), 10);
        assert_eq!(capped_age_header_value(9_000_000_000), 2_147_483_648);
        assert_eq!(capped_age_header_value(-5), 0);
    }

    #[test]
    fn missing_date_clamps_age_high_instead_of_zero() {
        let h = HeaderList::new();
        assert_eq!(apparent_age_s(&h, t(1000)), CLAMPED_SENTINEL_S);
        assert_eq!(received_age_s(&h, t(1000)), CLAMPED_SENTINEL_S);
    }

    #[test]
    fn malformed_age_header_clamps_high_but_absent_one_does_not() {
        let mut with_date = HeaderList::new();
        with_date.push("Date", crate::dates::format_http_date(t(1000)));

        let mut malformed = with_date.clone();
        malformed.push("Age", "not-a-number");
        assert_eq!(received_age_s(&malformed, t(1000)), CLAMPED_SENTINEL_S);

        // No Age header at all: received_age_s falls back to apparent_age alone.
        assert_eq!(received_age_s(&with_date, t(1000)), 0);
    }
}
