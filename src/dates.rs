//! HTTP-date parsing accepting the three formats permitted by RFC 7231 §7.1.1.1:
//! RFC 1123 (`Sun, 06 Nov 1994 08:49:37 GMT`), RFC 1036
//! (`Sunday, 06-Nov-94 08:49:37 GMT`), and asctime (`Sun Nov  6 08:49:37 1994`).
//!
//! A malformed or absent date is always `None`, never a parse error: every
//! caller in this crate treats an unparseable date as if the header were
//! missing, per §4.1 of the spec.

use std::time::SystemTime;
use time::format_description::parse_borrowed;
use time::{Month, OffsetDateTime, PrimitiveDateTime};
#[cfg(test)]
use time::format_description::well_known::Rfc2822;

/// Parses an HTTP-date header value, trying all three legal wire formats.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if let Ok(t) = httpdate::parse_http_date(value) {
        return Some(t);
    }
    if let Some(t) = parse_rfc1036(value) {
        return Some(t.into());
    }
    if let Some(t) = parse_asctime(value) {
        return Some(t.into());
    }
    None
}

/// Formats an instant as an RFC 1123 date, the only form this crate ever
/// emits (synthesized `Date`, conditional request validators, etc).
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

fn parse_rfc1036(value: &str) -> Option<OffsetDateTime> {
    // "Sunday, 06-Nov-94 08:49:37 GMT"
    let format = parse_borrowed::<2>(
        "[weekday], [day]-[month repr:short]-[year repr:last_two] [hour]:[minute]:[second] GMT",
    )
    .ok()?;
    let parsed = PrimitiveDateTime::parse(value, &format).ok()?;
    // RFC 1036's two-digit year is pre-2000 legacy; interpret 0-68 as 2000-2068
    // and 69-99 as 1969-1999, matching common HTTP-date parsing practice.
    let year = parsed.year();
    let full_year = if year < 69 { year + 2000 } else { year + 1900 };
    let adjusted = parsed.replace_year(full_year).ok()?;
    Some(adjusted.assume_utc())
}

fn parse_asctime(value: &str) -> Option<OffsetDateTime> {
    // "Sun Nov  6 08:49:37 1994" -- note the space-padded day-of-month.
    let format = parse_borrowed::<2>(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]",
    )
    .ok()?;
    let parsed = PrimitiveDateTime::parse(value, &format).ok()?;
    Some(parsed.assume_utc())
}

/// Formats using RFC 2822 (used only by a couple of interop tests; the
/// crate's own output always uses RFC 1123 via [`format_http_date`]).
#[cfg(test)]
pub(crate) fn format_rfc2822(time: SystemTime) -> String {
    OffsetDateTime::from(time).format(&Rfc2822).unwrap()
}

#[allow(dead_code)]
fn month_from_short(s: &str) -> Option<Month> {
    Month::from_str_short(s)
}

trait MonthExt {
    fn from_str_short(s: &str) -> Option<Month>;
}

impl MonthExt for Month {
    fn from_str_short(s: &str) -> Option<Month> {
        Some(match s.to_ascii_lowercase().as_str() {
            "jan" => Month::January,
            "feb" => Month::February,
            "mar" => Month::March,
            "apr" => Month::April,
            "may" => Month::May,
            "jun" => Month::June,
            "jul" => Month::July,
            "aug" => Month::August,
            "sep" => Month::September,
            "oct" => Month::October,
            "nov" => Month::November,
            "dec" => Month::December,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const EPOCH_1994_11_06_08_49_37: u64 = 784111777;

    #[test]
    fn parses_rfc1123() {
        let t = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(
            t,
            std::time::UNIX_EPOCH + Duration::from_secs(EPOCH_1994_11_06_08_49_37)
        );
    }

    #[test]
    fn parses_rfc1036() {
        let t = parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        assert_eq!(
            t,
            std::time::UNIX_EPOCH + Duration::from_secs(EPOCH_1994_11_06_08_49_37)
        );
    }

    #[test]
    fn parses_asctime() {
        let t = parse_http_date("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(
            t,
            std::time::UNIX_EPOCH + Duration::from_secs(EPOCH_1994_11_06_08_49_37)
        );
    }

    #[test]
    fn malformed_date_is_none() {
        assert!(parse_http_date("not a date").is_none());
        assert!(parse_http_date("").is_none());
    }

    #[test]
    fn format_roundtrips_through_rfc1123_parser() {
        let now = std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let formatted = format_http_date(now);
        assert_eq!(parse_http_date(&formatted), Some(now));
    }
}
