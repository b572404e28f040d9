//! Response Compliance Fixer (§4.6): applied to every origin response
//! before it is cached or delivered to the caller.

use http::{Method, StatusCode};

use crate::dates::parse_http_date;
use crate::entry::HttpVersion;
use crate::error::{CacheCoreError, ProtocolNonComplianceReason, Result};
use crate::headers::HeaderList;

/// Inputs the response compliance checks and repairs need beyond the status
/// and headers.
#[derive(Debug)]
pub struct ResponseFixInput<'a> {
    /// The method the originating request used.
    pub request_method: &'a Method,
    /// The originating request's headers.
    pub request_headers: &'a HeaderList,
    /// The originating request's HTTP version.
    pub request_version: HttpVersion,
}

/// The repaired response: a header list and whether the entity (if any)
/// must be dropped before the response is delivered or cached.
#[derive(Debug)]
pub struct ResponseFix {
    /// The repaired header set.
    pub headers: HeaderList,
    /// Whether the caller must drain and discard the response body.
    pub drop_entity: bool,
}

/// Applies every repair in §4.6, or returns a
/// [`CacheCoreError::ProtocolNonCompliantResponse`] for the fatal cases.
pub fn fix_response(
    input: &ResponseFixInput<'_>,
    status: StatusCode,
    headers: &HeaderList,
) -> Result<ResponseFix> {
    let mut headers = headers.clone();
    let code = status.as_u16();

    let mut drop_entity = matches!(code, 204 | 205 | 304) || *input.request_method == Method::HEAD;

    if code == 401 && !headers.contains("www-authenticate") {
        return Err(CacheCoreError::ProtocolNonCompliantResponse(
            ProtocolNonComplianceReason::MissingWwwAuthenticate,
        ));
    }
    if code == 405 && !headers.contains("allow") {
        return Err(CacheCoreError::ProtocolNonCompliantResponse(
            ProtocolNonComplianceReason::MissingAllow,
        ));
    }
    if code == 407 && !headers.contains("proxy-authenticate") {
        return Err(CacheCoreError::ProtocolNonCompliantResponse(
            ProtocolNonComplianceReason::MissingProxyAuthenticate,
        ));
    }

    if code == 100 {
        let expects_continue = input
            .request_headers
            .get("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
        if !expects_continue {
            return Err(CacheCoreError::ProtocolNonCompliantResponse(
                ProtocolNonComplianceReason::UnexpectedContinue,
            ));
        }
    }

    if input.request_version == HttpVersion::Http10 {
        headers.remove("transfer-encoding");
        headers.remove("te");
    }

    if code == 206 {
        if !input.request_headers.contains("content-range") {
            return Err(CacheCoreError::ProtocolNonCompliantResponse(
                ProtocolNonComplianceReason::PartialContentWithoutRange,
            ));
        }
        if !headers.contains("date") {
            headers.push("Date", crate::dates::format_http_date(std::time::SystemTime::now()));
        }
    }

    if code == 200 && *input.request_method == Method::OPTIONS && !headers.contains("content-length") {
        drop_entity = true;
        headers.set("Content-Length", "0");
    }

    if code == 304 {
        for name in [
            "allow",
            "content-encoding",
            "content-language",
            "content-length",
            "content-md5",
            "content-range",
            "content-type",
            "last-modified",
        ] {
            headers.remove(name);
        }
    }

    if let Some(encoding) = headers.get("content-encoding") {
        let remaining: Vec<&str> =
            encoding.split(',').map(str::trim).filter(|t| !t.eq_ignore_ascii_case("identity")).collect();
        if remaining.is_empty() {
            headers.remove("content-encoding");
        } else if remaining.len() != encoding.split(',').count() {
            let joined = remaining.join(", ");
            headers.set("content-encoding", joined);
        }
    }

    let response_date = headers.get("date").and_then(parse_http_date);
    let warnings: Vec<String> = headers
        .get_all("warning")
        .filter(|w| warning_date_matches(w, response_date))
        .map(str::to_string)
        .collect();
    if warnings.len() != headers.count("warning") {
        headers.remove("warning");
        for w in warnings {
            headers.push("Warning", w);
        }
    }

    Ok(ResponseFix { headers, drop_entity })
}

/// A `Warning` value's optional warn-date trailer (the quoted HTTP-date
/// after the warn-text) must match the response's `Date`, or the entry is
/// dropped.
fn warning_date_matches(warning_value: &str, response_date: Option<std::time::SystemTime>) -> bool {
    let Some(warn_date_str) = extract_warn_date(warning_value) else {
        return true; // no warn-date present -> keep
    };
    match (parse_http_date(&warn_date_str), response_date) {
        (Some(w), Some(r)) => w == r,
        _ => true,
    }
}

fn extract_warn_date(value: &str) -> Option<String> {
    // warn-code SP warn-agent SP warn-text [SP warn-date]; warn-date is the
    // last quoted segment when there are two quoted segments.
    let quoted: Vec<usize> = value.match_indices('"').map(|(i, _)| i).collect();
    if quoted.len() < 4 {
        return None;
    }
    let last_open = quoted[quoted.len() - 2];
    let last_close = quoted[quoted.len() - 1];
    Some(value[last_open + 1..last_close].to_string())
}
