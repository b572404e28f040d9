//! Entry serialization for out-of-process stores (§6): an HTTP/1.1-like
//! byte stream with entry metadata carried in reserved pseudo-headers.
//!
//! Reserved names: `hc-sk` (storage key), `hc-req-date`, `hc-resp-date`,
//! `hc-no-content`, `hc-varmap-key`/`hc-varmap-val` (one pair per
//! `variant_map` entry, in order). A real header whose name happens to
//! start with `hc-` is escaped as `hc-esc-<name>` during serialization and
//! unescaped on read, so it never collides with the reserved set.

use std::collections::BTreeMap;
use std::time::SystemTime;

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::dates::{format_http_date, parse_http_date};
use crate::entry::{CacheEntry, HttpVersion};
use crate::error::{CacheCoreError, Result};
use crate::headers::HeaderList;
use crate::resource::BytesResource;

const RESERVED_PREFIX: &str = "hc-";
const ESCAPE_PREFIX: &str = "hc-esc-";

/// Serializes `entry`, stored under `storage_key`, into the wire format.
/// `body` is the entry's body bytes, read out-of-band by the caller (the
/// format does not itself know how to read a `Resource`).
pub fn serialize(storage_key: &str, entry: &CacheEntry, body: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(entry.version.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(entry.status.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(
        entry.reason.as_deref().unwrap_or_else(|| entry.status.canonical_reason().unwrap_or("")).as_bytes(),
    );
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(entry.request_method.as_str().as_bytes());
    out.extend_from_slice(b"\r\n");

    write_header(&mut out, "hc-sk", storage_key);
    write_header(&mut out, "hc-req-date", &format_http_date(entry.request_date));
    write_header(&mut out, "hc-resp-date", &format_http_date(entry.response_date));
    if body.is_none() {
        write_header(&mut out, "hc-no-content", "true");
    }
    for (variant_key, cache_key) in &entry.variant_map {
        write_header(&mut out, "hc-varmap-key", variant_key);
        write_header(&mut out, "hc-varmap-val", cache_key);
    }

    for header in entry.headers.iter() {
        let name = if header.name.to_ascii_lowercase().starts_with(RESERVED_PREFIX) {
            format!("{ESCAPE_PREFIX}{}", header.name)
        } else {
            header.name.clone()
        };
        write_header(&mut out, &name, &header.value);
    }

    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    out
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Deserializes bytes produced by [`serialize`], returning the storage key
/// and the reconstructed entry. The body (if `hc-no-content` was absent) is
/// wrapped in a [`BytesResource`].
pub fn deserialize(bytes: &[u8]) -> Result<(String, CacheEntry)> {
    let text_end = find_header_section_end(bytes)
        .ok_or_else(|| CacheCoreError::SerializationError("missing header terminator".into()))?;
    let header_section = std::str::from_utf8(&bytes[..text_end])
        .map_err(|e| CacheCoreError::SerializationError(format!("invalid utf-8 in headers: {e}")))?;
    let body_bytes = &bytes[text_end + 4..];

    let mut lines = header_section.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| CacheCoreError::SerializationError("missing status line".into()))?;
    let method_line = lines
        .next()
        .ok_or_else(|| CacheCoreError::SerializationError("missing method line".into()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version_str = parts.next().unwrap_or("");
    let status_str = parts.next().unwrap_or("");
    let reason = parts.next().map(str::to_string).filter(|s| !s.is_empty());

    let version = if version_str == "HTTP/1.0" { HttpVersion::Http10 } else { HttpVersion::Http11 };
    let status = status_str
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| CacheCoreError::SerializationError(format!("invalid status code: {status_str}")))?;
    let method: Method = method_line
        .parse()
        .map_err(|_| CacheCoreError::SerializationError(format!("invalid method: {method_line}")))?;

    let mut storage_key = String::new();
    let mut request_date = SystemTime::UNIX_EPOCH;
    let mut response_date = SystemTime::UNIX_EPOCH;
    let mut no_content = false;
    let mut variant_keys: Vec<String> = Vec::new();
    let mut variant_vals: Vec<String> = Vec::new();
    let mut headers = HeaderList::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(": ") else { continue };
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "hc-sk" => storage_key = value.to_string(),
            "hc-req-date" => {
                request_date = parse_http_date(value).ok_or_else(|| {
                    CacheCoreError::SerializationError("invalid hc-req-date".into())
                })?;
            }
            "hc-resp-date" => {
                response_date = parse_http_date(value).ok_or_else(|| {
                    CacheCoreError::SerializationError("invalid hc-resp-date".into())
                })?;
            }
            "hc-no-content" => no_content = value == "true",
            "hc-varmap-key" => variant_keys.push(value.to_string()),
            "hc-varmap-val" => variant_vals.push(value.to_string()),
            _ if lower.starts_with(ESCAPE_PREFIX) => {
                headers.push(&name[ESCAPE_PREFIX.len()..], value);
            }
            _ => headers.push(name, value),
        }
    }

    if variant_keys.len() != variant_vals.len() {
        return Err(CacheCoreError::SerializationError(
            "mismatched hc-varmap-key/hc-varmap-val pair count".into(),
        ));
    }
    let variant_map: BTreeMap<String, String> =
        variant_keys.into_iter().zip(variant_vals).collect();

    let body_ref: Option<std::sync::Arc<dyn crate::resource::Resource>> =
        if no_content || body_bytes.is_empty() {
            None
        } else {
            Some(std::sync::Arc::new(BytesResource(Bytes::copy_from_slice(body_bytes))))
        };

    Ok((
        storage_key,
        CacheEntry {
            request_date,
            response_date,
            status,
            reason,
            version,
            headers,
            body_ref,
            request_method: method,
            variant_map,
        },
    ))
}

fn find_header_section_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry() -> CacheEntry {
        let mut headers = HeaderList::new();
        headers.push("Content-Type", "text/plain");
        headers.push("hc-looks-reserved", "but-is-a-real-header");
        let mut variant_map = BTreeMap::new();
        variant_map.insert("{accept-encoding=gzip}".to_string(), "variant-key-1".to_string());
        CacheEntry {
            request_date: SystemTime::UNIX_EPOCH + Duration::from_secs(1000),
            response_date: SystemTime::UNIX_EPOCH + Duration::from_secs(1001),
            status: StatusCode::OK,
            reason: None,
            version: HttpVersion::Http11,
            headers,
            body_ref: None,
            request_method: Method::GET,
            variant_map,
        }
    }

    #[test]
    fn round_trips_byte_identical() {
        let e = entry();
        let body = b"hello world";
        let once = serialize("http://example.com/a", &e, Some(body));
        let (key, decoded) = deserialize(&once).unwrap();
        assert_eq!(key, "http://example.com/a");
        let twice = serialize(&key, &decoded, Some(body));
        assert_eq!(once, twice);
    }

    #[test]
    fn escapes_and_unescapes_hc_prefixed_real_headers() {
        let e = entry();
        let serialized = serialize("k", &e, Some(b"x"));
        let text = String::from_utf8_lossy(&serialized);
        assert!(text.contains("hc-esc-hc-looks-reserved: but-is-a-real-header"));
        let (_, decoded) = deserialize(&serialized).unwrap();
        assert_eq!(decoded.headers.get("hc-looks-reserved"), Some("but-is-a-real-header"));
    }

    #[test]
    fn no_content_round_trips_without_body() {
        let e = entry();
        let serialized = serialize("k", &e, None);
        let (_, decoded) = deserialize(&serialized).unwrap();
        assert!(decoded.body_ref.is_none());
    }

    #[test]
    fn variant_map_round_trips() {
        let e = entry();
        let serialized = serialize("k", &e, Some(b"x"));
        let (_, decoded) = deserialize(&serialized).unwrap();
        assert_eq!(decoded.variant_map, e.variant_map);
    }
}
