//! Cache-key and variant-key generation (§3, §4.8).

use http::Uri;

use crate::headers::HeaderList;

/// Canonicalizes a request URI into the base cache-key: lowercases
/// scheme/host, fills in the default port, percent-decodes then re-parses
/// the path, strips any fragment, and preserves the query verbatim.
///
/// Idempotent: `canonicalize_uri(canonicalize_uri(x)) == canonicalize_uri(x)`.
/// Any URI this crate cannot parse falls back to the original string
/// unchanged rather than failing -- this is a total function.
pub fn canonicalize_uri(uri: &str) -> String {
    let Ok(parsed) = uri.parse::<Uri>() else {
        return uri.to_string();
    };
    let Some(authority) = parsed.authority() else {
        return uri.to_string();
    };
    let scheme = parsed.scheme_str().unwrap_or("http").to_ascii_lowercase();
    let host = authority.host().to_ascii_lowercase();
    let port = authority.port_u16().unwrap_or(match scheme.as_str() {
        "https" => 443,
        _ => 80,
    });
    let default_port = matches!((scheme.as_str(), port), ("http", 80) | ("https", 443));

    let path = percent_decode_path(parsed.path());
    let path = if path.is_empty() { "/".to_string() } else { path };
    let query = parsed.query();

    let mut out = String::new();
    out.push_str(&scheme);
    out.push_str("://");
    out.push_str(&host);
    if !default_port {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(&path);
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    out
}

fn percent_decode_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    decoded.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Builds the variant-key for `request`, given the `vary` header names taken
/// from the stored entry. Depends only on the entry's Vary set and the
/// request's values for those names; other request headers (and their
/// order) do not affect the result.
///
/// `{h1=v1&h2=v2&...}` over the sorted, lowercased header names, request
/// values joined by `", "` after trimming, both names and values
/// percent-encoded as UTF-8.
///
/// Returns `None` if `vary` contains `"*"` -- such a response is uncacheable
/// and must never reach variant storage.
pub fn variant_key(request_headers: &HeaderList, vary: &[String]) -> Option<String> {
    if vary.iter().any(|v| v.trim() == "*") {
        return None;
    }
    let mut names: Vec<String> = vary.iter().map(|v| v.trim().to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();

    let mut parts = Vec::with_capacity(names.len());
    for name in &names {
        let value = request_headers
            .get_all(name)
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("{}={}", percent_encode(name), percent_encode(&value)));
    }
    Some(format!("{{{}}}", parts.join("&")))
}

/// Parses the `Vary` header value(s) on a response into a name list, for
/// building `variant_map` keys when storing.
pub fn vary_names(response_headers: &HeaderList) -> Vec<String> {
    response_headers
        .get_all("vary")
        .flat_map(|v| v.split(',').map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Combines a variant-key and base cache-key into the full cache-key for a
/// varying resource, per §3: `variant_key + base_key`.
pub fn full_variant_cache_key(variant_key: &str, base_key: &str) -> String {
    format!("{variant_key}{base_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_scheme_and_host() {
        assert_eq!(
            canonicalize_uri("HTTP://Example.COM/Path"),
            "http://example.com/Path"
        );
    }

    #[test]
    fn canonicalize_strips_default_port() {
        assert_eq!(canonicalize_uri("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(canonicalize_uri("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(canonicalize_uri("http://example.com:8080/a"), "http://example.com:8080/a");
    }

    #[test]
    fn canonicalize_strips_fragment_keeps_query() {
        assert_eq!(
            canonicalize_uri("http://example.com/a?x=1#frag"),
            "http://example.com/a?x=1"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_uri("HTTP://Example.com:80/a%2Fb?q=1#f");
        let twice = canonicalize_uri(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_falls_back_on_unparseable() {
        assert_eq!(canonicalize_uri("not a uri at all"), "not a uri at all");
    }

    #[test]
    fn variant_key_depends_only_on_vary_headers() {
        let mut h1 = HeaderList::new();
        h1.push("Accept-Encoding", "gzip");
        h1.push("X-Other", "1");
        let mut h2 = HeaderList::new();
        h2.push("X-Other", "2");
        h2.push("Accept-Encoding", "gzip");
        let vary = vec!["Accept-Encoding".to_string()];
        assert_eq!(variant_key(&h1, &vary), variant_key(&h2, &vary));
    }

    #[test]
    fn variant_key_star_is_none() {
        let h = HeaderList::new();
        assert_eq!(variant_key(&h, &["*".to_string()]), None);
    }
}
