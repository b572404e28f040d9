//! Request Servability Policy (§4.3): whether the cache is even allowed to
//! attempt serving this request from its own store, prior to any suitability
//! check against a specific entry.

use http::Method;

use crate::headers::{CacheControl, HeaderList};

/// True unless the request carries `Cache-Control: no-store` or uses a
/// method the cache never serves from its own store. `no-cache` does not
/// disable servability -- [`crate::suitability`] rejects it later, once a
/// specific entry is in hand.
pub fn is_servable(method: &Method, request_headers: &HeaderList) -> bool {
    if CacheControl::parse(request_headers).has("no-store") {
        return false;
    }
    matches!(*method, Method::GET | Method::HEAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_servable() {
        let h = HeaderList::new();
        assert!(is_servable(&Method::GET, &h));
    }

    #[test]
    fn no_store_request_not_servable() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "no-store");
        assert!(!is_servable(&Method::GET, &h));
    }

    #[test]
    fn no_cache_request_is_still_servable() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "no-cache");
        assert!(is_servable(&Method::GET, &h));
    }

    #[test]
    fn post_not_servable() {
        let h = HeaderList::new();
        assert!(!is_servable(&Method::POST, &h));
    }
}
