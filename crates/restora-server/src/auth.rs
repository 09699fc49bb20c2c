//! Identity resolution for incoming requests.
//!
//! Session handling lives in an upstream authentication proxy; this server
//! only reads the identity that proxy asserts.

use axum::http::{HeaderMap, HeaderName};
use restora_ratelimit::Identity;

/// Looks up the authenticated identity for a request.
pub trait IdentityResolver: Send + Sync {
    /// `None` means the request is unauthenticated.
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Reads the identity from a header set by a trusted proxy.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    pub fn new(header: &str) -> Result<Self, String> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| format!("invalid identity header '{}': {}", header, e))?;
        Ok(Self { header })
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let value = headers.get(&self.header)?.to_str().ok()?;
        Identity::new(value.trim()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_resolves_header() {
        let resolver = HeaderIdentityResolver::new("x-authenticated-email").unwrap();
        let mut headers = HeaderMap::new();
        assert!(resolver.resolve(&headers).is_none());

        headers.insert(
            "x-authenticated-email",
            HeaderValue::from_static(" a@x.com "),
        );
        assert_eq!(resolver.resolve(&headers).unwrap().as_str(), "a@x.com");
    }

    #[test]
    fn test_blank_header_is_unauthenticated() {
        let resolver = HeaderIdentityResolver::new("x-authenticated-email").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-authenticated-email", HeaderValue::from_static("   "));
        assert!(resolver.resolve(&headers).is_none());
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        assert!(HeaderIdentityResolver::new("bad header").is_err());
    }
}
