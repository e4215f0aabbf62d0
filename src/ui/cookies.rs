//! Identity cookie handling.
//!
//! The `sid` cookie carries a signed token over a small JSON payload
//! (`{"sid": ..., "ts": ...}`). A request presenting a valid token keeps its
//! session id; anything else is silently re-issued a fresh identity.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use serde_json::json;

use crate::common::id::IdAllocator;
use crate::common::time::now_millis;
use crate::infrastructure::token::TokenSigner;

/// Name of the identity cookie.
pub const SESSION_COOKIE: &str = "sid";

/// One year, the cookie lifetime.
const MAX_AGE_SECS: u64 = 31_536_000;

/// Parse the `Cookie` header(s) into ordered key/value pairs.
/// The cookie wire format is one-level `key=value`; metadata never travels
/// with the request and is reattached on response.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.push((name.to_string(), value.to_string()));
            }
        }
    }
    cookies
}

/// The resolved identity of a request.
pub struct SessionIdentity {
    pub session_id: String,
    /// `Set-Cookie` value to attach when a fresh identity was minted
    pub set_cookie: Option<String>,
}

/// Verify the presented `sid` cookie, minting a fresh identity when the
/// token is absent or invalid in any way.
pub fn ensure_identity(
    signer: &TokenSigner,
    ids: &IdAllocator,
    headers: &HeaderMap,
    insecure: bool,
) -> SessionIdentity {
    let presented = parse_cookies(headers)
        .into_iter()
        .find(|(name, _)| name == SESSION_COOKIE)
        .map(|(_, value)| value);

    if let Some(token) = presented
        && let Some(payload) = signer.verify(&token)
        && let Ok(value) = serde_json::from_slice::<serde_json::Value>(&payload)
        && let Some(session_id) = value.get("sid").and_then(|sid| sid.as_str())
    {
        return SessionIdentity {
            session_id: session_id.to_string(),
            set_cookie: None,
        };
    }

    let session_id = ids.next().to_string();
    let payload = json!({"sid": session_id, "ts": now_millis()}).to_string();
    let token = signer.sign(payload.as_bytes());
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    );
    if !insecure {
        cookie.push_str("; Secure");
    }
    SessionIdentity {
        session_id,
        set_cookie: Some(cookie),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_cookies_splits_pairs_in_order() {
        // given:
        let headers = headers_with_cookie("a=1; b=2; sid=xyz");

        // then:
        assert_eq!(
            parse_cookies(&headers),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("sid".to_string(), "xyz".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_cookie_mints_identity() {
        // given:
        let signer = TokenSigner::random();
        let ids = IdAllocator::new();

        // when:
        let identity = ensure_identity(&signer, &ids, &HeaderMap::new(), false);

        // then:
        let cookie = identity.set_cookie.unwrap();
        assert!(cookie.starts_with("sid="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=31536000"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn test_insecure_mode_drops_secure_attribute() {
        // given:
        let signer = TokenSigner::random();
        let ids = IdAllocator::new();

        // when:
        let identity = ensure_identity(&signer, &ids, &HeaderMap::new(), true);

        // then:
        assert!(!identity.set_cookie.unwrap().contains("Secure"));
    }

    #[test]
    fn test_valid_cookie_keeps_session_id() {
        // given: a previously minted identity
        let signer = TokenSigner::random();
        let ids = IdAllocator::new();
        let minted = ensure_identity(&signer, &ids, &HeaderMap::new(), false);
        let cookie = minted.set_cookie.unwrap();
        let token = cookie
            .strip_prefix("sid=")
            .unwrap()
            .split(';')
            .next()
            .unwrap();

        // when: the client presents it back
        let headers = headers_with_cookie(&format!("sid={token}"));
        let identity = ensure_identity(&signer, &ids, &headers, false);

        // then: same session, no re-issue
        assert_eq!(identity.session_id, minted.session_id);
        assert!(identity.set_cookie.is_none());
    }

    #[test]
    fn test_forged_cookie_is_reissued() {
        // given:
        let signer = TokenSigner::random();
        let ids = IdAllocator::new();
        let headers = headers_with_cookie("sid=Zm9yZ2Vk.Zm9yZ2Vk");

        // when:
        let identity = ensure_identity(&signer, &ids, &headers, false);

        // then:
        assert!(identity.set_cookie.is_some());
    }
}
