//! Canonical signing string and HMAC-SHA1 computation.
//!
//! The canonical string covers only the `Date` header:
//!
//! ```text
//! date:<url-query-escaped Date value>
//! ```
//!
//! Method, URI, and form parameters are deliberately excluded so existing
//! signing clients keep verifying. The digest is HMAC-SHA1 over the UTF-8
//! bytes of that string, emitted as standard base64 with padding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::percent_decode_str;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::form_urlencoded;

use crate::error::AuthError;

type HmacSha1 = Hmac<Sha1>;

/// Compute the signature for a `Date` header value with the given secret.
///
/// Deterministic: fixed `(secret, date_value)` always yields the same base64
/// output.
#[must_use]
pub fn sign(date_value: &str, secret: &str) -> String {
    let signing_string = format!("date:{}", query_escape(date_value));

    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signing_string.as_bytes());

    BASE64.encode(mac.finalize().into_bytes())
}

/// Escape a string the way `application/x-www-form-urlencoded` does
/// (space becomes `+`), matching what signing clients apply to the Date
/// value and to the transported signature.
#[must_use]
pub fn query_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Undo one round of query escaping on the transported signature.
///
/// Clients MUST escape the base64 signature exactly once; a double-escaped
/// value decodes to the wrong bytes and fails verification.
pub fn query_unescape(value: &str) -> Result<String, AuthError> {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| AuthError::MalformedAuthHeader)
}

/// Constant-time comparison of an expected signature against the presented
/// (already unescaped) one.
#[must_use]
pub fn matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REF_DATE: &str = "Mon, 02 Jan 2006 15:04:05 MST";

    #[test]
    fn signing_is_deterministic() {
        let a = sign(REF_DATE, "secret");
        let b = sign(REF_DATE, "secret");
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn output_is_standard_base64_with_padding() {
        let sig = sign(REF_DATE, "secret");
        // HMAC-SHA1 digests are 20 bytes -> 28 base64 chars ending in '='
        assert_eq!(sig.len(), 28);
        assert!(sig.ends_with('='));
        assert!(!sig.contains('-') && !sig.contains('_'));
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        assert_ne!(sign(REF_DATE, "secret-a"), sign(REF_DATE, "secret-b"));
    }

    #[test]
    fn different_dates_produce_different_signatures() {
        assert_ne!(
            sign(REF_DATE, "secret"),
            sign("Mon, 02 Jan 2006 15:04:06 MST", "secret")
        );
    }

    #[test]
    fn query_escape_uses_form_encoding() {
        assert_eq!(
            query_escape(REF_DATE),
            "Mon%2C+02+Jan+2006+15%3A04%3A05+MST"
        );
    }

    #[test]
    fn escape_round_trips_through_unescape() {
        let sig = sign(REF_DATE, "secret");
        let transported = query_escape(&sig);
        assert_eq!(query_unescape(&transported).unwrap(), sig);
    }

    #[test]
    fn unescape_decodes_plus_as_space() {
        assert_eq!(query_unescape("a+b%3D").unwrap(), "a b=");
    }

    #[test]
    fn unescape_rejects_invalid_utf8() {
        assert!(query_unescape("%ff%fe").is_err());
    }

    #[test]
    fn matches_is_exact() {
        let sig = sign(REF_DATE, "secret");
        assert!(matches(&sig, &sig));
        assert!(!matches(&sig, ""));

        let mut corrupted = sig.clone().into_bytes();
        corrupted[0] = if corrupted[0] == b'A' { b'B' } else { b'A' };
        assert!(!matches(&sig, &String::from_utf8(corrupted).unwrap()));
    }
}
