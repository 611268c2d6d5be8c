//! Decomposition of the `Authorization: Signature …` header.
//!
//! The accepted shape is exactly:
//!
//! ```text
//! Signature keyId="<id>",algorithm="<alg>",signature="<base64, url-escaped>"
//! ```
//!
//! Field names are case-insensitive and may appear in any order. Any
//! structural deviation yields the generic malformed-auth error so no
//! partial information leaks to the caller.

use crate::error::AuthError;

/// The three fields extracted from a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Key identifier used for the session lookup
    pub key_id: String,
    /// Declared algorithm (informational; the verifier computes HMAC-SHA1)
    pub algorithm: String,
    /// Presented signature, still url-escaped
    pub signature: String,
}

/// Parse a raw `Authorization` header value.
pub fn parse(header: &str) -> Result<ParsedSignature, AuthError> {
    let tokens: Vec<&str> = header.split(' ').collect();
    if tokens.len() != 2 {
        return Err(AuthError::MalformedAuthHeader);
    }
    if !tokens[0].eq_ignore_ascii_case("signature") {
        return Err(AuthError::MalformedAuthHeader);
    }

    let fields: Vec<&str> = tokens[1].split(',').collect();
    if fields.len() != 3 {
        return Err(AuthError::MalformedAuthHeader);
    }

    let mut key_id = "";
    let mut algorithm = "";
    let mut signature = "";

    for field in fields {
        // split_once keeps everything after the first '=' intact, so base64
        // padding inside the signature value survives
        let Some((name, value)) = field.split_once('=') else {
            return Err(AuthError::MalformedAuthHeader);
        };
        let value = value.trim_matches('"');

        if name.eq_ignore_ascii_case("keyid") {
            key_id = value;
        } else if name.eq_ignore_ascii_case("algorithm") {
            algorithm = value;
        } else if name.eq_ignore_ascii_case("signature") {
            signature = value;
        }
    }

    if key_id.is_empty() || algorithm.is_empty() || signature.is_empty() {
        return Err(AuthError::MalformedAuthHeader);
    }

    Ok(ParsedSignature {
        key_id: key_id.to_string(),
        algorithm: algorithm.to_string(),
        signature: signature.to_string(),
    })
}
