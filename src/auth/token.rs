//! Session token codec.
//!
//! A minimal JWT-shaped token: two URL-safe base64 segments (header,
//! payload) joined by `.`, followed by an HMAC-SHA256 tag over the first
//! two segments keyed with the server secret.
//!
//! The codec is a pure function over its inputs. Expiry is a claim, not a
//! codec concern: callers compare `exp` against the clock themselves, so
//! that "well-formed but stale" is distinguishable from "forged".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Codec failure taxonomy.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not exactly three dot-separated segments.
    #[error("malformed token")]
    Malformed,

    /// Signature segment does not match the recomputed tag.
    #[error("invalid token signature")]
    InvalidSignature,

    /// Payload segment is not valid base64/JSON.
    #[error("malformed token payload")]
    MalformedPayload,
}

/// Claims carried by an admin session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the admin username.
    pub sub: String,
    pub role: String,
    /// Expiry, Unix seconds. Checked by callers, not the codec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// True when `exp` is set and not in the future.
    pub fn expired_at(&self, now_secs: i64) -> bool {
        matches!(self.exp, Some(exp) if exp <= now_secs)
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: "HS256",
    typ: "JWT",
};

fn tag(signing_input: &str, secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Serialize and sign a payload into a `header.payload.signature` token.
pub fn encode<T: Serialize>(payload: &T, secret: &[u8]) -> Result<String, TokenError> {
    let header_json = serde_json::to_vec(&HEADER).map_err(|_| TokenError::MalformedPayload)?;
    let payload_json = serde_json::to_vec(payload).map_err(|_| TokenError::MalformedPayload)?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );
    let signature = URL_SAFE_NO_PAD.encode(tag(&signing_input, secret));

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify the signature and parse the payload of a token.
///
/// Fails with [`TokenError::Malformed`] unless the token has exactly three
/// segments, [`TokenError::InvalidSignature`] unless the third segment
/// matches the recomputed tag byte for byte, and
/// [`TokenError::MalformedPayload`] if the payload does not parse.
pub fn decode<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<T, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let signing_input = format!("{header}.{payload}");
    let provided = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::MalformedPayload)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::MalformedPayload)
}
