//! Stateless session tokens for the guestbook.
//!
//! A session token is a compact HS256 JWT: base64url (no padding) header and
//! claims joined by `.`, followed by an HMAC-SHA256 signature over both.
//! The token carries the whole session; nothing is stored server-side.
//!
//! Verification is a total function: every failure (wrong segment count, bad
//! encoding, signature mismatch, expiry) yields `None`, so callers cannot tell
//! failures apart and cannot leak the reason to a client.
//!
//! ```
//! use session_core::{Identity, SigningKey, issue, verify};
//!
//! let key = SigningKey::new("hunter2").unwrap();
//! let identity = Identity::new("1", "alice", "http://x/a.png");
//! let token = issue(&identity, &key).unwrap();
//!
//! let claims = verify(&token, &key).unwrap();
//! assert_eq!(claims.identity(), identity);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::Mac;
use hmac::digest::KeyInit;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = hmac::Hmac<Sha256>;

/// Signing algorithm advertised in the token header.
pub const ALGORITHM: &str = "HS256";

/// Token lifetime: 7 days.
pub const TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors raised while issuing tokens.
///
/// Verification never returns an error; see [`verify`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The signing key was empty
    #[error("signing key must not be empty")]
    EmptyKey,

    /// The MAC rejected the key
    #[error("signing key rejected by HMAC")]
    InvalidKey,

    /// A header or claims segment could not be serialized
    #[error("failed to encode token segment: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Symmetric key used to sign and verify session tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Wrap raw key material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyKey`] for an empty key.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::EmptyKey);
        }
        Ok(Self(bytes))
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes>)", self.0.len())
    }
}

/// The user identity a session token vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque identity-provider user id
    pub subject_id: String,
    /// Display handle (login name)
    pub handle: String,
    /// Avatar image URL
    pub avatar_url: String,
}

impl Identity {
    /// Build an identity record.
    pub fn new(
        subject_id: impl Into<String>,
        handle: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            handle: handle.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Display handle
    pub login: String,
    /// Avatar image URL
    pub avatar_url: String,
    /// Issued-at (Unix seconds)
    #[serde(default)]
    pub iat: u64,
    /// Expires-at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl Claims {
    /// Claims for `identity` issued at `now`, expiring after [`TOKEN_LIFETIME_SECS`].
    #[must_use]
    pub fn new(identity: &Identity, now: u64) -> Self {
        Self {
            sub: identity.subject_id.clone(),
            login: identity.handle.clone(),
            avatar_url: identity.avatar_url.clone(),
            iat: now,
            exp: Some(now.saturating_add(TOKEN_LIFETIME_SECS)),
        }
    }

    /// The identity these claims describe.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(&self.sub, &self.login, &self.avatar_url)
    }

    /// A token is expired once `exp <= now`. Tokens without `exp` never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header {
    alg: ALGORITHM,
    typ: "JWT",
};

/// Issue a token for `identity`, valid for 7 days from now.
///
/// # Errors
///
/// Fails only if the claims cannot be serialized or the key is unusable.
pub fn issue(identity: &Identity, key: &SigningKey) -> Result<String, Error> {
    issue_at(identity, key, unix_now())
}

/// Issue a token as if the current time were `now` (Unix seconds).
///
/// # Errors
///
/// See [`issue`].
pub fn issue_at(identity: &Identity, key: &SigningKey, now: u64) -> Result<String, Error> {
    sign_claims(&Claims::new(identity, now), key)
}

/// Sign arbitrary claims into a token.
///
/// # Errors
///
/// See [`issue`].
pub fn sign_claims(claims: &Claims, key: &SigningKey) -> Result<String, Error> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&HEADER)?);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signature = mac(key, &header, &body)?;

    Ok(format!(
        "{header}.{body}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Verify a token against the current time.
///
/// Returns the claims if the signature matches and the token is unexpired,
/// `None` for anything else.
#[must_use]
pub fn verify(token: &str, key: &SigningKey) -> Option<Claims> {
    verify_at(token, key, unix_now())
}

/// Verify a token as if the current time were `now` (Unix seconds).
#[must_use]
pub fn verify_at(token: &str, key: &SigningKey, now: u64) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(header), Some(body), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let expected = mac(key, header, body).ok()?;
    let actual = URL_SAFE_NO_PAD.decode(signature).ok()?;
    if !constant_time_eq(&expected, &actual) {
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(body).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;

    if claims.is_expired_at(now) {
        return None;
    }

    Some(claims)
}

/// Compare two byte strings in constant time.
///
/// Inputs of different length are rejected up front; the length of an
/// HMAC-SHA256 tag is public, so this leaks nothing about its contents.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// HMAC-SHA256 over `header.body`.
fn mac(key: &SigningKey, header: &str, body: &str) -> Result<Vec<u8>, Error> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key.as_bytes())
        .map_err(|_| Error::InvalidKey)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}
