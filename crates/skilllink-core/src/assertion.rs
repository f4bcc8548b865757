//! Sign-in assertions issued by the auth provider.
//!
//! After it has checked a user's credentials, the provider hands the client a
//! short-lived assertion `<actor_id>.<issued_at>.<signature>`: `issued_at` is
//! in unix seconds, and `signature` is hex HMAC-SHA256 over
//! `<actor_id>.<issued_at>` under a key shared with the server. The server
//! opens a session only for a fresh assertion with a valid signature.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

use crate::ResourceId;

type HmacSha256 = Hmac<Sha256>;

/// Shortest provider key accepted, in bytes.
pub const MIN_KEY_LEN: usize = 16;

/// How long an assertion may be used to open a session, in seconds.
pub const MAX_ASSERTION_AGE_SECS: i64 = 300;

/// Tolerated clock drift between provider and server, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AssertionError {
    #[error("provider key must be at least 16 bytes")]
    WeakKey,
    #[error("malformed sign-in assertion")]
    Malformed,
    #[error("sign-in assertion signature does not match")]
    BadSignature,
    #[error("sign-in assertion expired")]
    Expired,
    #[error("sign-in assertion is not valid yet")]
    NotYetValid,
}

/// Key shared between the auth provider and the server.
#[derive(Clone)]
pub struct ProviderKey(Vec<u8>);

impl fmt::Debug for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderKey(..)")
    }
}

impl ProviderKey {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, AssertionError> {
        let key = key.as_ref();
        if key.len() < MIN_KEY_LEN {
            return Err(AssertionError::WeakKey);
        }
        Ok(Self(key.to_vec()))
    }

    fn mac(&self, signed: &str) -> Result<HmacSha256, AssertionError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).map_err(|_| AssertionError::WeakKey)?;
        mac.update(signed.as_bytes());
        Ok(mac)
    }

    /// Issue an assertion for `actor_id`, as the provider does.
    pub fn sign(
        &self,
        actor_id: ResourceId,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AssertionError> {
        let signed = format!("{}.{}", actor_id, issued_at.timestamp());
        let signature = self.mac(&signed)?.finalize().into_bytes();
        Ok(format!("{}.{}", signed, hex::encode(signature)))
    }

    /// Check an assertion and return the actor it vouches for. The signature
    /// is checked before any signed field is interpreted.
    pub fn verify(
        &self,
        assertion: &str,
        now: DateTime<Utc>,
    ) -> Result<ResourceId, AssertionError> {
        let (signed, signature) = assertion
            .trim()
            .rsplit_once('.')
            .ok_or(AssertionError::Malformed)?;
        let (actor, issued_at) = signed.split_once('.').ok_or(AssertionError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AssertionError::Malformed)?;

        self.mac(signed)?
            .verify_slice(&signature)
            .map_err(|_| AssertionError::BadSignature)?;

        let actor_id: ResourceId = actor.parse().map_err(|_| AssertionError::Malformed)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| AssertionError::Malformed)?;
        let age = now.timestamp() - issued_at;
        if age > MAX_ASSERTION_AGE_SECS {
            return Err(AssertionError::Expired);
        }
        if age < -CLOCK_SKEW_SECS {
            return Err(AssertionError::NotYetValid);
        }
        Ok(actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> ProviderKey {
        ProviderKey::new("test-provider-key-0123456789").unwrap()
    }

    #[test]
    fn test_signed_assertion_verifies() {
        let actor = ResourceId::new();
        let now = Utc::now();
        let assertion = key().sign(actor, now).unwrap();
        assert_eq!(key().verify(&assertion, now), Ok(actor));
        assert_eq!(
            key().verify(&assertion, now + Duration::seconds(MAX_ASSERTION_AGE_SECS)),
            Ok(actor)
        );
    }

    #[test]
    fn test_tampered_actor_is_rejected() {
        let now = Utc::now();
        let assertion = key().sign(ResourceId::new(), now).unwrap();
        let (_, rest) = assertion.split_once('.').unwrap();
        let forged = format!("{}.{}", ResourceId::new(), rest);
        assert_eq!(key().verify(&forged, now), Err(AssertionError::BadSignature));
    }

    #[test]
    fn test_other_key_is_rejected() {
        let now = Utc::now();
        let other = ProviderKey::new("some-other-provider-key!").unwrap();
        let assertion = other.sign(ResourceId::new(), now).unwrap();
        assert_eq!(key().verify(&assertion, now), Err(AssertionError::BadSignature));
    }

    #[test]
    fn test_stale_and_future_assertions_are_rejected() {
        let now = Utc::now();
        let actor = ResourceId::new();

        let stale = key().sign(actor, now - Duration::minutes(10)).unwrap();
        assert_eq!(key().verify(&stale, now), Err(AssertionError::Expired));

        let early = key().sign(actor, now + Duration::minutes(10)).unwrap();
        assert_eq!(key().verify(&early, now), Err(AssertionError::NotYetValid));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let now = Utc::now();
        for junk in ["", "abc", "a.b", "a.b.zz"] {
            assert_eq!(key().verify(junk, now), Err(AssertionError::Malformed), "{:?}", junk);
        }
    }

    #[test]
    fn test_short_key_is_refused() {
        assert_eq!(ProviderKey::new("short").unwrap_err(), AssertionError::WeakKey);
    }
}
