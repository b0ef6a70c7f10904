//! Bearer-token verification.
//!
//! Tokens arrive once, as a query parameter at connect time; rotation
//! mid-connection is not supported. Verification is HS256 against a
//! pre-shared secret, and decoded identities are cached for fifteen minutes
//! keyed by the SHA-256 of the token so reconnect storms do not re-verify.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::ports::{AuthError, AuthPort, Identity};

const CACHE_TTL_MINUTES: i64 = 15;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[allow(dead_code)]
    exp: i64,
}

struct CachedIdentity {
    identity: Identity,
    cached_at: DateTime<Utc>,
}

pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
    cache: DashMap<String, CachedIdentity>,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cache: DashMap::new(),
        }
    }

    fn cache_key(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

impl AuthPort for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let key = Self::cache_key(token);
        if let Some(hit) = self.cache.get(&key) {
            if Utc::now() - hit.cached_at < Duration::minutes(CACHE_TTL_MINUTES) {
                return Ok(hit.identity.clone());
            }
        }
        // Expired cache entries fall through to full verification, which
        // also re-checks the token's own expiry.
        self.cache.remove(&key);

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        let identity = Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
        };
        self.cache.insert(
            key,
            CachedIdentity {
                identity: identity.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(identity)
    }
}
