use std::collections::HashSet;
use std::env;

use jsonwebtoken::{
    decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use thiserror::Error;

use crate::routes::auth::claims::Claims;

pub const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_UNIQUE_JWT_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET must be at least {required} bytes, but {actual} bytes were provided")]
    TooShort { actual: usize, required: usize },
    #[error("JWT_SECRET needs at least {required} distinct bytes; found {actual}")]
    LowEntropy { actual: usize, required: usize },
}

/// HS256 signing material plus the issuer/audience every token is bound to.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_env(issuer: &str, audience: &str) -> Result<Self, JwtSecretError> {
        let secret = env::var("JWT_SECRET").map_err(|_| JwtSecretError::Missing)?;
        Self::from_secret(secret, issuer, audience)
    }

    pub fn from_secret(
        secret: impl AsRef<[u8]>,
        issuer: &str,
        audience: &str,
    ) -> Result<Self, JwtSecretError> {
        let bytes = secret.as_ref();
        validate_secret(bytes)?;
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        })
    }

    pub fn create(&self, mut claims: Claims) -> Result<String, Error> {
        claims.iss = self.issuer.clone();
        claims.aud = self.audience.clone();
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Rejects expired tokens and tokens minted for another issuer or audience.
    pub fn decode(&self, token: &str) -> Result<TokenData<Claims>, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.iss = Some(HashSet::from([self.issuer.clone()]));
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims.insert("exp".to_string());
        decode::<Claims>(token, &self.decoding, &validation)
    }
}

fn validate_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(JwtSecretError::TooShort {
            actual: secret.len(),
            required: MIN_JWT_SECRET_LENGTH,
        });
    }
    let unique = secret.iter().copied().collect::<HashSet<_>>().len();
    if unique < MIN_UNIQUE_JWT_BYTES {
        return Err(JwtSecretError::LowEntropy {
            actual: unique,
            required: MIN_UNIQUE_JWT_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn claims(exp_offset: i64) -> Claims {
        Claims::new(
            "8b0c8f8e-8a44-4c43-9bd4-0d6f0e0b8f11".into(),
            "pm@site.co".into(),
            "Pat Manager".into(),
            UserRole::ProjectManager,
            exp_offset,
        )
    }

    #[test]
    fn rejects_short_and_repetitive_secrets() {
        assert!(matches!(
            JwtKeys::from_secret("short", "i", "a"),
            Err(JwtSecretError::TooShort { .. })
        ));
        assert!(matches!(
            JwtKeys::from_secret("a".repeat(MIN_JWT_SECRET_LENGTH), "i", "a"),
            Err(JwtSecretError::LowEntropy { .. })
        ));
    }

    #[test]
    fn token_round_trips_with_matching_audience() {
        let keys = JwtKeys::from_secret(SECRET, "siteflow", "siteflow-app").unwrap();
        let token = keys.create(claims(3600)).unwrap();
        let decoded = keys.decode(&token).unwrap();
        assert_eq!(decoded.claims.email, "pm@site.co");
        assert_eq!(decoded.claims.role, UserRole::ProjectManager);
    }

    #[test]
    fn foreign_audience_and_expired_tokens_fail() {
        let keys = JwtKeys::from_secret(SECRET, "siteflow", "siteflow-app").unwrap();
        let other = JwtKeys::from_secret(SECRET, "siteflow", "other-app").unwrap();
        let token = other.create(claims(3600)).unwrap();
        assert!(keys.decode(&token).is_err());

        let expired = keys.create(claims(-120)).unwrap();
        assert!(keys.decode(&expired).is_err());
    }
}
