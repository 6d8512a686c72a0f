use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    MissingJwtSecret,
    JwtSecretTooShort { min_len: usize, actual_len: usize },
}

impl fmt::Display for AuthConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfigError::MissingJwtSecret => write!(f, "JWT_SECRET must be set"),
            AuthConfigError::JwtSecretTooShort {
                min_len,
                actual_len,
            } => write!(
                f,
                "JWT_SECRET must be at least {} characters (got {})",
                min_len, actual_len
            ),
        }
    }
}

impl std::error::Error for AuthConfigError {}

/// Validates bearer tokens issued by the session collaborator and yields
/// the actor id they carry.
pub struct AuthManager {
    decoding_key: DecodingKey,
}

impl AuthManager {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn from_env() -> Result<Self, AuthConfigError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AuthConfigError::MissingJwtSecret)?;
        Self::validate_jwt_secret(&secret)?;
        Ok(Self::new(&secret))
    }

    fn validate_jwt_secret(secret: &str) -> Result<(), AuthConfigError> {
        let actual_len = secret.len();
        if actual_len < MIN_JWT_SECRET_LEN {
            return Err(AuthConfigError::JwtSecretTooShort {
                min_len: MIN_JWT_SECRET_LEN,
                actual_len,
            });
        }
        Ok(())
    }

    /// Returns the authenticated actor id carried by a valid, unexpired
    /// token, or `None` for anything else.
    pub fn actor_from_token(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let claims = decode::<AuthClaims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims;
        Uuid::parse_str(&claims.sub).ok()
    }
}

/// Optional authenticated actor extracted from the `Authorization: Bearer`
/// header. Handlers decide whether an anonymous caller is acceptable.
pub struct CurrentActor(pub Option<Uuid>);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.auth.actor_from_token(token));
        Ok(CurrentActor(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-test-secret-test-secret";

    fn token_for(sub: &str, expires_in: Duration) -> String {
        let iat = Utc::now().timestamp();
        let exp = (Utc::now() + expires_in).timestamp();
        let claims = AuthClaims {
            sub: sub.to_string(),
            iat,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("token must encode")
    }

    #[test]
    fn valid_token_yields_actor() {
        let auth = AuthManager::new(SECRET);
        let actor = Uuid::from_u128(42);
        let token = token_for(&actor.to_string(), Duration::hours(1));
        assert_eq!(auth.actor_from_token(&token), Some(actor));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = AuthManager::new(SECRET);
        let token = token_for(&Uuid::from_u128(42).to_string(), Duration::hours(-2));
        assert_eq!(auth.actor_from_token(&token), None);
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let auth = AuthManager::new(SECRET);
        let token = token_for("not-a-uuid", Duration::hours(1));
        assert_eq!(auth.actor_from_token(&token), None);
    }

    #[test]
    fn jwt_secret_length_is_enforced() {
        let too_short = "a".repeat(MIN_JWT_SECRET_LEN - 1);
        let result = AuthManager::validate_jwt_secret(&too_short);
        assert!(matches!(
            result,
            Err(AuthConfigError::JwtSecretTooShort {
                min_len: MIN_JWT_SECRET_LEN,
                actual_len: _
            })
        ));

        let valid = "a".repeat(MIN_JWT_SECRET_LEN);
        assert!(AuthManager::validate_jwt_secret(&valid).is_ok());
    }
}
