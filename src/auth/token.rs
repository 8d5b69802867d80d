use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::Identity;
use crate::models::Role;

pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("Invalid token subject")]
    BadSubject,
    #[error("Failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies HS256 session tokens. Verification is stateless:
/// there is no revocation list, a token stays valid until it expires.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        TokenService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64, role: Role) -> Result<String, TokenError> {
        let issued_at = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::BadSubject)?;

        Ok(Identity {
            user_id,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let tokens = TokenService::new("test-secret");
        let token = tokens.issue(42, Role::Admin).unwrap();
        let identity = tokens.verify(&token).unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::with_ttl("test-secret", Duration::seconds(-5));
        let token = tokens.issue(1, Role::User).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = TokenService::new("one").issue(1, Role::User).unwrap();
        assert!(TokenService::new("two").verify(&token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        let tokens = TokenService::new("test-secret");
        assert!(tokens.verify("not.a.jwt").is_err());
        assert!(tokens.verify("").is_err());
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let claims = Claims {
            sub: "alice".into(),
            role: Role::User,
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            TokenService::new("test-secret").verify(&token),
            Err(TokenError::BadSubject)
        ));
    }
}
