//! Bearer token authentication
//!
//! Operators call the API with an HS256 JWT whose `roles` claim lists the
//! payment permissions they hold. The `admin` role holds all of them.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

const ADMIN_ROLE: &str = "admin";

/// Seconds of clock skew tolerated on `exp`
const LEEWAY_SECS: u64 = 30;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Operator id, written to the audit log
    pub sub: String,
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

/// Issues a token for `subject` valid for `ttl_secs`
pub fn create_token(subject: &str, roles: Vec<String>, secret: &str, ttl_secs: u64) -> Result<String, AuthError> {
    let issued = Utc::now();
    let ttl = Duration::seconds(i64::try_from(ttl_secs).map_err(|_| AuthError::InvalidToken)?);
    let claims = Claims {
        sub: subject.to_string(),
        roles,
        exp: (issued + ttl).timestamp(),
        iat: issued.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Verifies signature and expiry and returns the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = LEEWAY_SECS;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
}

pub fn has_role(claims: &Claims, role: &str) -> bool {
    claims.roles.iter().any(|r| r == role || r == ADMIN_ROLE)
}

/// 403 unless the caller holds `permission`
pub fn require(claims: &Claims, permission: &str) -> Result<(), ApiError> {
    if has_role(claims, permission) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            AuthError::MissingPermission(permission.to_string()).to_string(),
        ))
    }
}

/// Roles checked by the payment handlers
pub mod permissions {
    /// Status, history and statistics
    pub const PAYMENT_READ: &str = "payment:read";
    /// Checkout initiation and checkout callbacks
    pub const PAYMENT_WRITE: &str = "payment:write";
    pub const PAYMENT_REFUND: &str = "payment:refund";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-jwt-secret";

    fn claims_expiring_in(secs: i64, roles: &[&str]) -> Claims {
        let now = Utc::now();
        Claims {
            sub: "ops-1".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp: (now + Duration::seconds(secs)).timestamp(),
            iat: now.timestamp(),
        }
    }

    fn sign(claims: &Claims) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_issued_token_validates() {
        let token = create_token("ops-1", vec![permissions::PAYMENT_READ.to_string()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "ops-1");
        assert!(has_role(&claims, permissions::PAYMENT_READ));
        assert!(!has_role(&claims, permissions::PAYMENT_REFUND));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = create_token("ops-1", vec![], SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let token = sign(&claims_expiring_in(-3600, &[]));
        assert!(matches!(validate_token(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_small_clock_skew_is_tolerated() {
        let token = sign(&claims_expiring_in(-5, &[]));
        assert!(validate_token(&token, SECRET).is_ok());
    }

    #[test]
    fn test_admin_holds_every_permission() {
        let claims = claims_expiring_in(60, &[ADMIN_ROLE]);
        assert!(require(&claims, permissions::PAYMENT_REFUND).is_ok());

        let reader = claims_expiring_in(60, &[permissions::PAYMENT_READ]);
        assert!(matches!(
            require(&reader, permissions::PAYMENT_REFUND),
            Err(ApiError::Forbidden(_))
        ));
    }
}
