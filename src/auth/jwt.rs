/// Access Token Signing and Verification
///
/// Access tokens are HMAC-signed JWTs, valid for `access_token_expiry`
/// seconds. There is no server-side state for them; expiry is the only way
/// an issued token stops working.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

/// A signed access token and the moment it stops being accepted
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn signing_secret(config: &JwtSettings) -> Result<&[u8], AppError> {
    if config.secret.is_empty() {
        return Err(ConfigError::MissingRequired("jwt.secret".to_string()).into());
    }
    Ok(config.secret.as_bytes())
}

/// Issue an access token for an account
///
/// # Errors
/// - `ConfigError` if no signing secret is configured
/// - `Internal` if encoding fails
pub fn generate_access_token(
    account_id: Uuid,
    email: &str,
    config: &JwtSettings,
) -> Result<AccessToken, AppError> {
    let secret = signing_secret(config)?;
    let claims = Claims::for_account(
        account_id,
        email,
        Utc::now(),
        Duration::seconds(config.access_token_expiry),
        &config.issuer,
    );

    let expires_at = claims
        .expires_at()
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    Ok(AccessToken { token, expires_at })
}

/// Verify an access token and return its claims
///
/// Rejects non-HMAC algorithms, bad signatures, expired tokens, a foreign
/// issuer and a missing or malformed subject. Every rejection yields the
/// same `TokenInvalid`; the cause is only logged.
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let secret = signing_secret(config)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.leeway = 0;
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!(reason = %e, "Access token rejected");
            AuthError::TokenInvalid
        })?;

    claims.account_id().map_err(|e| {
        tracing::warn!("Access token rejected: malformed subject");
        e
    })?;

    Ok(claims)
}
