/// Access token payload
///
/// Identity (`sub`, `email`) plus the registered claims `exp`, `iat` and
/// `iss` (RFC 7519). Expiry and issuer are enforced by `jsonwebtoken` during
/// decoding; this type only builds and reads them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Account id as a hyphenated UUID
    pub sub: String,
    pub email: String,
    /// Unix seconds
    pub exp: i64,
    /// Unix seconds
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    /// Claims for `account_id`, issued at `issued_at` and valid for `lifetime`
    pub fn for_account(
        account_id: Uuid,
        email: &str,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        issuer: &str,
    ) -> Self {
        Self {
            sub: account_id.to_string(),
            email: email.to_string(),
            exp: (issued_at + lifetime).timestamp(),
            iat: issued_at.timestamp(),
            iss: issuer.to_string(),
        }
    }

    /// The subject as an account id. A non-UUID subject makes the whole
    /// token invalid.
    pub fn account_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid)
    }

    /// `exp` as a timestamp; `None` if out of chrono's range
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.exp, 0)
    }
}
