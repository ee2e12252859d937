/// Authentication module
///
/// Password hashing, access token signing/verification, opaque refresh
/// token storage, and the session manager that ties them together.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::Claims;
pub use jwt::{generate_access_token, validate_access_token, AccessToken};
pub use password::CredentialHasher;
pub use refresh_token::{generate_refresh_token, hash_token, MintedRefreshToken, RefreshTokens};
pub use session::{IssuedSession, SessionManager};
