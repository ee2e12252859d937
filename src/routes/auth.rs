/// Authentication Routes
///
/// Registration, login, refresh-token rotation, logout and the current
/// account profile. The refresh secret travels in an HttpOnly cookie scoped
/// to `/api/auth`, or in the JSON body when no cookie is sent; a rotated
/// secret goes back on the channel the old one arrived on.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{IssuedSession, MintedRefreshToken, SessionManager};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext};
use crate::middleware::AuthenticatedAccount;
use crate::models::Account;
use crate::store::Lookup;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body fallback for clients that do not keep cookies
#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    /// Only set when the refresh secret was presented in the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    fn new(session: &IssuedSession, refresh_token: Option<String>) -> Self {
        Self {
            access_token: session.access_token.token.clone(),
            token_type: "Bearer".to_string(),
            expires_at: session.access_token.expires_at,
            expires_in: (session.access_token.expires_at - Utc::now()).num_seconds().max(0),
            refresh_token,
        }
    }
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email,
            name: account.name,
        }
    }
}

fn base_cookie(value: String, settings: &AuthSettings) -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE_NAME, value)
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(settings.cookie_secure)
        .same_site(SameSite::Strict)
        .finish();
    if let Some(domain) = &settings.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

fn refresh_cookie(token: &MintedRefreshToken, settings: &AuthSettings) -> Cookie<'static> {
    let mut cookie = base_cookie(token.secret.clone(), settings);
    let max_age = (token.expires_at - Utc::now()).num_seconds().max(0);
    cookie.set_max_age(CookieDuration::seconds(max_age));
    cookie
}

fn removal_cookie(settings: &AuthSettings) -> Cookie<'static> {
    let mut cookie = base_cookie(String::new(), settings);
    cookie.make_removal();
    cookie
}

/// Refresh secret from the cookie, else from the body. `true` if it came
/// from the cookie.
fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> (Option<String>, bool) {
    if let Some(cookie) = req.cookie(REFRESH_COOKIE_NAME) {
        if !cookie.value().is_empty() {
            return (Some(cookie.value().to_string()), true);
        }
    }

    let from_body = body
        .and_then(|b| b.into_inner().refresh_token)
        .filter(|t| !t.is_empty());
    (from_body, false)
}

/// POST /api/auth/register
///
/// # Errors
/// - 400: invalid email, password out of bounds or name over 100 characters
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_registration");

    let account = sessions
        .register(&form.email, &form.password, form.name.as_deref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %account.id,
        "Account registered"
    );

    Ok(HttpResponse::Created().json(AccountResponse::from(account)))
}

/// POST /api/auth/login
///
/// Returns the access token in the body and sets the refresh cookie.
///
/// # Errors
/// - 400: email or password missing
/// - 401: invalid credentials (same body for unknown email and wrong password)
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("login");

    let session = sessions.login(&form.email, &form.password).await?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %session.account_id,
        "Login succeeded"
    );

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&session.refresh_token, &settings))
        .json(TokenResponse::new(&session, None)))
}

/// POST /api/auth/refresh
///
/// # Errors
/// - 401: refresh token missing, unknown, expired, revoked or already used
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionManager>,
    settings: web::Data<AuthSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let (presented, via_cookie) = presented_refresh_token(&req, body);
    let presented = presented.ok_or(AppError::Auth(AuthError::Unauthorized))?;

    let session = sessions.refresh(&presented).await?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %session.account_id,
        via_cookie,
        "Session refreshed"
    );

    if via_cookie {
        Ok(HttpResponse::Ok()
            .cookie(refresh_cookie(&session.refresh_token, &settings))
            .json(TokenResponse::new(&session, None)))
    } else {
        let secret = session.refresh_token.secret.clone();
        Ok(HttpResponse::Ok().json(TokenResponse::new(&session, Some(secret))))
    }
}

/// POST /api/auth/logout
///
/// Always 200, whether or not the presented token was valid.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionManager>,
    settings: web::Data<AuthSettings>,
) -> HttpResponse {
    let (presented, _) = presented_refresh_token(&req, body);

    sessions.logout(presented.as_deref()).await;

    HttpResponse::Ok()
        .cookie(removal_cookie(&settings))
        .json(serde_json::json!({ "message": "logged out" }))
}

/// GET /api/me
///
/// **Requires a valid access token**; the account is injected by
/// `JwtMiddleware`.
pub async fn get_current_account(
    account: web::ReqData<AuthenticatedAccount>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("current_account")
        .with_account_id(account.account_id.to_string());

    match sessions.account(account.account_id).await? {
        Lookup::Found(account) => Ok(HttpResponse::Ok().json(AccountResponse::from(account))),
        Lookup::NotFound => {
            let err = AppError::Database(DatabaseError::NotFound("account".to_string()));
            context.log_error(&err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use chrono::Duration;

    fn settings(domain: Option<&str>) -> AuthSettings {
        AuthSettings {
            cookie_domain: domain.map(str::to_string),
            cookie_secure: true,
            password_hash_cost: 4,
        }
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let token = MintedRefreshToken {
            secret: "s3cr3t".to_string(),
            expires_at: Utc::now() + Duration::days(7),
        };
        let cookie = refresh_cookie(&token, &settings(Some("example.com")));

        assert_eq!(cookie.name(), REFRESH_COOKIE_NAME);
        assert_eq!(cookie.value(), "s3cr3t");
        assert_eq!(cookie.path(), Some(REFRESH_COOKIE_PATH));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.domain(), Some("example.com"));
        let max_age = cookie.max_age().unwrap().whole_seconds();
        assert!(max_age > 7 * 24 * 3600 - 60 && max_age <= 7 * 24 * 3600);
    }

    #[test]
    fn test_removal_cookie_clears_value() {
        let cookie = removal_cookie(&settings(None));
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.max_age().map(|d| d.whole_seconds()), Some(0));
    }

    #[test]
    fn test_cookie_takes_precedence_over_body() {
        let req = TestRequest::default()
            .cookie(Cookie::new(REFRESH_COOKIE_NAME, "from-cookie"))
            .to_http_request();
        let body = web::Json(RefreshRequest {
            refresh_token: Some("from-body".to_string()),
        });

        let (token, via_cookie) = presented_refresh_token(&req, Some(body));
        assert_eq!(token.as_deref(), Some("from-cookie"));
        assert!(via_cookie);
    }

    #[test]
    fn test_body_fallback() {
        let req = TestRequest::default().to_http_request();
        let body = web::Json(RefreshRequest {
            refresh_token: Some("from-body".to_string()),
        });

        let (token, via_cookie) = presented_refresh_token(&req, Some(body));
        assert_eq!(token.as_deref(), Some("from-body"));
        assert!(!via_cookie);

        let (token, _) = presented_refresh_token(&req, None);
        assert!(token.is_none());
    }
}
