/// JWT Authentication Middleware
///
/// Verifies the bearer access token on every request it wraps and exposes
/// the authenticated account to handlers through request extensions.
/// Stateless: no store lookups, so it cannot see refresh token revocation.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth::validate_access_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Identity established by a verified access token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedAccount {
    pub account_id: Uuid,
    pub email: String,
}

/// Extract the token from an `Authorization: Bearer <token>` value.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Verify an `Authorization` header value.
///
/// A missing header, a wrong scheme and a bad token all fail with the same
/// `TokenInvalid`.
pub fn authenticate(
    authorization: Option<&str>,
    config: &JwtSettings,
) -> Result<AuthenticatedAccount, AppError> {
    let token = authorization.and_then(bearer_token).ok_or_else(|| {
        tracing::warn!("Missing or malformed Authorization header");
        AppError::Auth(AuthError::TokenInvalid)
    })?;

    let claims = validate_access_token(token, config)?;
    let account_id = claims.account_id()?;

    Ok(AuthenticatedAccount {
        account_id,
        email: claims.email,
    })
}

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    jwt_config: Rc<JwtSettings>,
}

impl JwtMiddleware {
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self {
            jwt_config: Rc::new(jwt_config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: Rc<JwtSettings>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let authorization = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match authenticate(authorization, &self.jwt_config) {
            Ok(account) => {
                tracing::debug!(account_id = %account.account_id, "Access token verified");
                req.extensions_mut().insert(account);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => Box::pin(async move { Err(e.into()) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_access_token;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    fn config() -> JwtSettings {
        JwtSettings {
            secret: "middleware-test-secret-at-least-32".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "taskbox".to_string(),
        }
    }

    async fn whoami(account: web::ReqData<AuthenticatedAccount>) -> HttpResponse {
        HttpResponse::Ok().body(account.account_id.to_string())
    }

    #[::core::prelude::v1::test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[::core::prelude::v1::test]
    fn test_authenticate_valid_token() {
        let config = config();
        let account_id = Uuid::new_v4();
        let issued = generate_access_token(account_id, "a@example.com", &config).unwrap();

        let header = format!("Bearer {}", issued.token);
        let account = authenticate(Some(&header), &config).unwrap();

        assert_eq!(account.account_id, account_id);
        assert_eq!(account.email, "a@example.com");
    }

    #[::core::prelude::v1::test]
    fn test_authenticate_failures_are_uniform() {
        let config = config();
        for header in [None, Some("Basic abc"), Some("Bearer not.a.token")] {
            assert!(matches!(
                authenticate(header, &config),
                Err(AppError::Auth(AuthError::TokenInvalid))
            ));
        }
    }

    #[actix_web::test]
    async fn test_middleware_injects_account() {
        let config = config();
        let account_id = Uuid::new_v4();
        let issued = generate_access_token(account_id, "a@example.com", &config).unwrap();
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(JwtMiddleware::new(config.clone()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", issued.token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert_eq!(body, account_id.to_string());
    }

    #[actix_web::test]
    async fn test_middleware_short_circuits_without_token() {
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(JwtMiddleware::new(config()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        let err = test::try_call_service(&app, req)
            .await
            .err()
            .expect("request without token must fail");

        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }
}
