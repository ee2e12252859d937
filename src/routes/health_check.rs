use actix_web::HttpResponse;

/// GET /health_check
///
/// Liveness only; does not touch the account or token stores.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
