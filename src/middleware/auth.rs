use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::future::{ready, Ready};

use crate::config::AppConfig;
use crate::services::auth_service::{self, TokenKind};
use crate::utils::error::AppError;

pub use crate::services::auth_service::Claims;

/// Validates the service access JWT and stores its `Claims` in the request
/// extensions (read them with `web::ReqData<Claims>`).
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

/// Bearer header first; `access_token` query parameter for EventSource clients
pub fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(header_value) = req.headers().get("Authorization") {
        if let Ok(header_str) = header_value.to_str() {
            if let Some(token) = header_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
        return None;
    }

    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .ok()
        .and_then(|query| query.get("access_token").cloned())
        .filter(|token| !token.is_empty())
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(config) => config.clone(),
            None => {
                log::error!("❌ AuthMiddleware mounted without AppConfig");
                return Box::pin(async move {
                    Err(AppError::Config("Auth is not configured".to_string()).into())
                });
            }
        };

        let token = match extract_token(&req) {
            Some(token) => token,
            None => {
                return Box::pin(async move {
                    Err(AppError::Unauthorized("Missing or malformed authorization token".to_string()).into())
                });
            }
        };

        match auth_service::verify_token(&config, &token, TokenKind::Access) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);

                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                log::warn!("❌ Rejected request to {}: {}", req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::sample_user;
    use actix_web::{http::StatusCode, test, App, HttpResponse};

    async fn whoami(claims: web::ReqData<Claims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.sub.clone())
    }

    macro_rules! protected_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_config()))
                    .service(
                        web::scope("/api")
                            .wrap(AuthMiddleware)
                            .route("/whoami", web::get().to(whoami)),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = protected_app!();
        let req = test::TestRequest::get().uri("/api/whoami").to_request();

        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_bearer_token_reaches_handler() {
        let app = protected_app!();
        let token = auth_service::generate_access_token(&test_config(), &sample_user("g-42", "a@b.com")).unwrap();

        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, web::Bytes::from_static(b"g-42"));
    }

    #[actix_web::test]
    async fn query_token_is_accepted() {
        let app = protected_app!();
        let token = auth_service::generate_access_token(&test_config(), &sample_user("g-7", "a@b.com")).unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/whoami?access_token={}", token))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn refresh_token_cannot_authenticate() {
        let app = protected_app!();
        let refresh = auth_service::generate_refresh_token(&test_config(), &sample_user("g-1", "a@b.com")).unwrap();

        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", format!("Bearer {}", refresh)))
            .to_request();

        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[::core::prelude::v1::test]
    fn malformed_header_does_not_fall_back_to_query() {
        let req = test::TestRequest::get()
            .uri("/api/whoami?access_token=abc")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_srv_request();
        assert_eq!(extract_token(&req), None);

        let req = test::TestRequest::get()
            .uri("/api/whoami?access_token=abc")
            .to_srv_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc"));
    }
}
