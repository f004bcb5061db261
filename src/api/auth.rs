use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::{
    config::AppConfig,
    database::MongoDB,
    middleware::auth::Claims,
    models::UserInfo,
    services::auth_service::{self, AuthResponse, GoogleAuthUrlResponse, GoogleCodeRequest, RefreshTokenRequest, TokenKind},
    utils::error::AppError,
};

#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    tag = "Auth",
    responses(
        (status = 200, description = "Google consent URL", body = GoogleAuthUrlResponse),
        (status = 500, description = "Google OAuth not configured")
    )
)]
pub async fn google_auth(config: web::Data<AppConfig>) -> HttpResponse {
    log::info!("🔐 GET /auth/google - Generating OAuth URL");

    match auth_service::google_auth_url(&config) {
        Ok(response) => HttpResponse::Ok()
            .cookie(state_cookie(&config, &response.state))
            .json(response),
        Err(e) => {
            log::error!("❌ Failed to generate Google OAuth URL: {}", e);
            e.error_response()
        }
    }
}

/// Binds the OAuth `state` to the browser that started the login
pub const OAUTH_STATE_COOKIE: &str = "letters_oauth_state";
const OAUTH_COOKIE_PATH: &str = "/api/v1/auth";

fn state_cookie(config: &AppConfig, state: &str) -> Cookie<'static> {
    Cookie::build(OAUTH_STATE_COOKIE, state.to_string())
        .path(OAUTH_COOKIE_PATH)
        .http_only(true)
        .secure(config.google_redirect_uri.starts_with("https://"))
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(10))
        .finish()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Every callback outcome consumes the state cookie
fn redirect(location: String) -> HttpResponse {
    let mut expired = Cookie::build(OAUTH_STATE_COOKIE, "")
        .path(OAUTH_COOKIE_PATH)
        .finish();
    expired.make_removal();

    HttpResponse::Found()
        .append_header(("Location", location))
        .cookie(expired)
        .finish()
}

/// Browser redirect flow: Google sends the user here, we send them to the frontend
pub async fn google_callback(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    log::info!("🔐 GET /auth/callback - Processing Google OAuth");

    let frontend_url = config.frontend_url.trim_end_matches('/');

    if let Some(error) = &query.error {
        log::error!("❌ OAuth error: {}", error);
        return redirect(format!(
            "{}/auth/callback?error={}",
            frontend_url,
            urlencoding::encode(error)
        ));
    }

    let expected_state = req.cookie(OAUTH_STATE_COOKIE).map(|cookie| cookie.value().to_string());
    let state_matches = match (&query.state, &expected_state) {
        (Some(state), Some(expected)) => !state.is_empty() && state == expected,
        _ => false,
    };
    if !state_matches {
        log::warn!("🚫 OAuth callback with missing or mismatched state");
        return redirect(format!("{}/auth/callback?error=invalid_state", frontend_url));
    }

    let code = match &query.code {
        Some(code) => code,
        None => {
            log::error!("❌ No authorization code provided");
            return redirect(format!("{}/auth/callback?error=no_code", frontend_url));
        }
    };

    match auth_service::login_with_google_code(&db, &config, code).await {
        Ok(response) => {
            log::info!("✅ Google OAuth successful for {}", response.user.id);
            redirect(format!(
                "{}/auth/callback?access_token={}&refresh_token={}&user_id={}&email={}&name={}",
                frontend_url,
                urlencoding::encode(&response.token),
                urlencoding::encode(&response.refresh_token),
                urlencoding::encode(&response.user.id),
                urlencoding::encode(&response.user.email),
                urlencoding::encode(&response.user.name)
            ))
        }
        Err(e) => {
            log::error!("❌ Google OAuth failed: {}", e);
            redirect(format!(
                "{}/auth/callback?error={}",
                frontend_url,
                urlencoding::encode(&e.to_string())
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/google/token",
    tag = "Auth",
    request_body = GoogleCodeRequest,
    responses(
        (status = 200, description = "Logged in; user created on first login", body = AuthResponse),
        (status = 502, description = "Google rejected the code")
    )
)]
pub async fn google_token_login(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<GoogleCodeRequest>,
) -> HttpResponse {
    log::info!("🔐 POST /auth/google/token");

    if request.code.trim().is_empty() {
        return AppError::InvalidRequest("code is required".to_string()).error_response();
    }

    match auth_service::login_with_google_code(&db, &config, request.code.trim()).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", response.user.email);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::warn!("❌ Google login failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh_token(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RefreshTokenRequest>,
) -> HttpResponse {
    log::info!("🔄 POST /auth/refresh");

    match auth_service::refresh_session(&db, &config, &request).await {
        Ok(response) => {
            log::info!("✅ Token refreshed for {}", response.user.id);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::warn!("❌ Token refresh failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/verify",
    tag = "Auth",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Invalid or expired token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify_token(req: HttpRequest, config: web::Data<AppConfig>) -> HttpResponse {
    log::info!("✓ GET /auth/verify");

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": "No valid Authorization header"
            }))
        }
    };

    match auth_service::verify_token(&config, token, TokenKind::Access) {
        Ok(claims) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "valid": true,
            "user_id": claims.sub,
            "email": claims.email,
            "role": claims.role,
            "exp": claims.exp
        })),
        Err(e) => {
            log::warn!("❌ Invalid token: {}", e);
            HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "valid": false,
                "error": e.to_string()
            }))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "User information retrieved", body = UserInfo),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(claims: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    log::info!("👤 GET /auth/me - {}", claims.sub);

    match auth_service::current_user(&db, &claims.sub).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": user
        })),
        Err(e) => {
            log::error!("❌ Failed to get user: {}", e);
            e.error_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::sample_user;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn google_auth_returns_consent_url() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .route("/api/v1/auth/google", web::get().to(google_auth)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/auth/google").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert!(body["auth_url"].as_str().unwrap().contains("drive.file"));
    }

    #[actix_web::test]
    async fn verify_reports_token_validity() {
        let config = test_config();
        let token = auth_service::generate_access_token(&config, &sample_user("g-5", "e@mail.com")).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .route("/api/v1/auth/verify", web::get().to(verify_token)),
        )
        .await;

        let ok = test::TestRequest::get()
            .uri("/api/v1/auth/verify")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::read_body_json(test::call_service(&app, ok).await).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["user_id"], "g-5");

        let bad = test::TestRequest::get()
            .uri("/api/v1/auth/verify")
            .insert_header(("Authorization", "Bearer garbage"))
            .to_request();
        assert_eq!(test::call_service(&app, bad).await.status(), StatusCode::UNAUTHORIZED);

        let missing = test::TestRequest::get().uri("/api/v1/auth/verify").to_request();
        assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::BAD_REQUEST);
    }

    macro_rules! callback_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_config()))
                    .app_data(web::Data::new(MongoDB::unconnected().await))
                    .route("/api/v1/auth/callback", web::get().to(google_callback)),
            )
            .await
        };
    }

    fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
        resp.headers().get("Location").unwrap().to_str().unwrap().to_string()
    }

    #[actix_web::test]
    async fn consent_url_state_is_pinned_in_a_cookie() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .route("/api/v1/auth/google", web::get().to(google_auth)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/auth/google").to_request()).await;
        let cookie = resp
            .response()
            .cookies()
            .find(|cookie| cookie.name() == OAUTH_STATE_COOKIE)
            .expect("state cookie");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/api/v1/auth"));
        let pinned = cookie.value().to_string();

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["state"], pinned.as_str());
    }

    #[actix_web::test]
    async fn callback_with_mismatched_state_is_rejected() {
        let app = callback_app!();

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/callback?code=4/abc&state=forged")
            .cookie(Cookie::new(OAUTH_STATE_COOKIE, "issued-state"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "http://localhost:3000/auth/callback?error=invalid_state");
    }

    #[actix_web::test]
    async fn callback_without_state_cookie_is_rejected() {
        let app = callback_app!();

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/callback?code=4/abc&state=issued-state")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(location(&resp), "http://localhost:3000/auth/callback?error=invalid_state");
    }

    #[actix_web::test]
    async fn callback_with_state_but_no_code_redirects_with_error() {
        let app = callback_app!();

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/callback?state=issued-state")
            .cookie(Cookie::new(OAUTH_STATE_COOKIE, "issued-state"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(location(&resp), "http://localhost:3000/auth/callback?error=no_code");
        let cleared = resp
            .response()
            .cookies()
            .find(|cookie| cookie.name() == OAUTH_STATE_COOKIE)
            .expect("state cookie cleared");
        assert_eq!(cleared.value(), "");
    }

    #[actix_web::test]
    async fn callback_without_code_redirects_with_error() {
        let app = callback_app!();

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/v1/auth/callback?error=access_denied").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "http://localhost:3000/auth/callback?error=access_denied");
    }
}
