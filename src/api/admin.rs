use actix_web::{web, HttpResponse, ResponseError};

use crate::{
    api::letters::load_user,
    database::MongoDB,
    middleware::auth::Claims,
    models::{LetterListItem, User, UserInfo},
    services::{auth_service, LetterService},
    utils::error::AppError,
};

async fn load_admin(db: &MongoDB, claims: &Claims) -> Result<User, AppError> {
    let user = load_user(db, claims).await?;
    if !user.is_admin() {
        log::warn!("🚫 {} tried to reach an admin route", user.email);
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(user)
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "Admin",
    responses(
        (status = 200, description = "Every registered user", body = [UserInfo]),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(claims: web::ReqData<Claims>, db: web::Data<MongoDB>) -> HttpResponse {
    log::info!("🛡️ GET /admin/users - {}", claims.sub);

    if let Err(e) = load_admin(&db, &claims).await {
        return e.error_response();
    }

    match auth_service::list_users(&db).await {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": users.len(),
            "users": users
        })),
        Err(e) => {
            log::error!("❌ Failed to list users: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/letters",
    tag = "Admin",
    responses(
        (status = 200, description = "Every letter, newest first", body = [LetterListItem]),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_letters(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
) -> HttpResponse {
    log::info!("🛡️ GET /admin/letters - {}", claims.sub);

    let admin = match load_admin(&db, &claims).await {
        Ok(admin) => admin,
        Err(e) => return e.error_response(),
    };

    match letters.list_all_letters(&admin).await {
        Ok(items) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": items.len(),
            "letters": items
        })),
        Err(e) => {
            log::error!("❌ Failed to list all letters: {}", e);
            e.error_response()
        }
    }
}
