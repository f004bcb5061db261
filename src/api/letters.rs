use actix_web::{web, HttpResponse, ResponseError};
use crate::{
    database::MongoDB,
    middleware::auth::Claims,
    models::{
        AddCollaboratorRequest, CreateLetterRequest, LetterListItem, LetterResponse, UpdateLetterRequest, User,
    },
    realtime::{ChangeKind, LetterChange, RealtimeRelay},
    services::{auth_service, letter_service::parse_letter_id, LetterService},
    utils::error::AppError,
};

/// Loads the caller's stored profile (role and OAuth tokens live there, not in the JWT)
pub async fn load_user(db: &MongoDB, claims: &Claims) -> Result<User, AppError> {
    auth_service::find_user(db, &claims.sub).await.map_err(|e| match e {
        AppError::NotFound(_) => AppError::Unauthorized("Account no longer exists".to_string()),
        other => other,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/letters",
    tag = "Letters",
    request_body = CreateLetterRequest,
    responses(
        (status = 201, description = "Letter saved to Drive and database", body = LetterResponse),
        (status = 400, description = "Missing title"),
        (status = 502, description = "Google Drive failure")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_letter(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    request: web::Json<CreateLetterRequest>,
) -> HttpResponse {
    log::info!("📝 POST /letters - user {}", claims.sub);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.save_letter(&user, request.into_inner()).await {
        Ok(letter) => {
            log::info!("✅ Letter created: {}", letter.id);
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "letter": letter
            }))
        }
        Err(e) => {
            log::error!("❌ Failed to save letter for {}: {}", claims.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/letters",
    tag = "Letters",
    responses(
        (status = 200, description = "Owned and shared letters, newest first", body = [LetterListItem])
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_letters(
    claims: web::ReqData<Claims>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
) -> HttpResponse {
    log::info!("📋 GET /letters - user {}", claims.sub);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.list_letters(&user).await {
        Ok(items) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": items.len(),
            "letters": items
        })),
        Err(e) => {
            log::error!("❌ Failed to list letters: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/letters/{id}",
    tag = "Letters",
    params(("id" = String, Path, description = "Letter id")),
    responses(
        (status = 200, description = "Letter with content", body = LetterResponse),
        (status = 403, description = "Not owner nor collaborator"),
        (status = 404, description = "Letter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_letter(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
) -> HttpResponse {
    let letter_id = path.into_inner();
    log::info!("📄 GET /letters/{} - user {}", letter_id, claims.sub);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.get_letter(&user, &letter_id).await {
        Ok(letter) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "letter": letter
        })),
        Err(e) => {
            log::warn!("⚠️ GET /letters/{} failed: {}", letter_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/letters/{id}",
    tag = "Letters",
    params(("id" = String, Path, description = "Letter id")),
    request_body = UpdateLetterRequest,
    responses(
        (status = 200, description = "Letter updated in Drive and database", body = LetterResponse),
        (status = 403, description = "Not owner nor collaborator"),
        (status = 404, description = "Letter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_letter(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    relay: web::Data<RealtimeRelay>,
    request: web::Json<UpdateLetterRequest>,
) -> HttpResponse {
    let letter_id = path.into_inner();
    log::info!("✏️ PUT /letters/{} - user {}", letter_id, claims.sub);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.update_letter(&user, &letter_id, request.into_inner()).await {
        Ok(letter) => {
            relay.publish(LetterChange::from_server(
                &letter.id,
                &user.user_id,
                ChangeKind::Saved,
                serde_json::json!({ "title": &letter.title, "updated_at": letter.updated_at }),
            ));
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "letter": letter
            }))
        }
        Err(e) => {
            log::warn!("⚠️ PUT /letters/{} failed: {}", letter_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/letters/{id}",
    tag = "Letters",
    params(("id" = String, Path, description = "Letter id")),
    responses(
        (status = 200, description = "Letter deleted (Drive deletion is best-effort)"),
        (status = 403, description = "Only the owner can delete"),
        (status = 404, description = "Letter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_letter(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    relay: web::Data<RealtimeRelay>,
) -> HttpResponse {
    let letter_id = path.into_inner();
    log::info!("🗑️ DELETE /letters/{} - user {}", letter_id, claims.sub);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.delete_letter(&user, &letter_id).await {
        Ok(()) => {
            let relay_id = parse_letter_id(&letter_id)
                .map(|id| id.to_hex())
                .unwrap_or_else(|_| letter_id.clone());
            relay.publish(LetterChange::from_server(
                &relay_id,
                &user.user_id,
                ChangeKind::Deleted,
                serde_json::Value::Null,
            ));
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "Letter deleted"
            }))
        }
        Err(e) => {
            log::warn!("⚠️ DELETE /letters/{} failed: {}", letter_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/letters/{id}/collaborators",
    tag = "Letters",
    params(("id" = String, Path, description = "Letter id")),
    request_body = AddCollaboratorRequest,
    responses(
        (status = 200, description = "Writer permission granted", body = LetterResponse),
        (status = 400, description = "Invalid email"),
        (status = 403, description = "Only the owner can share")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_collaborator(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    request: web::Json<AddCollaboratorRequest>,
) -> HttpResponse {
    let letter_id = path.into_inner();
    log::info!("🤝 POST /letters/{}/collaborators - {}", letter_id, request.email);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.add_collaborator(&user, &letter_id, &request.email).await {
        Ok(letter) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "letter": letter
        })),
        Err(e) => {
            log::warn!("⚠️ Sharing letter {} failed: {}", letter_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/letters/{id}/collaborators/{email}",
    tag = "Letters",
    params(
        ("id" = String, Path, description = "Letter id"),
        ("email" = String, Path, description = "Collaborator email")
    ),
    responses(
        (status = 200, description = "Collaborator removed", body = LetterResponse),
        (status = 404, description = "Letter or collaborator not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_collaborator(
    claims: web::ReqData<Claims>,
    path: web::Path<(String, String)>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    relay: web::Data<RealtimeRelay>,
) -> HttpResponse {
    let (letter_id, email) = path.into_inner();
    log::info!("🚪 DELETE /letters/{}/collaborators/{}", letter_id, email);

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    match letters.remove_collaborator(&user, &letter_id, &email).await {
        Ok(letter) => {
            // Closes the live streams the removed collaborator still holds
            relay.publish(LetterChange::revoked(&letter.id, &user.user_id, &email));
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "letter": letter
            }))
        }
        Err(e) => {
            log::warn!("⚠️ Unsharing letter {} failed: {}", letter_id, e);
            e.error_response()
        }
    }
}
