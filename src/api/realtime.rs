use actix_web::{http::header, web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use crate::{
    api::letters::load_user,
    database::MongoDB,
    middleware::auth::Claims,
    realtime::{sse, LetterChange, RealtimeRelay, SERVER_ORIGIN},
    services::LetterService,
    utils::error::AppError,
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscribeQuery {
    /// Editor instance id; changes it publishes are not echoed back
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PublishChangeRequest {
    pub client_id: String,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PublishChangeResponse {
    pub success: bool,
    /// Open subscriptions the change was handed to, across all letters
    pub delivered: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/realtime/letters/{id}",
    tag = "Realtime",
    params(
        ("id" = String, Path, description = "Letter id"),
        SubscribeQuery
    ),
    responses(
        (status = 200, description = "text/event-stream of edits by other clients"),
        (status = 403, description = "No access to this letter"),
        (status = 404, description = "Letter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn subscribe(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    query: web::Query<SubscribeQuery>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    relay: web::Data<RealtimeRelay>,
) -> HttpResponse {
    let letter_id = path.into_inner();

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    let letter = match letters.readable_letter(&user, &letter_id).await {
        Ok(letter) => letter,
        Err(e) => {
            log::warn!("⚠️ Realtime subscribe to {} refused: {}", letter_id, e);
            return e.error_response();
        }
    };

    let client_id = match query.client_id.as_deref().map(str::trim) {
        Some(id) if id == SERVER_ORIGIN => {
            return AppError::InvalidRequest(format!("client_id '{}' is reserved", SERVER_ORIGIN)).error_response();
        }
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    // Path ids may differ in case; the relay keys on the canonical hex form
    let letter_id = letter.id_hex();
    log::info!("📡 {} joined letter {} as {}", user.user_id, letter_id, client_id);

    let subscription = relay.subscribe(&letter_id, &client_id, &user.email);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(sse::event_stream(subscription, sse::KEEP_ALIVE_INTERVAL))
}

#[utoipa::path(
    post,
    path = "/api/v1/realtime/letters/{id}/changes",
    tag = "Realtime",
    params(("id" = String, Path, description = "Letter id")),
    request_body = PublishChangeRequest,
    responses(
        (status = 200, description = "Change relayed", body = PublishChangeResponse),
        (status = 400, description = "Missing or reserved client_id"),
        (status = 403, description = "No access to this letter")
    ),
    security(("bearer_auth" = []))
)]
pub async fn publish_change(
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    db: web::Data<MongoDB>,
    letters: web::Data<LetterService>,
    relay: web::Data<RealtimeRelay>,
    request: web::Json<PublishChangeRequest>,
) -> HttpResponse {
    let letter_id = path.into_inner();
    let request = request.into_inner();

    let client_id = request.client_id.trim();
    if client_id.is_empty() {
        return AppError::InvalidRequest("client_id is required".to_string()).error_response();
    }
    if client_id == SERVER_ORIGIN {
        return AppError::InvalidRequest(format!("client_id '{}' is reserved", SERVER_ORIGIN)).error_response();
    }

    let user = match load_user(&db, &claims).await {
        Ok(user) => user,
        Err(e) => return e.error_response(),
    };

    let letter = match letters.readable_letter(&user, &letter_id).await {
        Ok(letter) => letter,
        Err(e) => {
            log::warn!("⚠️ Realtime publish to {} refused: {}", letter_id, e);
            return e.error_response();
        }
    };

    let delivered = relay.publish(LetterChange::edit(
        &letter.id_hex(),
        client_id,
        &user.user_id,
        request.payload,
    ));

    HttpResponse::Ok().json(PublishChangeResponse {
        success: true,
        delivered,
    })
}
