use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::database::MongoDB;
use crate::realtime::RealtimeRelay;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
    /// `None` when the process runs without a database handle
    pub database: Option<bool>,
    pub realtime_subscribers: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(
    db: Option<web::Data<MongoDB>>,
    relay: Option<web::Data<RealtimeRelay>>,
) -> impl Responder {
    let database = match db {
        Some(db) => Some(db.ping().await),
        None => None,
    };

    let healthy = database.unwrap_or(true);
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        service: "letters-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        database,
        realtime_subscribers: relay.map(|relay| relay.subscriber_count()).unwrap_or(0),
    };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        log::warn!("⚠️ Health check: MongoDB ping failed");
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn healthy_without_database_handle() {
        let relay = RealtimeRelay::new(4);
        let _subscription = relay.subscribe("letter-1", "client-1", "a@mail.com");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(relay))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "letters-service");
        assert!(body["database"].is_null());
        assert_eq!(body["realtime_subscribers"], 1);
    }
}
