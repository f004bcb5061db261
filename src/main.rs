mod api;
mod config;
mod database;
mod middleware;
mod models;
mod realtime;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::realtime::RealtimeRelay;
use crate::services::{DriveClient, LetterService};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("❌ Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("🚀 Starting Letters Service...");
    log::info!("📊 Database: {}", database::database_name(&config.database_url));

    if config.google_client_id.is_none() || config.google_client_secret.is_none() {
        log::warn!("⚠️  Google OAuth credentials missing: sign-in will fail until they are set");
    }
    if config.admin_emails.is_empty() {
        log::info!("ℹ️  ADMIN_EMAILS is empty: nobody gets the admin role");
    }

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(|e| {
            log::error!("❌ Failed to connect to MongoDB: {}", e);
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string())
        })?;

    log::info!("✅ MongoDB connected successfully");

    let letters = LetterService::new(db.clone(), DriveClient::new(), config.clone());

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config.clone());
    let letters_data = web::Data::new(letters);
    let relay_data = web::Data::new(RealtimeRelay::default());

    let bind_address = config.bind_address();
    log::info!("🌐 Server starting on {}", bind_address);
    log::info!("📚 Swagger UI available at: http://{}/swagger-ui/", bind_address);
    log::info!("📄 OpenAPI spec at: http://{}/api-docs/openapi.json", bind_address);

    let cors_origins = config.cors_origins.clone();

    // Start HTTP server
    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CACHE_CONTROL,
                actix_web::http::header::PRAGMA,
            ])
            .expose_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(letters_data.clone())
            .app_data(relay_data.clone())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Auth endpoints
            .service(
                web::scope("/api/v1/auth")
                    .route("/google", web::get().to(api::auth::google_auth))
                    .route("/callback", web::get().to(api::auth::google_callback))
                    .route("/google/token", web::post().to(api::auth::google_token_login))
                    .route("/refresh", web::post().to(api::auth::refresh_token))
                    .route("/verify", web::get().to(api::auth::verify_token))
                    .service(
                        web::resource("/me")
                            .wrap(middleware::AuthMiddleware)
                            .route(web::get().to(api::auth::get_me))
                    )
            )

            // Letters: metadata in MongoDB, content in the owner's Drive - Requires JWT
            .service(
                web::scope("/api/v1/letters")
                    .wrap(middleware::AuthMiddleware)
                    .route("", web::post().to(api::letters::create_letter))
                    .route("", web::get().to(api::letters::list_letters))
                    .route("/{id}", web::get().to(api::letters::get_letter))
                    .route("/{id}", web::put().to(api::letters::update_letter))
                    .route("/{id}", web::delete().to(api::letters::delete_letter))
                    .route("/{id}/collaborators", web::post().to(api::letters::add_collaborator))
                    .route("/{id}/collaborators/{email}", web::delete().to(api::letters::remove_collaborator))
            )

            // Realtime: SSE subscribe + POST publish
            .service(
                web::scope("/api/v1/realtime")
                    .wrap(middleware::AuthMiddleware)
                    .route("/letters/{id}", web::get().to(api::realtime::subscribe))
                    .route("/letters/{id}/changes", web::post().to(api::realtime::publish_change))
            )

            // Admin: role checked per handler
            .service(
                web::scope("/api/v1/admin")
                    .wrap(middleware::AuthMiddleware)
                    .route("/users", web::get().to(api::admin::list_users))
                    .route("/letters", web::get().to(api::admin::list_letters))
            )
    })
    .bind(bind_address)?
    .run()
    .await
}
