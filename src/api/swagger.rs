use utoipa::OpenApi;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Letters Service API",
        version = "1.0.0",
        description = "Write letters, keep them in your own Google Drive and edit them together.\n\n**Authentication:** sign in with Google, then send the returned JWT as a Bearer token. The realtime stream also accepts it as an `access_token` query parameter.\n\n**Features:**\n- Google sign-in with Drive access\n- Letters stored in Drive, indexed in MongoDB\n- Sharing with collaborators by email\n- Live edit relay over server-sent events",
        contact(
            name = "Letters Service Team"
        )
    ),
    paths(
        // Auth
        crate::api::auth::google_auth,
        crate::api::auth::google_token_login,
        crate::api::auth::refresh_token,
        crate::api::auth::verify_token,
        crate::api::auth::get_me,

        // Health
        crate::api::health::health_check,

        // Letters
        crate::api::letters::create_letter,
        crate::api::letters::list_letters,
        crate::api::letters::get_letter,
        crate::api::letters::update_letter,
        crate::api::letters::delete_letter,
        crate::api::letters::add_collaborator,
        crate::api::letters::remove_collaborator,

        // Realtime
        crate::api::realtime::subscribe,
        crate::api::realtime::publish_change,

        // Admin
        crate::api::admin::list_users,
        crate::api::admin::list_letters,
    ),
    components(
        schemas(
            // Auth
            crate::services::auth_service::GoogleCodeRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::AuthResponse,
            crate::services::auth_service::GoogleAuthUrlResponse,
            crate::models::UserInfo,
            crate::models::Role,

            // Health
            crate::api::health::HealthResponse,

            // Letters
            crate::models::CreateLetterRequest,
            crate::models::UpdateLetterRequest,
            crate::models::AddCollaboratorRequest,
            crate::models::LetterResponse,
            crate::models::LetterListItem,
            crate::models::LetterAccess,

            // Realtime
            crate::api::realtime::PublishChangeRequest,
            crate::api::realtime::PublishChangeResponse,
            crate::realtime::LetterChange,
            crate::realtime::ChangeKind,
        )
    ),
    tags(
        (name = "Auth", description = "Google sign-in, token refresh and the current user."),
        (name = "Letters", description = "Letter CRUD and sharing. Content lives in the owner's Google Drive."),
        (name = "Realtime", description = "Live edit relay. Subscribe with server-sent events, publish with POST."),
        (name = "Admin", description = "Cross-user listings for accounts with the admin role."),
        (name = "Health", description = "Health check for monitoring service status."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT from /api/v1/auth/google/token"))
                        .build()
                ),
            );
        }
    }
}
