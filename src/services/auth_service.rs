use crate::{
    config::AppConfig,
    database::{MongoDB, USERS},
    models::{Role, User, UserInfo},
    utils::error::AppError,
};
use base64::Engine;
use chrono::{Duration, Utc};
use futures::stream::StreamExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// `drive.file` only grants access to files this app created or opened.
pub const GOOGLE_SCOPES: &str = "openid email profile https://www.googleapis.com/auth/drive.file";

/// Seconds before expiry at which the Google access token gets refreshed
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub name: String,
    pub role: Role,
    pub typ: TokenKind,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GoogleCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct GoogleAuthUrlResponse {
    pub success: bool,
    pub auth_url: String,
    pub state: String,
}

/// Token endpoint payload (authorization_code and refresh_token grants)
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Identity claims shared by the id_token payload and the userinfo endpoint
#[derive(Debug, Deserialize, PartialEq)]
pub struct GoogleIdentity {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ==================== SERVICE JWT ====================

fn issue_token(config: &AppConfig, user: &User, kind: TokenKind, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now();

    let claims = Claims {
        sub: user.user_id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        typ: kind,
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.jwt_audience.clone(),
        iss: config.jwt_issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Config(format!("Failed to generate token: {}", e)))
}

pub fn generate_access_token(config: &AppConfig, user: &User) -> Result<String, AppError> {
    issue_token(config, user, TokenKind::Access, Duration::hours(24))
}

pub fn generate_refresh_token(config: &AppConfig, user: &User) -> Result<String, AppError> {
    issue_token(config, user, TokenKind::Refresh, Duration::days(30))
}

/// Validates signature, expiry, audience, issuer and token type
pub fn verify_token(config: &AppConfig, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.jwt_audience.as_str()]);
    validation.set_issuer(&[config.jwt_issuer.as_str()]);

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    if claims.typ != kind {
        return Err(AppError::Unauthorized(format!(
            "Expected {:?} token, got {:?}",
            kind, claims.typ
        )));
    }

    Ok(claims)
}

fn auth_response(config: &AppConfig, user: &User) -> Result<AuthResponse, AppError> {
    Ok(AuthResponse {
        success: true,
        token: generate_access_token(config, user)?,
        refresh_token: generate_refresh_token(config, user)?,
        user: UserInfo::from(user),
    })
}

// ==================== GOOGLE OAUTH ====================

pub fn google_auth_url(config: &AppConfig) -> Result<GoogleAuthUrlResponse, AppError> {
    let client_id = config
        .google_client_id
        .as_deref()
        .ok_or_else(|| AppError::Config("GOOGLE_CLIENT_ID not configured".to_string()))?;

    // CSRF protection
    let state = Uuid::new_v4().to_string();

    // prompt=consent so Google sends a refresh_token again after revocation
    let params = [
        ("client_id", client_id),
        ("redirect_uri", config.google_redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", GOOGLE_SCOPES),
        ("state", state.as_str()),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("include_granted_scopes", "true"),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Ok(GoogleAuthUrlResponse {
        success: true,
        auth_url: format!("{}?{}", GOOGLE_AUTH_URL, query_string),
        state,
    })
}

async fn request_google_tokens(form: &[(&str, &str)]) -> Result<GoogleTokenResponse, AppError> {
    let client = reqwest::Client::new();
    let response = client
        .post(GOOGLE_TOKEN_URL)
        .form(form)
        .send()
        .await
        .map_err(|e| AppError::IdentityError(format!("Token request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::IdentityError(format!(
            "Token endpoint returned {}: {}",
            status, body
        )));
    }

    response
        .json::<GoogleTokenResponse>()
        .await
        .map_err(|e| AppError::IdentityError(format!("Failed to parse token response: {}", e)))
}

/// Exchange an authorization code for Google tokens
pub async fn exchange_code(config: &AppConfig, code: &str) -> Result<GoogleTokenResponse, AppError> {
    let (client_id, client_secret) = config.google_credentials()?;

    request_google_tokens(&[
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", config.google_redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ])
    .await
}

/// Reads the identity claims of an id_token.
///
/// The id_token comes straight from Google's token endpoint over TLS, so its
/// signature is not re-verified here.
pub fn decode_id_token(id_token: &str) -> Result<GoogleIdentity, AppError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::IdentityError("Malformed id_token".to_string()))?;

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AppError::IdentityError(format!("Failed to decode id_token payload: {}", e)))?;

    serde_json::from_slice::<GoogleIdentity>(&bytes)
        .map_err(|e| AppError::IdentityError(format!("Failed to parse id_token payload: {}", e)))
}

async fn fetch_userinfo(access_token: &str) -> Result<GoogleIdentity, AppError> {
    let client = reqwest::Client::new();
    let response = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AppError::IdentityError(format!("Failed to get user info: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::IdentityError(format!(
            "Userinfo endpoint returned {}",
            response.status()
        )));
    }

    response
        .json::<GoogleIdentity>()
        .await
        .map_err(|e| AppError::IdentityError(format!("Failed to parse user info: {}", e)))
}

pub fn role_for_email(config: &AppConfig, email: &str) -> Role {
    if config.is_admin_email(email) {
        Role::Admin
    } else {
        Role::User
    }
}

fn display_name(identity: &GoogleIdentity) -> String {
    identity
        .name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| identity.email.split('@').next().unwrap_or_default().to_string())
}

/// Creates the user on first login, refreshes profile and tokens on re-login
pub async fn upsert_user(
    db: &MongoDB,
    config: &AppConfig,
    identity: &GoogleIdentity,
    tokens: &GoogleTokenResponse,
) -> Result<User, AppError> {
    let collection = db.collection::<User>(USERS);
    let name = display_name(identity);
    let role = role_for_email(config, &identity.email);
    let expires_at = tokens.expires_in.map(|secs| Utc::now().timestamp() + secs);

    let mut set = doc! {
        "name": &name,
        "email": &identity.email,
        "role": role.as_str(),
        "access_token": &tokens.access_token,
        "token_expires_at": expires_at,
        "last_login": BsonDateTime::now(),
        "updated_at": BsonDateTime::now(),
    };
    // Google omits refresh_token on re-consent; never erase the stored one
    if let Some(refresh_token) = &tokens.refresh_token {
        set.insert("refresh_token", refresh_token);
    }

    let updated = collection
        .find_one_and_update(doc! { "user_id": &identity.sub }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?;

    if let Some(user) = updated {
        log::info!("✅ Existing user logged in: {}", user.user_id);
        return Ok(user);
    }

    let new_user = User {
        id: None,
        user_id: identity.sub.clone(),
        name,
        email: identity.email.clone(),
        role,
        access_token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        token_expires_at: expires_at,
        folder_id: None,
        created_at: Some(BsonDateTime::now()),
        updated_at: Some(BsonDateTime::now()),
        last_login: Some(BsonDateTime::now()),
    };

    collection.insert_one(&new_user).await?;

    log::info!("✅ Created user {} ({})", new_user.user_id, new_user.email);

    Ok(new_user)
}

/// Full Google login: code exchange, identity, upsert, service tokens
pub async fn login_with_google_code(
    db: &MongoDB,
    config: &AppConfig,
    code: &str,
) -> Result<AuthResponse, AppError> {
    let tokens = exchange_code(config, code).await?;

    let identity = match &tokens.id_token {
        Some(id_token) => decode_id_token(id_token)?,
        None => fetch_userinfo(&tokens.access_token).await?,
    };

    let user = upsert_user(db, config, &identity, &tokens).await?;

    auth_response(config, &user)
}

pub async fn refresh_session(
    db: &MongoDB,
    config: &AppConfig,
    request: &RefreshTokenRequest,
) -> Result<AuthResponse, AppError> {
    let claims = verify_token(config, &request.refresh_token, TokenKind::Refresh)?;
    let user = find_user(db, &claims.sub).await?;

    auth_response(config, &user)
}

pub async fn find_user(db: &MongoDB, user_id: &str) -> Result<User, AppError> {
    db.collection::<User>(USERS)
        .find_one(doc! { "user_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))
}

pub async fn current_user(db: &MongoDB, user_id: &str) -> Result<UserInfo, AppError> {
    let user = find_user(db, user_id).await?;
    Ok(UserInfo::from(&user))
}

pub async fn list_users(db: &MongoDB) -> Result<Vec<UserInfo>, AppError> {
    let mut cursor = db
        .collection::<User>(USERS)
        .find(Document::new())
        .sort(doc! { "created_at": -1 })
        .await?;

    let mut users = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(UserInfo::from(&user)),
            Err(e) => log::warn!("⚠️ Skipping unreadable user document: {}", e),
        }
    }

    Ok(users)
}

/// Returns a Google access token valid for at least another minute,
/// refreshing and persisting it when needed.
pub async fn fresh_access_token(db: &MongoDB, config: &AppConfig, user: &User) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    if !user.access_token_expiring(now, TOKEN_REFRESH_MARGIN_SECS) {
        return Ok(user.access_token.clone());
    }

    let refresh_token = match &user.refresh_token {
        Some(token) => token,
        None => {
            log::warn!("⚠️ Access token of {} expired and no refresh token is stored", user.user_id);
            return Err(AppError::IdentityError(
                "Google session expired, sign in again".to_string(),
            ));
        }
    };

    log::info!("🔄 Refreshing Google access token for {}", user.user_id);

    let (client_id, client_secret) = config.google_credentials()?;
    let tokens = request_google_tokens(&[
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ])
    .await?;

    let expires_at = tokens.expires_in.map(|secs| now + secs);

    db.collection::<User>(USERS)
        .update_one(
            doc! { "user_id": &user.user_id },
            doc! { "$set": {
                "access_token": &tokens.access_token,
                "token_expires_at": expires_at,
                "updated_at": BsonDateTime::now(),
            }},
        )
        .await?;

    Ok(tokens.access_token)
}
