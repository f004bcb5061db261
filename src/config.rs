//! Service configuration loaded from environment variables.
//!
//! Only `DATABASE_URL` is mandatory; everything else falls back to a
//! development default.

use crate::utils::error::AppError;

pub const DEFAULT_LETTER_MIME_TYPE: &str = "application/vnd.google-apps.document";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Env: `HOST`, default `0.0.0.0`
    pub host: String,
    /// Env: `PORT`, default `3002`
    pub port: u16,
    /// Env: `DATABASE_URL` (required). The last path segment names the database.
    pub database_url: String,

    /// Env: `JWT_SECRET`
    pub jwt_secret: String,
    /// Env: `JWT_ISSUER`, default `letters-service`
    pub jwt_issuer: String,
    /// Env: `JWT_AUDIENCE`, default `letters-api`
    pub jwt_audience: String,

    /// Env: `GOOGLE_CLIENT_ID`
    pub google_client_id: Option<String>,
    /// Env: `GOOGLE_CLIENT_SECRET`
    pub google_client_secret: Option<String>,
    /// Env: `GOOGLE_REDIRECT_URI`
    pub google_redirect_uri: String,

    /// Where the OAuth callback redirects the browser after login.
    /// Env: `FRONTEND_URL`
    pub frontend_url: String,

    /// Name of the Drive folder that holds every letter of a user.
    /// Env: `LETTERS_FOLDER_NAME`, default `Letters`
    pub letters_folder_name: String,

    /// Drive MIME type letters are stored as.
    /// Env: `LETTER_MIME_TYPE`, default Google Docs
    pub letter_mime_type: String,

    /// Emails that receive the `admin` role at login.
    /// Env: `ADMIN_EMAILS` (comma separated)
    pub admin_emails: Vec<String>,

    /// Env: `CORS_ORIGINS` (comma separated)
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_string()))?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("PORT is not a valid port: {}", raw)))?,
            None => 3002,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("⚠️  JWT_SECRET not set, using an insecure development secret");
            "default-secret-change-me".to_string()
        });

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url,
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "letters-service".to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "letters-api".to_string()),
            google_client_id: get("GOOGLE_CLIENT_ID"),
            google_client_secret: get("GOOGLE_CLIENT_SECRET"),
            google_redirect_uri: get("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|| "http://localhost:3002/api/v1/auth/callback".to_string()),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            letters_folder_name: get("LETTERS_FOLDER_NAME").unwrap_or_else(|| "Letters".to_string()),
            letter_mime_type: get("LETTER_MIME_TYPE")
                .unwrap_or_else(|| DEFAULT_LETTER_MIME_TYPE.to_string()),
            admin_emails: split_list(get("ADMIN_EMAILS").as_deref())
                .into_iter()
                .map(|email| email.to_lowercase())
                .collect(),
            cors_origins: match get("CORS_ORIGINS") {
                Some(raw) => split_list(Some(&raw)),
                None => vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }

    pub fn google_credentials(&self) -> Result<(&str, &str), AppError> {
        let client_id = self
            .google_client_id
            .as_deref()
            .ok_or_else(|| AppError::Config("GOOGLE_CLIENT_ID not configured".to_string()))?;
        let client_secret = self
            .google_client_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("GOOGLE_CLIENT_SECRET not configured".to_string()))?;
        Ok((client_id, client_secret))
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("mongodb://localhost:27017/letters_test".to_string()),
        "JWT_SECRET" => Some("test-secret".to_string()),
        "GOOGLE_CLIENT_ID" => Some("client-id.apps.googleusercontent.com".to_string()),
        "GOOGLE_CLIENT_SECRET" => Some("client-secret".to_string()),
        "ADMIN_EMAILS" => Some("Boss@Example.com".to_string()),
        _ => None,
    })
    .expect("test config")
}
