use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usuário autenticado pelo Google (armazenado no MongoDB)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Google `sub` - PRIMARY IDENTIFIER
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,

    /// OAuth access token with Drive scope
    pub access_token: String,
    /// Only sent by Google on the first consent
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    pub token_expires_at: Option<i64>,

    /// Cached id of the user's Letters folder in Drive
    pub folder_id: Option<String>,

    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
    pub last_login: Option<BsonDateTime>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the access token expires within `margin_secs`. Without a stored
    /// expiry the token is assumed valid.
    pub fn access_token_expiring(&self, now: i64, margin_secs: i64) -> bool {
        match self.token_expires_at {
            Some(expires_at) => expires_at - margin_secs <= now,
            None => false,
        }
    }
}

/// Public projection; OAuth tokens never leave the service
#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub has_letters_folder: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        UserInfo {
            id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            has_letters_folder: user.folder_id.is_some(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user(user_id: &str, email: &str) -> User {
    User {
        id: None,
        user_id: user_id.to_string(),
        name: "Test User".to_string(),
        email: email.to_string(),
        role: Role::User,
        access_token: "ya29.token".to_string(),
        refresh_token: Some("1//refresh".to_string()),
        token_expires_at: None,
        folder_id: None,
        created_at: None,
        updated_at: None,
        last_login: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn missing_role_defaults_to_user() {
        let doc = mongodb::bson::doc! {
            "user_id": "g-1",
            "name": "Ana",
            "email": "ana@mail.com",
            "access_token": "t",
            "refresh_token": null,
            "token_expires_at": null,
            "folder_id": null,
        };
        let user: User = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.id.is_none());
    }

    #[test]
    fn token_expiry_window() {
        let mut user = sample_user("g-1", "ana@mail.com");
        assert!(!user.access_token_expiring(1_000, 60));

        user.token_expires_at = Some(1_100);
        assert!(!user.access_token_expiring(1_000, 60));
        assert!(user.access_token_expiring(1_050, 60));
        assert!(user.access_token_expiring(2_000, 60));
    }

    #[test]
    fn user_info_hides_tokens() {
        let mut user = sample_user("g-1", "ana@mail.com");
        user.folder_id = Some("folder".to_string());
        let info = UserInfo::from(&user);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["id"], "g-1");
        assert_eq!(json["has_letters_folder"], true);
        assert!(json.get("access_token").is_none());
        assert!(json.get("refresh_token").is_none());
    }
}
