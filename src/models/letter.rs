use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::User;

/// Carta do usuário (metadados no MongoDB, corpo também no Google Drive)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Owner id. Not checked against the users collection.
    pub user_id: String,

    pub title: String,

    pub content: String,

    /// Drive file id; absent when the upload never happened
    pub file_id: Option<String>,

    /// Emails with write access
    #[serde(default)]
    pub collaborators: Vec<String>,

    /// Unix timestamp (seconds)
    pub created_at: i64,

    pub updated_at: i64,
}

impl Letter {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_owner(&self, user: &User) -> bool {
        self.user_id == user.user_id
    }

    pub fn is_collaborator(&self, email: &str) -> bool {
        self.collaborators
            .iter()
            .any(|collaborator| collaborator.eq_ignore_ascii_case(email.trim()))
    }

    pub fn can_read(&self, user: &User) -> bool {
        self.can_edit(user)
    }

    pub fn can_edit(&self, user: &User) -> bool {
        self.is_owner(user) || self.is_collaborator(&user.email) || user.is_admin()
    }

    /// Delete and sharing are reserved to the owner (and admins)
    pub fn can_manage(&self, user: &User) -> bool {
        self.is_owner(user) || user.is_admin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LetterAccess {
    Owned,
    Shared,
}

/// Request para salvar carta
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateLetterRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Request para editar carta
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateLetterRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddCollaboratorRequest {
    pub email: String,
}

/// Response de carta
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LetterResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub file_id: Option<String>,
    pub collaborators: Vec<String>,
    pub access: LetterAccess,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LetterResponse {
    pub fn for_user(letter: Letter, user: &User) -> Self {
        let access = if letter.is_owner(user) {
            LetterAccess::Owned
        } else {
            LetterAccess::Shared
        };

        LetterResponse {
            id: letter.id_hex(),
            user_id: letter.user_id,
            title: letter.title,
            content: letter.content,
            file_id: letter.file_id,
            collaborators: letter.collaborators,
            access,
            created_at: letter.created_at,
            updated_at: letter.updated_at,
        }
    }
}

/// Item compacto para listagem (sem o corpo da carta)
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LetterListItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub file_id: Option<String>,
    pub collaborators_count: usize,
    pub access: LetterAccess,
    pub updated_at: i64,
}

impl LetterListItem {
    pub fn for_user(letter: Letter, user: &User) -> Self {
        let access = if letter.is_owner(user) {
            LetterAccess::Owned
        } else {
            LetterAccess::Shared
        };

        LetterListItem {
            id: letter.id_hex(),
            user_id: letter.user_id,
            title: letter.title,
            file_id: letter.file_id,
            collaborators_count: letter.collaborators.len(),
            access,
            updated_at: letter.updated_at,
        }
    }
}

/// Loose syntactic check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.contains(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{sample_user, Role};

    fn letter_owned_by(user_id: &str) -> Letter {
        Letter {
            id: Some(ObjectId::new()),
            user_id: user_id.to_string(),
            title: "Dear friend".to_string(),
            content: "Hello".to_string(),
            file_id: Some("drive-file".to_string()),
            collaborators: vec!["Bob@Mail.com".to_string()],
            created_at: 10,
            updated_at: 20,
        }
    }

    #[test]
    fn owner_collaborator_and_stranger_access() {
        let letter = letter_owned_by("owner");
        let owner = sample_user("owner", "owner@mail.com");
        let bob = sample_user("bob", "bob@mail.com");
        let eve = sample_user("eve", "eve@mail.com");

        assert!(letter.can_edit(&owner) && letter.can_manage(&owner));
        assert!(letter.can_read(&bob) && letter.can_edit(&bob));
        assert!(!letter.can_manage(&bob));
        assert!(!letter.can_read(&eve));
    }

    #[test]
    fn admin_can_manage_any_letter() {
        let letter = letter_owned_by("owner");
        let mut admin = sample_user("root", "root@mail.com");
        admin.role = Role::Admin;

        assert!(letter.can_read(&admin));
        assert!(letter.can_manage(&admin));
    }

    #[test]
    fn response_marks_shared_letters() {
        let bob = sample_user("bob", "bob@mail.com");
        let response = LetterResponse::for_user(letter_owned_by("owner"), &bob);
        assert_eq!(response.access, LetterAccess::Shared);
        assert_eq!(response.id.len(), 24);

        let owner = sample_user("owner", "owner@mail.com");
        let item = LetterListItem::for_user(letter_owned_by("owner"), &owner);
        assert_eq!(item.access, LetterAccess::Owned);
        assert_eq!(item.collaborators_count, 1);
    }

    #[test]
    fn letter_without_collaborators_field_deserializes() {
        let doc = mongodb::bson::doc! {
            "user_id": "ghost",
            "title": "t",
            "content": "c",
            "file_id": null,
            "created_at": 1_i64,
            "updated_at": 1_i64,
        };
        let letter: Letter = mongodb::bson::from_document(doc).unwrap();
        assert!(letter.collaborators.is_empty());
        assert_eq!(letter.id_hex(), "");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("bob@mail.com"));
        assert!(is_valid_email("  bob.smith+letters@sub.mail.org "));
        assert!(!is_valid_email("bob"));
        assert!(!is_valid_email("@mail.com"));
        assert!(!is_valid_email("bob@mail"));
        assert!(!is_valid_email("bob@@mail.com"));
        assert!(!is_valid_email("bob smith@mail.com"));
        assert!(!is_valid_email("bob@mail.com."));
    }
}
