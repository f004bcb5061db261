// ==================== LETTERS ====================
// Orquestra MongoDB (metadados) e Google Drive (arquivo) para cada carta.
// Nada aqui é transacional: falhas são logadas e mapeadas para HTTP.

use crate::{
    config::AppConfig,
    database::{MongoDB, LETTERS, USERS},
    models::{
        is_valid_email, CreateLetterRequest, Letter, LetterListItem, LetterResponse,
        UpdateLetterRequest, User,
    },
    services::{auth_service, drive_service::DriveClient},
    utils::error::AppError,
};
use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};

#[derive(Clone)]
pub struct LetterService {
    db: MongoDB,
    drive: DriveClient,
    config: AppConfig,
}

impl LetterService {
    pub fn new(db: MongoDB, drive: DriveClient, config: AppConfig) -> Self {
        Self { db, drive, config }
    }

    fn letters(&self) -> mongodb::Collection<Letter> {
        self.db.collection::<Letter>(LETTERS)
    }

    /// Cached folder id, else find-or-create the folder in Drive and cache it
    pub async fn ensure_letters_folder(&self, user: &User, access_token: &str) -> Result<String, AppError> {
        if let Some(folder_id) = &user.folder_id {
            return Ok(folder_id.clone());
        }

        let name = &self.config.letters_folder_name;
        let folder_id = match self.drive.find_folder(access_token, name).await? {
            Some(id) => {
                log::info!("📁 Found existing '{}' folder for {}", name, user.user_id);
                id
            }
            None => self.drive.create_folder(access_token, name).await?,
        };

        // Only the first writer caches its folder; a concurrent save keeps the stored one
        let result = self
            .db
            .collection::<User>(USERS)
            .update_one(
                doc! { "user_id": &user.user_id, "folder_id": null },
                doc! { "$set": { "folder_id": &folder_id, "updated_at": BsonDateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            let stored = auth_service::find_user(&self.db, &user.user_id).await?;
            if let Some(existing) = stored.folder_id {
                if existing != folder_id {
                    log::warn!(
                        "⚠️ Folder {} lost the race for {}, using {}",
                        folder_id,
                        user.user_id,
                        existing
                    );
                }
                return Ok(existing);
            }
        }

        Ok(folder_id)
    }

    pub async fn save_letter(&self, user: &User, request: CreateLetterRequest) -> Result<LetterResponse, AppError> {
        let title = normalize_title(&request.title)?;

        let access_token = auth_service::fresh_access_token(&self.db, &self.config, user).await?;
        let folder_id = self.ensure_letters_folder(user, &access_token).await?;

        let file_id = self
            .drive
            .create_file(
                &access_token,
                &folder_id,
                &title,
                &request.content,
                &self.config.letter_mime_type,
            )
            .await?;

        let now = chrono::Utc::now().timestamp();
        let mut letter = Letter {
            id: None,
            user_id: user.user_id.clone(),
            title,
            content: request.content,
            file_id: Some(file_id),
            collaborators: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let result = self.letters().insert_one(&letter).await?;
        letter.id = result.inserted_id.as_object_id();

        log::info!("✅ Letter {} saved for {}", letter.id_hex(), user.user_id);

        Ok(LetterResponse::for_user(letter, user))
    }

    /// Owned letters plus letters shared with the caller, newest first
    pub async fn list_letters(&self, user: &User) -> Result<Vec<LetterListItem>, AppError> {
        let filter = doc! {
            "$or": [
                { "user_id": &user.user_id },
                { "collaborators": user.email.to_lowercase() },
            ]
        };

        let letters = self.collect(filter).await?;
        Ok(letters
            .into_iter()
            .map(|letter| LetterListItem::for_user(letter, user))
            .collect())
    }

    pub async fn list_all_letters(&self, admin: &User) -> Result<Vec<LetterListItem>, AppError> {
        if !admin.is_admin() {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }

        let letters = self.collect(Document::new()).await?;
        Ok(letters
            .into_iter()
            .map(|letter| LetterListItem::for_user(letter, admin))
            .collect())
    }

    async fn collect(&self, filter: Document) -> Result<Vec<Letter>, AppError> {
        let mut cursor = self
            .letters()
            .find(filter)
            .sort(doc! { "updated_at": -1 })
            .await?;

        let mut letters = Vec::new();
        while let Some(result) = cursor.next().await {
            match result {
                Ok(letter) => letters.push(letter),
                Err(e) => log::error!("❌ Skipping unreadable letter document: {}", e),
            }
        }

        Ok(letters)
    }

    async fn find_letter(&self, letter_id: &str) -> Result<Letter, AppError> {
        let object_id = parse_letter_id(letter_id)?;

        self.letters()
            .find_one(doc! { "_id": object_id })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Letter {}", letter_id)))
    }

    /// Loads a letter the caller may read, or fails with 404 / 403
    pub async fn readable_letter(&self, user: &User, letter_id: &str) -> Result<Letter, AppError> {
        let letter = self.find_letter(letter_id).await?;
        if !letter.can_read(user) {
            return Err(AppError::Forbidden("You do not have access to this letter".to_string()));
        }
        Ok(letter)
    }

    pub async fn get_letter(&self, user: &User, letter_id: &str) -> Result<LetterResponse, AppError> {
        let letter = self.readable_letter(user, letter_id).await?;
        Ok(LetterResponse::for_user(letter, user))
    }

    /// The owner's Drive credentials are used even when a collaborator edits
    async fn owner_access_token(&self, letter: &Letter) -> Result<(User, String), AppError> {
        let owner = auth_service::find_user(&self.db, &letter.user_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::StorageError(format!(
                    "Owner {} of letter {} no longer exists",
                    letter.user_id,
                    letter.id_hex()
                )),
                other => other,
            })?;
        let token = auth_service::fresh_access_token(&self.db, &self.config, &owner).await?;
        Ok((owner, token))
    }

    pub async fn update_letter(
        &self,
        user: &User,
        letter_id: &str,
        request: UpdateLetterRequest,
    ) -> Result<LetterResponse, AppError> {
        let mut letter = self.find_letter(letter_id).await?;
        if !letter.can_edit(user) {
            return Err(AppError::Forbidden("You cannot edit this letter".to_string()));
        }

        if request.title.is_none() && request.content.is_none() {
            return Err(AppError::InvalidRequest("Nothing to update".to_string()));
        }

        if let Some(title) = &request.title {
            letter.title = normalize_title(title)?;
        }
        if let Some(content) = request.content {
            letter.content = content;
        }

        let (owner, access_token) = self.owner_access_token(&letter).await?;
        match &letter.file_id {
            Some(file_id) => {
                self.drive
                    .update_file(&access_token, file_id, &letter.title, &letter.content)
                    .await?;
            }
            None => {
                let folder_id = self.ensure_letters_folder(&owner, &access_token).await?;
                let file_id = self
                    .drive
                    .create_file(
                        &access_token,
                        &folder_id,
                        &letter.title,
                        &letter.content,
                        &self.config.letter_mime_type,
                    )
                    .await?;
                letter.file_id = Some(file_id);
            }
        }

        letter.updated_at = chrono::Utc::now().timestamp();

        self.letters()
            .update_one(
                doc! { "_id": parse_letter_id(letter_id)? },
                doc! { "$set": {
                    "title": &letter.title,
                    "content": &letter.content,
                    "file_id": letter.file_id.clone(),
                    "updated_at": letter.updated_at,
                }},
            )
            .await?;

        Ok(LetterResponse::for_user(letter, user))
    }

    /// Best-effort dual delete: Drive first (failure only logged), then metadata
    pub async fn delete_letter(&self, user: &User, letter_id: &str) -> Result<(), AppError> {
        let letter = self.find_letter(letter_id).await?;
        if !letter.can_manage(user) {
            return Err(AppError::Forbidden("Only the owner can delete this letter".to_string()));
        }

        if let Some(file_id) = &letter.file_id {
            let drive_result = match self.owner_access_token(&letter).await {
                Ok((_, token)) => self.drive.delete_file(&token, file_id).await,
                Err(e) => Err(e),
            };
            if let Err(e) = drive_result {
                log::warn!("⚠️ Could not delete Drive file {} of letter {}: {}", file_id, letter_id, e);
            }
        }

        let result = self
            .letters()
            .delete_one(doc! { "_id": parse_letter_id(letter_id)? })
            .await?;

        if result.deleted_count == 0 {
            return Err(AppError::NotFound(format!("Letter {}", letter_id)));
        }

        log::info!("🗑️ Letter {} deleted by {}", letter_id, user.user_id);
        Ok(())
    }

    pub async fn add_collaborator(
        &self,
        user: &User,
        letter_id: &str,
        email: &str,
    ) -> Result<LetterResponse, AppError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::InvalidRequest(format!("Invalid email: {}", email)));
        }

        let letter = self.find_letter(letter_id).await?;
        if !letter.can_manage(user) {
            return Err(AppError::Forbidden("Only the owner can share this letter".to_string()));
        }
        if letter.user_id == user.user_id && user.email.eq_ignore_ascii_case(&email) {
            return Err(AppError::InvalidRequest("You already own this letter".to_string()));
        }

        let file_id = letter
            .file_id
            .as_deref()
            .ok_or_else(|| AppError::StorageError("Letter has no Drive file to share".to_string()))?;

        let (_, access_token) = self.owner_access_token(&letter).await?;
        self.drive.share_file(&access_token, file_id, &email).await?;

        let updated = self
            .letters()
            .find_one_and_update(
                doc! { "_id": parse_letter_id(letter_id)? },
                doc! {
                    "$addToSet": { "collaborators": &email },
                    "$set": { "updated_at": chrono::Utc::now().timestamp() },
                },
            )
            .return_document(mongodb::options::ReturnDocument::After)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Letter {}", letter_id)))?;

        log::info!("🤝 {} can now edit letter {}", email, letter_id);

        Ok(LetterResponse::for_user(updated, user))
    }

    pub async fn remove_collaborator(
        &self,
        user: &User,
        letter_id: &str,
        email: &str,
    ) -> Result<LetterResponse, AppError> {
        let email = email.trim().to_lowercase();

        let letter = self.find_letter(letter_id).await?;
        if !letter.can_manage(user) {
            return Err(AppError::Forbidden("Only the owner can unshare this letter".to_string()));
        }
        if !letter.is_collaborator(&email) {
            return Err(AppError::NotFound(format!("Collaborator {}", email)));
        }

        if let Some(file_id) = &letter.file_id {
            let revoke = match self.owner_access_token(&letter).await {
                Ok((_, token)) => self.drive.revoke_share(&token, file_id, &email).await,
                Err(e) => Err(e),
            };
            match revoke {
                Ok(true) => log::info!("🚪 Drive permission of {} revoked on letter {}", email, letter_id),
                Ok(false) => log::info!("ℹ️ {} had no Drive permission on letter {}", email, letter_id),
                Err(e) => log::warn!("⚠️ Could not revoke Drive permission of {}: {}", email, e),
            }
        }

        // Stored emails may differ in case from the request
        let stored: Vec<String> = letter
            .collaborators
            .iter()
            .filter(|c| c.eq_ignore_ascii_case(&email))
            .cloned()
            .collect();

        let updated = self
            .letters()
            .find_one_and_update(
                doc! { "_id": parse_letter_id(letter_id)? },
                doc! {
                    "$pull": { "collaborators": { "$in": stored } },
                    "$set": { "updated_at": chrono::Utc::now().timestamp() },
                },
            )
            .return_document(mongodb::options::ReturnDocument::After)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Letter {}", letter_id)))?;

        Ok(LetterResponse::for_user(updated, user))
    }
}

pub fn parse_letter_id(letter_id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(letter_id).map_err(|_| AppError::InvalidRequest("Invalid letter ID".to_string()))
}

fn normalize_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidRequest("Title is required".to_string()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_ids_must_be_object_ids() {
        assert!(parse_letter_id("65f1c2a9e4b0a1b2c3d4e5f6").is_ok());
        assert!(matches!(parse_letter_id("nope"), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn relay_keys_use_lowercase_hex() {
        let upper = parse_letter_id("65F1C2A9E4B0A1B2C3D4E5F6").unwrap();
        let lower = parse_letter_id("65f1c2a9e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_hex(), "65f1c2a9e4b0a1b2c3d4e5f6");
    }

    #[tokio::test]
    async fn malformed_collaborator_email_is_rejected_before_any_lookup() {
        let service = LetterService::new(
            MongoDB::unconnected().await,
            DriveClient::with_base_urls("http://127.0.0.1:1", "http://127.0.0.1:1"),
            crate::config::test_config(),
        );
        let owner = crate::models::sample_user("g-owner", "owner@mail.com");

        let err = service
            .add_collaborator(&owner, "65f1c2a9e4b0a1b2c3d4e5f6", "not-an-email")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn titles_are_trimmed_and_required() {
        assert_eq!(normalize_title("  Dear Ana ").unwrap(), "Dear Ana");
        assert!(normalize_title("   ").is_err());
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn lists_owned_and_shared_letters() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/letters_test".to_string());
        let db = MongoDB::new(&uri).await.expect("mongodb");
        let service = LetterService::new(db.clone(), DriveClient::new(), crate::config::test_config());

        let owner = crate::models::sample_user(&ObjectId::new().to_hex(), "owner@mail.com");
        let bob = crate::models::sample_user(&ObjectId::new().to_hex(), &format!("{}@mail.com", ObjectId::new()));

        let letter = Letter {
            id: None,
            user_id: owner.user_id.clone(),
            title: "Shared".to_string(),
            content: "Hi".to_string(),
            file_id: None,
            collaborators: vec![bob.email.clone()],
            created_at: 1,
            updated_at: 1,
        };
        db.collection::<Letter>(LETTERS).insert_one(&letter).await.unwrap();

        let owned = service.list_letters(&owner).await.unwrap();
        assert!(owned.iter().any(|l| l.title == "Shared"));

        let shared = service.list_letters(&bob).await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].access, crate::models::LetterAccess::Shared);
    }

    mod with_mongo {
        use super::super::*;
        use crate::models::sample_user;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn test_db() -> MongoDB {
            dotenv::dotenv().ok();
            let uri = std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mongodb://localhost:27017/letters_test".to_string());
            MongoDB::new(&uri).await.expect("mongodb")
        }

        async fn stored_user(db: &MongoDB, folder_id: Option<&str>) -> User {
            let mut user = sample_user(&ObjectId::new().to_hex(), &format!("{}@mail.com", ObjectId::new()));
            user.folder_id = folder_id.map(str::to_string);
            db.collection::<User>(USERS).insert_one(&user).await.unwrap();
            user
        }

        async fn stored_letter(db: &MongoDB, owner: &User, file_id: Option<&str>) -> String {
            let letter = Letter {
                id: None,
                user_id: owner.user_id.clone(),
                title: "Draft".to_string(),
                content: "Old body".to_string(),
                file_id: file_id.map(str::to_string),
                collaborators: Vec::new(),
                created_at: 1,
                updated_at: 1,
            };
            let result = db.collection::<Letter>(LETTERS).insert_one(&letter).await.unwrap();
            result.inserted_id.as_object_id().unwrap().to_hex()
        }

        fn service(db: &MongoDB, server: &MockServer) -> LetterService {
            LetterService::new(
                db.clone(),
                DriveClient::with_base_urls(
                    &format!("{}/drive/v3", server.uri()),
                    &format!("{}/upload/drive/v3", server.uri()),
                ),
                crate::config::test_config(),
            )
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn delete_survives_drive_failure() {
            let db = test_db().await;
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .and(path("/drive/v3/files/file-1"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount(&server)
                .await;

            let owner = stored_user(&db, Some("folder-1")).await;
            let letter_id = stored_letter(&db, &owner, Some("file-1")).await;

            service(&db, &server).delete_letter(&owner, &letter_id).await.unwrap();

            let gone = db
                .collection::<Letter>(LETTERS)
                .find_one(doc! { "_id": parse_letter_id(&letter_id).unwrap() })
                .await
                .unwrap();
            assert!(gone.is_none());
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn update_creates_missing_drive_file_in_owner_folder() {
            let db = test_db().await;
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/upload/drive/v3/files"))
                .and(wiremock::matchers::body_string_contains(r#""parents":["folder-1"]"#))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "new-file" })))
                .expect(1)
                .mount(&server)
                .await;

            let owner = stored_user(&db, Some("folder-1")).await;
            let letter_id = stored_letter(&db, &owner, None).await;

            let updated = service(&db, &server)
                .update_letter(
                    &owner,
                    &letter_id,
                    UpdateLetterRequest {
                        title: None,
                        content: Some("New body".to_string()),
                    },
                )
                .await
                .unwrap();

            assert_eq!(updated.file_id.as_deref(), Some("new-file"));
            assert_eq!(updated.content, "New body");
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn owner_cannot_add_their_own_email() {
            let db = test_db().await;
            let server = MockServer::start().await;

            let owner = stored_user(&db, Some("folder-1")).await;
            let letter_id = stored_letter(&db, &owner, Some("file-1")).await;

            let err = service(&db, &server)
                .add_collaborator(&owner, &letter_id, &owner.email.to_uppercase())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidRequest(_)));
        }

        #[tokio::test]
        #[ignore] // Requires MongoDB to be running
        async fn concurrent_folder_creation_keeps_the_stored_folder() {
            let db = test_db().await;
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/drive/v3/files"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/drive/v3/files"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "late-folder" })))
                .mount(&server)
                .await;

            // Another request already cached its folder; this copy of the user is stale
            let mut stale = stored_user(&db, Some("first-folder")).await;
            stale.folder_id = None;

            let folder_id = service(&db, &server)
                .ensure_letters_folder(&stale, "tok")
                .await
                .unwrap();
            assert_eq!(folder_id, "first-folder");
        }
    }
}
