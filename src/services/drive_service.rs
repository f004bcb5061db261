// ==================== GOOGLE DRIVE v3 ====================
// Armazenamento dos arquivos das cartas. Todas as chamadas usam o access
// token OAuth do dono da carta.

use crate::utils::error::AppError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
pub struct DriveFile {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DrivePermission {
    id: String,
    #[serde(default, rename = "emailAddress")]
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DrivePermissionList {
    #[serde(default)]
    permissions: Vec<DrivePermission>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<&'a str>>,
}

#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClient {
    pub fn new() -> Self {
        Self::with_base_urls(DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    pub fn with_base_urls(api_base: &str, upload_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    /// Looks up a non-trashed folder by exact name
    pub async fn find_folder(&self, access_token: &str, name: &str) -> Result<Option<String>, AppError> {
        let query = folder_query(name);

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id)"), ("spaces", "drive")])
            .send()
            .await
            .map_err(storage_error("search folder"))?;

        let list: DriveFileList = parse_json(response, "search folder").await?;

        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    pub async fn create_folder(&self, access_token: &str, name: &str) -> Result<String, AppError> {
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: None,
        };

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(storage_error("create folder"))?;

        let file: DriveFile = parse_json(response, "create folder").await?;
        log::info!("📁 Created Drive folder '{}' ({})", name, file.id);

        Ok(file.id)
    }

    /// Uploads metadata and body in one multipart/related request
    pub async fn create_file(
        &self,
        access_token: &str,
        folder_id: &str,
        title: &str,
        content: &str,
        mime_type: &str,
    ) -> Result<String, AppError> {
        let metadata = FileMetadata {
            name: title,
            mime_type: Some(mime_type),
            parents: Some(vec![folder_id]),
        };
        let (content_type, body) = multipart_related_body(&metadata, content)?;

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(storage_error("upload file"))?;

        let file: DriveFile = parse_json(response, "upload file").await?;
        Ok(file.id)
    }

    /// Replaces name and body of an existing file
    pub async fn update_file(
        &self,
        access_token: &str,
        file_id: &str,
        title: &str,
        content: &str,
    ) -> Result<(), AppError> {
        let metadata = FileMetadata {
            name: title,
            mime_type: None,
            parents: None,
        };
        let (content_type, body) = multipart_related_body(&metadata, content)?;

        let response = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(storage_error("update file"))?;

        let _: DriveFile = parse_json(response, "update file").await?;
        Ok(())
    }

    /// A file that is already gone counts as deleted
    pub async fn delete_file(&self, access_token: &str, file_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(storage_error("delete file"))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                log::warn!("⚠️ Drive file {} already gone", file_id);
                Ok(())
            }
            status => Err(AppError::StorageError(format!(
                "delete file failed with {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    /// Grants `writer` on the file to the given email, returns the permission id
    pub async fn share_file(&self, access_token: &str, file_id: &str, email: &str) -> Result<String, AppError> {
        let permission = serde_json::json!({
            "type": "user",
            "role": "writer",
            "emailAddress": email,
        });

        let response = self
            .http
            .post(format!("{}/files/{}/permissions", self.api_base, file_id))
            .bearer_auth(access_token)
            .query(&[("sendNotificationEmail", "true"), ("fields", "id")])
            .json(&permission)
            .send()
            .await
            .map_err(storage_error("share file"))?;

        let created: DrivePermission = parse_json(response, "share file").await?;
        Ok(created.id)
    }

    /// Removes the user permission for `email`; returns false when none existed
    pub async fn revoke_share(&self, access_token: &str, file_id: &str, email: &str) -> Result<bool, AppError> {
        let response = self
            .http
            .get(format!("{}/files/{}/permissions", self.api_base, file_id))
            .bearer_auth(access_token)
            .query(&[("fields", "permissions(id,emailAddress)")])
            .send()
            .await
            .map_err(storage_error("list permissions"))?;

        let list: DrivePermissionList = parse_json(response, "list permissions").await?;

        let permission_id = match find_permission_id(&list.permissions, email) {
            Some(id) => id,
            None => return Ok(false),
        };

        let response = self
            .http
            .delete(format!(
                "{}/files/{}/permissions/{}",
                self.api_base, file_id, permission_id
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(storage_error("revoke permission"))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(AppError::StorageError(format!(
                "revoke permission failed with {}",
                response.status()
            )));
        }

        Ok(true)
    }
}

fn storage_error(action: &'static str) -> impl Fn(reqwest::Error) -> AppError {
    move |e| AppError::StorageError(format!("{} request failed: {}", action, e))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    action: &str,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::StorageError(format!(
            "{} failed with {}: {}",
            action, status, body
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AppError::StorageError(format!("{}: unexpected response: {}", action, e)))
}

/// Drive search expression for a folder; quotes and backslashes are escaped.
fn folder_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, FOLDER_MIME_TYPE
    )
}

fn find_permission_id(permissions: &[DrivePermission], email: &str) -> Option<String> {
    permissions
        .iter()
        .find(|p| {
            p.email_address
                .as_deref()
                .map(|address| address.eq_ignore_ascii_case(email))
                .unwrap_or(false)
        })
        .map(|p| p.id.clone())
}

/// Builds a `multipart/related` body: JSON metadata part, then the text part.
/// Returns the Content-Type header (with boundary) and the body.
fn multipart_related_body(metadata: &FileMetadata<'_>, content: &str) -> Result<(String, String), AppError> {
    let boundary = format!("letters-{}", Uuid::new_v4().simple());
    let metadata_json = serde_json::to_string(metadata)
        .map_err(|e| AppError::StorageError(format!("Failed to encode metadata: {}", e)))?;

    let body = format!(
        "--{b}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {meta}\r\n\
         --{b}\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\r\n\
         {content}\r\n\
         --{b}--\r\n",
        b = boundary,
        meta = metadata_json,
        content = content,
    );

    Ok((format!("multipart/related; boundary={}", boundary), body))
}
