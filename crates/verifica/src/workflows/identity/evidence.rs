use std::io::Cursor;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use google_drive3::{api::File, api::Scope, DriveHub};

use super::domain::{DocumentSide, SubjectId};

/// Durable storage for credential images tied to successful validations.
///
/// Called only after document validation succeeds — nothing is retained for
/// rejected attempts. A `None` return means the backend produced no public
/// reference; callers treat evidence as supplementary and never fail the
/// validation outcome over it.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn upload(
        &self,
        image: &str,
        subject_id: &SubjectId,
        side: DocumentSide,
    ) -> Result<Option<String>, EvidenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("image payload is not valid base64")]
    InvalidImage,
    #[error("evidence backend failed: {0}")]
    Backend(String),
}

/// Drop any `data:image/...;base64,` prefix, leaving the raw base64 body.
pub(crate) fn strip_data_uri(image: &str) -> &str {
    match image.split_once("base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => image,
    }
}

/// Google Drive-backed evidence store returning web view links as the durable
/// public references recorded on the audit row.
pub struct DriveEvidenceStore<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    hub: DriveHub<C>,
    folder_id: String,
}

impl<C> DriveEvidenceStore<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: DriveHub<C>, folder_id: impl Into<String>) -> Self {
        Self {
            hub,
            folder_id: folder_id.into(),
        }
    }
}

impl<C> std::fmt::Debug for DriveEvidenceStore<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveEvidenceStore")
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> EvidenceStore for DriveEvidenceStore<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    async fn upload(
        &self,
        image: &str,
        subject_id: &SubjectId,
        side: DocumentSide,
    ) -> Result<Option<String>, EvidenceError> {
        let bytes = BASE64
            .decode(strip_data_uri(image).trim())
            .map_err(|_| EvidenceError::InvalidImage)?;

        let metadata = File {
            name: Some(format!("{}-{}.jpg", subject_id.0, side.provider_label())),
            parents: Some(vec![self.folder_id.clone()]),
            ..File::default()
        };

        let result = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id,webViewLink")
            .supports_all_drives(true)
            .add_scope(Scope::File)
            .upload(Cursor::new(bytes), mime::IMAGE_JPEG)
            .await;

        let (_, file) = result.map_err(|err| EvidenceError::Backend(err.to_string()))?;
        Ok(file.web_view_link)
    }
}
