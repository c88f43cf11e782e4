use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::videos;
use crate::services::staging::StagedFile;
use crate::services::storage_key::{extension_for_media_type, generate_random_segment};
use crate::services::video_service::{IngestError, log_failure, validate_media_type};
use crate::services::video_store::VideoStore;

pub const ACCEPTED_THUMBNAIL_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Stores thumbnails as static assets. No transcoding; bytes are written
/// as uploaded.
pub struct ThumbnailService {
    store: Arc<dyn VideoStore>,
    config: AppConfig,
}

impl ThumbnailService {
    pub fn new(store: Arc<dyn VideoStore>, config: AppConfig) -> Self {
        Self { store, config }
    }

    pub async fn ensure_assets_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config.assets_root).await
    }

    pub fn assets_root(&self) -> &Path {
        &self.config.assets_root
    }

    pub async fn upload_thumbnail<'a>(
        &self,
        principal: Uuid,
        video_id: Uuid,
        content_type: Option<&str>,
        reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<videos::Model, IngestError> {
        let video = self
            .store
            .get_video(video_id)
            .await?
            .ok_or(IngestError::NotFound)?;
        if video.user_id != principal.to_string() {
            return Err(IngestError::Unauthorized);
        }
        let media_type = validate_media_type(content_type, ACCEPTED_THUMBNAIL_TYPES)
            .inspect_err(|e| log_failure(video_id, "thumbnail_validate", e))?;

        // Staged next to the destination so the final rename stays on one filesystem.
        let mut staged = StagedFile::create_in(&self.config.assets_root, ".thumbnail-", ".tmp")
            .inspect_err(|e| log_failure(video_id, "thumbnail_stage", e))?;
        staged
            .fill_from(reader, self.config.max_thumbnail_size)
            .await
            .inspect_err(|e| log_failure(video_id, "thumbnail_stage", e))?;

        let name = format!(
            "{}.{}",
            generate_random_segment(),
            extension_for_media_type(&media_type)
        );
        let dest = self.config.assets_root.join(&name);
        staged
            .persist(&dest)
            .await
            .inspect_err(|e| log_failure(video_id, "thumbnail_stage", e))?;

        let url = format!(
            "{}/assets/{}",
            self.config.public_base_url.trim_end_matches('/'),
            name
        );
        match self.store.set_thumbnail_url(video_id, url).await {
            Ok(video) => {
                info!(%video_id, asset = %name, "thumbnail stored");
                Ok(video)
            }
            Err(e) => {
                log_failure(video_id, "thumbnail_persist", &e);
                if let Err(cleanup) = tokio::fs::remove_file(&dest).await {
                    warn!(%video_id, asset = %name, "failed to remove orphaned thumbnail: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }
}
