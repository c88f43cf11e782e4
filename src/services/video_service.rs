use sea_orm::DbErr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::videos;
use crate::services::aspect::AspectClassifier;
use crate::services::media::{MediaProcessor, OptimizeError, ProbeError};
use crate::services::staging::{StagedFile, StagingError};
use crate::services::storage::StorageService;
use crate::services::storage_key::{
    Locator, LocatorError, derive_storage_key, extension_for_media_type, generate_random_segment,
};
use crate::services::video_store::VideoStore;

/// Container types the pipeline accepts.
pub const ACCEPTED_VIDEO_TYPES: &[&str] = &["video/mp4"];

const STAGING_PREFIX: &str = "video-upload-";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("video not found")]
    NotFound,

    #[error("video is not owned by the caller")]
    Unauthorized,

    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("upload is empty")]
    EmptyUpload,

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("staging failed: {0}")]
    Staging(#[source] std::io::Error),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("optimize failed: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("invalid locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("upload failed: {0}")]
    Upload(#[source] anyhow::Error),

    #[error("signing failed: {0}")]
    Sign(#[source] anyhow::Error),

    #[error("metadata store error: {0}")]
    Store(#[from] DbErr),
}

impl From<StagingError> for IngestError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::TooLarge { limit } => IngestError::TooLarge { limit },
            StagingError::Empty => IngestError::EmptyUpload,
            StagingError::Io(e) => IngestError::Staging(e),
        }
    }
}

/// Parses a declared Content-Type and checks it against `accepted`.
/// Parameters such as `; codecs=...` are ignored.
pub fn validate_media_type(declared: Option<&str>, accepted: &[&str]) -> Result<String, IngestError> {
    let declared = declared.ok_or_else(|| IngestError::InvalidMediaType("missing".to_string()))?;
    let parsed: mime::Mime = declared
        .parse()
        .map_err(|_| IngestError::InvalidMediaType(format!("malformed '{}'", declared)))?;
    let essence = parsed.essence_str().to_ascii_lowercase();
    if accepted.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(IngestError::InvalidMediaType(essence))
    }
}

pub(crate) fn log_failure(video_id: Uuid, stage: &'static str, err: &dyn std::fmt::Display) {
    error!(%video_id, stage, error = %err, "video ingest stage failed");
}

/// Runs upload → stage → optimize → probe → store → persist → sign for one
/// video. Temporary files live only for the duration of a call.
pub struct VideoIngestService {
    store: Arc<dyn VideoStore>,
    storage: Arc<dyn StorageService>,
    media: Arc<dyn MediaProcessor>,
    classifier: AspectClassifier,
    config: AppConfig,
}

impl VideoIngestService {
    pub fn new(
        store: Arc<dyn VideoStore>,
        storage: Arc<dyn StorageService>,
        media: Arc<dyn MediaProcessor>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            storage,
            media,
            classifier: AspectClassifier::new(config.aspect_tolerance),
            config,
        }
    }

    /// Loads a video and checks that `principal` owns it.
    pub async fn authorize(&self, principal: Uuid, video_id: Uuid) -> Result<videos::Model, IngestError> {
        let video = self
            .store
            .get_video(video_id)
            .await?
            .ok_or(IngestError::NotFound)?;
        if video.user_id != principal.to_string() {
            warn!(%video_id, %principal, "upload rejected: caller does not own video");
            return Err(IngestError::Unauthorized);
        }
        Ok(video)
    }

    /// Processes an uploaded video and records where it was stored.
    /// The returned record carries a signed playback URL; the stored record
    /// keeps the locator.
    pub async fn upload_video<'a>(
        &self,
        principal: Uuid,
        video_id: Uuid,
        content_type: Option<&str>,
        reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<videos::Model, IngestError> {
        let previous = self.authorize(principal, video_id).await?.video_url;

        let media_type = validate_media_type(content_type, ACCEPTED_VIDEO_TYPES)
            .inspect_err(|e| log_failure(video_id, "validate", e))?;

        info!(%video_id, %media_type, "staging video upload");
        let mut staged = StagedFile::create_in(&self.config.staging_dir(), STAGING_PREFIX, ".mp4")
            .inspect_err(|e| log_failure(video_id, "stage", e))?;
        let size = staged
            .fill_from(reader, self.config.max_upload_size)
            .await
            .inspect_err(|e| log_failure(video_id, "stage", e))?;
        staged
            .rewind()
            .await
            .inspect_err(|e| log_failure(video_id, "stage", e))?;

        let optimized = self
            .media
            .optimize(staged.path())
            .await
            .inspect_err(|e| log_failure(video_id, "optimize", e))?;

        let geometry = self
            .media
            .probe(staged.path())
            .await
            .inspect_err(|e| log_failure(video_id, "probe", e))?;
        let aspect = self.classifier.classify(geometry.width, geometry.height);

        let key = derive_storage_key(
            aspect,
            extension_for_media_type(&media_type),
            &generate_random_segment(),
        );
        let locator = Locator::new(self.storage.bucket(), key.clone())
            .inspect_err(|e| log_failure(video_id, "derive_key", e))?;

        let file = tokio::fs::File::open(optimized.path())
            .await
            .map_err(IngestError::Staging)
            .inspect_err(|e| log_failure(video_id, "upload", e))?;
        let uploaded = self
            .storage
            .upload_object(&key, &media_type, Box::new(file))
            .await
            .map_err(IngestError::Upload)
            .inspect_err(|e| log_failure(video_id, "upload", e))?;

        if let Err(e) = optimized.close() {
            warn!(%video_id, "failed to remove optimized file: {}", e);
        }
        if let Err(e) = staged.close() {
            warn!(%video_id, "failed to remove staged file: {}", e);
        }

        let video = match self.store.set_video_url(video_id, locator.encode()).await {
            Ok(video) => video,
            Err(e) => {
                log_failure(video_id, "persist", &e);
                if let Err(cleanup) = self.storage.delete_file(&key).await {
                    warn!(%video_id, %key, "failed to remove orphaned object: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        if let Some(previous) = previous {
            self.remove_replaced(video_id, &previous, &locator).await;
        }

        info!(
            %video_id,
            %aspect,
            width = geometry.width,
            height = geometry.height,
            staged_bytes = size,
            stored_bytes = uploaded.size,
            "video stored"
        );

        self.sign_video(video)
            .await
            .inspect_err(|e| log_failure(video_id, "sign", e))
    }

    /// Best-effort delete of the object a re-upload replaced. Objects in a
    /// bucket other than the current one are left alone.
    async fn remove_replaced(&self, video_id: Uuid, previous: &str, current: &Locator) {
        let previous = match Locator::decode(previous) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(%video_id, "replaced locator is unreadable, object kept: {}", e);
                return;
            }
        };
        if previous.bucket() != self.storage.bucket() || previous == *current {
            return;
        }
        match self.storage.delete_file(previous.key()).await {
            Ok(()) => info!(%video_id, key = %previous.key(), "removed replaced object"),
            Err(e) => warn!(%video_id, key = %previous.key(), "failed to remove replaced object: {}", e),
        }
    }

    /// Replaces the stored locator with a time-limited URL. Records without
    /// a locator pass through unchanged.
    pub async fn sign_video(&self, mut video: videos::Model) -> Result<videos::Model, IngestError> {
        let Some(stored) = video.video_url.as_deref() else {
            return Ok(video);
        };
        let locator = Locator::decode(stored)?;
        let url = self
            .storage
            .presign_get(
                locator.bucket(),
                locator.key(),
                self.config.signed_url_ttl(),
            )
            .await
            .map_err(IngestError::Sign)?;
        video.video_url = Some(url);
        Ok(video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_media_type() {
        assert_eq!(
            validate_media_type(Some("video/mp4"), ACCEPTED_VIDEO_TYPES).unwrap(),
            "video/mp4"
        );
        assert_eq!(
            validate_media_type(Some("Video/MP4; codecs=\"avc1\""), ACCEPTED_VIDEO_TYPES).unwrap(),
            "video/mp4"
        );
    }

    #[test]
    fn test_validate_media_type_rejects() {
        for declared in [Some("video/quicktime"), Some("image/png"), Some("garbage"), Some(""), None] {
            assert!(matches!(
                validate_media_type(declared, ACCEPTED_VIDEO_TYPES),
                Err(IngestError::InvalidMediaType(_))
            ));
        }
    }

    #[test]
    fn test_staging_error_mapping() {
        assert!(matches!(
            IngestError::from(StagingError::TooLarge { limit: 5 }),
            IngestError::TooLarge { limit: 5 }
        ));
        assert!(matches!(
            IngestError::from(StagingError::Empty),
            IngestError::EmptyUpload
        ));
    }
}
