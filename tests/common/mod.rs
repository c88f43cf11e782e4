#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use rust_video_backend::config::AppConfig;
use rust_video_backend::entities::videos;
use rust_video_backend::infrastructure::database;
use rust_video_backend::services::media::{
    MediaProcessor, OptimizeError, OptimizedFile, ProbeError, StreamInfo, optimized_path_for,
};
use rust_video_backend::services::storage::{StorageService, UploadResult};
use rust_video_backend::services::thumbnail_service::ThumbnailService;
use rust_video_backend::services::video_service::VideoIngestService;
use rust_video_backend::services::video_store::{DbVideoStore, VideoStore};
use rust_video_backend::utils::auth::create_jwt;
use rust_video_backend::{AppState, create_app};
use sea_orm::{Database, DatabaseConnection, DbErr};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_BUCKET: &str = "videos";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// In-memory object store with a controllable clock for URL expiry.
pub struct MockStorageService {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    deleted: Mutex<Vec<String>>,
    now: Mutex<SystemTime>,
    pub fail_upload: AtomicBool,
    pub fail_sign: AtomicBool,
}

impl MockStorageService {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            now: Mutex::new(SystemTime::now()),
            fail_upload: AtomicBool::new(false),
            fail_sign: AtomicBool::new(false),
        }
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    fn unix_now(&self) -> u64 {
        self.now
            .lock()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Resolves a URL handed out by `presign_get`, honoring its expiry.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let rest = url
            .strip_prefix("mock://")
            .ok_or_else(|| anyhow!("not a mock url: {}", url))?;
        let (path, query) = rest
            .split_once("?expires=")
            .ok_or_else(|| anyhow!("unsigned url: {}", url))?;
        let expires: u64 = query.parse()?;
        if self.unix_now() > expires {
            bail!("url expired");
        }
        let (bucket, key) = path
            .split_once('/')
            .ok_or_else(|| anyhow!("malformed url: {}", url))?;
        if bucket != self.bucket {
            bail!("unknown bucket {}", bucket);
        }
        self.object(key)
            .map(|o| o.data)
            .ok_or_else(|| anyhow!("no such key {}", key))
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_object<'a>(
        &self,
        key: &str,
        content_type: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        if self.fail_upload.load(Ordering::SeqCst) {
            bail!("injected upload failure");
        }
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let size = data.len() as i64;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(UploadResult {
            key: key.to_string(),
            size,
        })
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        if self.fail_sign.load(Ordering::SeqCst) {
            bail!("injected signing failure");
        }
        let expires = self.unix_now() + expires_in.as_secs();
        Ok(format!("mock://{}/{}?expires={}", bucket, key, expires))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Stand-in for ffmpeg/ffprobe. `optimize` appends a marker so tests can
/// tell the optimized copy from the original.
pub struct FakeMediaProcessor {
    pub width: u32,
    pub height: u32,
    pub fail_optimize: AtomicBool,
    pub fail_probe: AtomicBool,
    /// When set, `optimize` signals `optimize_entered` and then waits for
    /// `optimize_release` before doing any work.
    pub hold_optimize: AtomicBool,
    pub optimize_entered: Notify,
    pub optimize_release: Notify,
}

pub const OPTIMIZED_MARKER: &[u8] = b"+faststart";

impl FakeMediaProcessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_optimize: AtomicBool::new(false),
            fail_probe: AtomicBool::new(false),
            hold_optimize: AtomicBool::new(false),
            optimize_entered: Notify::new(),
            optimize_release: Notify::new(),
        }
    }
}

#[async_trait]
impl MediaProcessor for FakeMediaProcessor {
    async fn probe(&self, _path: &Path) -> Result<StreamInfo, ProbeError> {
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(ProbeError::NoVideoStream);
        }
        Ok(StreamInfo {
            width: self.width,
            height: self.height,
        })
    }

    async fn optimize(&self, path: &Path) -> Result<OptimizedFile, OptimizeError> {
        if self.hold_optimize.load(Ordering::SeqCst) {
            self.optimize_entered.notify_one();
            self.optimize_release.notified().await;
        }
        let output = OptimizedFile::new(optimized_path_for(path));
        let mut data = tokio::fs::read(path)
            .await
            .map_err(|_| OptimizeError::MissingOutput(output.path().to_path_buf()))?;
        data.extend_from_slice(OPTIMIZED_MARKER);
        // Written before failing so cleanup of partial output is exercised.
        tokio::fs::write(output.path(), &data)
            .await
            .map_err(|_| OptimizeError::MissingOutput(output.path().to_path_buf()))?;

        if self.fail_optimize.load(Ordering::SeqCst) {
            return Err(OptimizeError::MissingOutput(output.path().to_path_buf()));
        }
        Ok(output)
    }
}

/// Database-backed store whose updates can be made to fail.
pub struct FlakyStore {
    inner: DbVideoStore,
    pub fail_update: AtomicBool,
}

impl FlakyStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            inner: DbVideoStore::new(db),
            fail_update: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl VideoStore for FlakyStore {
    async fn create_video(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
    ) -> Result<videos::Model, DbErr> {
        self.inner.create_video(user_id, title, description).await
    }

    async fn get_video(&self, id: Uuid) -> Result<Option<videos::Model>, DbErr> {
        self.inner.get_video(id).await
    }

    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<videos::Model>, DbErr> {
        self.inner.list_videos(user_id).await
    }

    async fn set_video_url(&self, id: Uuid, locator: String) -> Result<videos::Model, DbErr> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("injected update failure".to_string()));
        }
        self.inner.set_video_url(id, locator).await
    }

    async fn set_thumbnail_url(&self, id: Uuid, url: String) -> Result<videos::Model, DbErr> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("injected update failure".to_string()));
        }
        self.inner.set_thumbnail_url(id, url).await
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }
}

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// Config rooted in `dir`: staging in `dir/staging`, assets in `dir/assets`.
pub fn test_config(dir: &Path) -> AppConfig {
    let staging = dir.join("staging");
    let assets = dir.join("assets");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::create_dir_all(&assets).unwrap();

    AppConfig {
        jwt_secret: TEST_SECRET.to_string(),
        s3_bucket: TEST_BUCKET.to_string(),
        temp_dir: Some(staging),
        assets_root: assets,
        public_base_url: "http://localhost:8091".to_string(),
        ..AppConfig::development()
    }
}

pub fn token_for(user_id: Uuid) -> String {
    create_jwt(&user_id.to_string(), TEST_SECRET, chrono::Duration::hours(1)).unwrap()
}

pub fn dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

pub struct Harness {
    pub dir: TempDir,
    pub config: AppConfig,
    pub store: Arc<FlakyStore>,
    pub storage: Arc<MockStorageService>,
    pub media: Arc<FakeMediaProcessor>,
    pub ingest: Arc<VideoIngestService>,
    pub thumbnails: Arc<ThumbnailService>,
}

impl Harness {
    pub async fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, |_| {}).await
    }

    pub async fn with_config(width: u32, height: u32, tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        tweak(&mut config);

        let store = Arc::new(FlakyStore::new(setup_test_db().await));
        let storage = Arc::new(MockStorageService::new(&config.s3_bucket));
        let media = Arc::new(FakeMediaProcessor::new(width, height));
        let ingest = Arc::new(VideoIngestService::new(
            store.clone(),
            storage.clone(),
            media.clone(),
            config.clone(),
        ));
        let thumbnails = Arc::new(ThumbnailService::new(store.clone(), config.clone()));

        Self {
            dir,
            config,
            store,
            storage,
            media,
            ingest,
            thumbnails,
        }
    }

    pub fn staging_entries(&self) -> usize {
        dir_entries(&self.config.staging_dir())
    }

    pub async fn create_video(&self, owner: Uuid) -> videos::Model {
        self.store
            .create_video(owner, "Boot review".to_string(), "Trail test".to_string())
            .await
            .unwrap()
    }

    pub fn app(&self) -> axum::Router {
        create_app(AppState {
            store: self.store.clone(),
            storage: self.storage.clone(),
            ingest: self.ingest.clone(),
            thumbnails: self.thumbnails.clone(),
            config: self.config.clone(),
        })
    }
}

pub fn video_id(video: &videos::Model) -> Uuid {
    Uuid::parse_str(&video.id).unwrap()
}

pub fn multipart_body(boundary: &str, field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\n\
        Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
