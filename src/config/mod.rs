use anyhow::{Result, bail};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum part size accepted by S3 multipart uploads.
pub const MIN_UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Runtime configuration for the video backend
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP port (default: 8091)
    pub port: u16,

    /// Database connection string (default: local SQLite file)
    pub database_url: String,

    /// Secret used to validate bearer tokens
    pub jwt_secret: String,

    /// Bucket that receives processed videos
    pub s3_bucket: String,

    /// Region used for signing requests (default: "us-east-1")
    pub s3_region: String,

    /// Custom S3 endpoint (MinIO, LocalStack). `None` means AWS.
    pub s3_endpoint: Option<String>,

    /// Static access key. Falls back to the default credential chain when unset.
    pub s3_access_key: Option<String>,

    /// Static secret key. Falls back to the default credential chain when unset.
    pub s3_secret_key: Option<String>,

    /// Upload size ceiling for videos in bytes (default: 10 GiB)
    pub max_upload_size: u64,

    /// Upload size ceiling for thumbnails in bytes (default: 10 MiB)
    pub max_thumbnail_size: u64,

    /// Part size for multipart uploads in bytes (default: 10 MiB)
    pub upload_chunk_size: usize,

    /// Lifetime of signed playback URLs in seconds (default: 60)
    pub signed_url_ttl_secs: u64,

    /// ffmpeg binary (default: "ffmpeg")
    pub ffmpeg_path: String,

    /// ffprobe binary (default: "ffprobe")
    pub ffprobe_path: String,

    /// Wall-clock limit for each external tool run in seconds (default: 600)
    pub tool_timeout_secs: u64,

    /// Directory for staged uploads. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Allowed distance from a reference aspect ratio (default: 0.1)
    pub aspect_tolerance: f64,

    /// Directory holding thumbnail assets (default: "./assets")
    pub assets_root: PathBuf,

    /// Base URL under which `/assets` is publicly reachable
    pub public_base_url: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8091,
            database_url: "sqlite://videos.db?mode=rwc".to_string(),
            jwt_secret: "secret".to_string(),
            s3_bucket: "videos".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            max_upload_size: 10 * 1024 * 1024 * 1024, // 10 GiB
            max_thumbnail_size: 10 * 1024 * 1024,     // 10 MiB
            upload_chunk_size: 10 * 1024 * 1024,      // 10 MiB
            signed_url_ttl_secs: 60,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            tool_timeout_secs: 600,
            temp_dir: None,
            aspect_tolerance: 0.1,
            assets_root: PathBuf::from("./assets"),
            public_base_url: "http://localhost:8091".to_string(),
            allowed_origins: vec![
                "http://localhost:8091".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:8091".to_string(),
            ],
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: parsed("PORT", default.port),
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
            s3_bucket: env::var("S3_BUCKET").unwrap_or(default.s3_bucket),
            s3_region: env::var("S3_REGION").unwrap_or(default.s3_region),
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            max_upload_size: parsed("MAX_UPLOAD_SIZE", default.max_upload_size),
            max_thumbnail_size: parsed("MAX_THUMBNAIL_SIZE", default.max_thumbnail_size),
            upload_chunk_size: parsed("UPLOAD_CHUNK_SIZE", default.upload_chunk_size),
            signed_url_ttl_secs: parsed("SIGNED_URL_TTL_SECS", default.signed_url_ttl_secs),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),
            tool_timeout_secs: parsed("TOOL_TIMEOUT_SECS", default.tool_timeout_secs),
            temp_dir: env::var("VIDEO_TEMP_DIR").ok().map(PathBuf::from),
            aspect_tolerance: parsed("ASPECT_TOLERANCE", default.aspect_tolerance),
            assets_root: env::var("ASSETS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.assets_root),
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development and tests (local MinIO, short tool timeout)
    pub fn development() -> Self {
        Self {
            s3_endpoint: Some("http://127.0.0.1:9000".to_string()),
            s3_access_key: Some("minioadmin".to_string()),
            s3_secret_key: Some("minioadmin".to_string()),
            tool_timeout_secs: 60,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.s3_bucket.is_empty() || self.s3_bucket.contains(',') {
            bail!("S3_BUCKET must be non-empty and must not contain ','");
        }
        if self.upload_chunk_size < MIN_UPLOAD_CHUNK_SIZE {
            bail!(
                "UPLOAD_CHUNK_SIZE must be at least {} bytes",
                MIN_UPLOAD_CHUNK_SIZE
            );
        }
        if self.signed_url_ttl_secs == 0 || self.signed_url_ttl_secs > 7 * 24 * 60 * 60 {
            bail!("SIGNED_URL_TTL_SECS must be between 1 second and 7 days");
        }
        if !(self.aspect_tolerance.is_finite() && self.aspect_tolerance >= 0.0) {
            bail!("ASPECT_TOLERANCE must be a non-negative number");
        }
        if self.tool_timeout_secs == 0 {
            bail!("TOOL_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Directory used for per-request staging files
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(env::temp_dir)
    }
}
