use crate::config::AppConfig;
use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_storage(config: &AppConfig) -> Arc<S3StorageService> {
    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        config.s3_endpoint.as_deref().unwrap_or("aws"),
        config.s3_bucket
    );

    let mut loader = aws_config::from_env().region(Region::new(config.s3_region.clone()));
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Some(access_key), Some(secret_key)) = (&config.s3_access_key, &config.s3_secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }
    let aws_config = loader.load().await;

    // Custom endpoints (MinIO) only serve path-style URLs.
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.s3_endpoint.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    match s3_client.head_bucket().bucket(&config.s3_bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.s3_bucket),
        Err(e) => warn!(
            "⚠️ Bucket '{}' is not reachable yet: {}",
            config.s3_bucket, e
        ),
    }

    Arc::new(S3StorageService::new(
        s3_client,
        config.s3_bucket.clone(),
        config.upload_chunk_size,
    ))
}
