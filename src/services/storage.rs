use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, warn};

use crate::config::MIN_UPLOAD_CHUNK_SIZE;

pub struct UploadResult {
    pub key: String,
    pub size: i64,
}

/// Durable object storage for processed media.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Bucket that `upload_object` writes into.
    fn bucket(&self) -> &str;

    /// Stores the reader's bytes under `key` with the given content type.
    /// Nothing is committed unless the whole stream was transferred.
    async fn upload_object<'a>(
        &self,
        key: &str,
        content_type: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult>;

    async fn delete_file(&self, key: &str) -> Result<()>;

    /// Time-limited anonymous GET URL for `bucket`/`key`.
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;

    async fn health_check(&self) -> bool;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
    chunk_size: usize,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String, chunk_size: usize) -> Self {
        Self {
            client,
            bucket,
            chunk_size: chunk_size.max(MIN_UPLOAD_CHUNK_SIZE),
        }
    }
}

/// Fills `buffer` from `reader`; returns fewer bytes only at end of stream.
async fn read_chunk<R: AsyncRead + Unpin + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < buffer.len() {
        let read = reader.read(&mut buffer[n..]).await?;
        if read == 0 {
            break;
        }
        n += read;
    }
    Ok(n)
}

/// Aborts an in-flight multipart upload unless it was completed, including
/// when the upload future is dropped mid-transfer.
struct MultipartGuard {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    completed: bool,
}

impl Drop for MultipartGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "no runtime to abort multipart upload {}", self.upload_id);
            return;
        };
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        handle.spawn(async move {
            match client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                Ok(_) => info!(%key, "aborted multipart upload"),
                Err(e) => warn!(%key, "failed to abort multipart upload {}: {:?}", upload_id, e),
            }
        });
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_object<'a>(
        &self,
        key: &str,
        content_type: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let mut buffer = vec![0u8; self.chunk_size];
        let first = read_chunk(&mut reader, &mut buffer).await?;

        // Small objects go up in a single request.
        if first < self.chunk_size {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(buffer[..first].to_vec()))
                .send()
                .await?;
            return Ok(UploadResult {
                key: key.to_string(),
                size: first as i64,
            });
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?;
        let mut guard = MultipartGuard {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            completed: false,
        };

        let mut chunk_index = 1;
        let mut completed_parts = Vec::new();
        let mut total_size = 0i64;
        let mut n = first;

        while n > 0 {
            total_size += n as i64;
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(buffer[..n].to_vec()))
                .part_number(chunk_index)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(chunk_index)
                    .build(),
            );

            chunk_index += 1;
            n = read_chunk(&mut reader, &mut buffer).await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        guard.completed = true;

        Ok(UploadResult {
            key: key.to_string(),
            size: total_size,
        })
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let presigning_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await?;

        Ok(presigned_request.uri().to_string())
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}
