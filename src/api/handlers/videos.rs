use crate::AppState;
use crate::api::error::AppError;
use crate::entities::videos;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateVideoRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: String,
}

/// Video record as returned to clients. `video_url` is a short-lived signed
/// URL, never the stored locator.
#[derive(Serialize, ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<videos::Model> for VideoResponse {
    fn from(model: videos::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            description: model.description,
            thumbnail_url: model.thumbnail_url,
            video_url: model.video_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Multipart body for `POST /api/video_upload/{video_id}`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct VideoUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
}

pub(crate) fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid ID".to_string()))
}

pub(crate) fn principal(claims: &Claims) -> Result<Uuid, AppError> {
    claims
        .principal()
        .map_err(|_| AppError::Unauthorized("Couldn't validate JWT".to_string()))
}

pub(crate) fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// Reads and discards whatever is left of a multipart body.
pub(crate) async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(_)) = multipart.next_field().await {}
}

#[utoipa::path(
    post,
    path = "/api/videos",
    request_body = CreateVideoRequest,
    responses(
        (status = 201, description = "Video draft created", body = VideoResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn create_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<VideoResponse>), AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = principal(&claims)?;

    let video = state
        .store
        .create_video(user_id, req.title, req.description)
        .await?;

    Ok((StatusCode::CREATED, Json(video.into())))
}

#[utoipa::path(
    get,
    path = "/api/videos",
    responses(
        (status = 200, description = "Videos owned by the caller", body = [VideoResponse]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn list_videos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<VideoResponse>>, AppError> {
    let user_id = principal(&claims)?;
    let stored = state.store.list_videos(user_id).await?;

    let mut signed = Vec::with_capacity(stored.len());
    for video in stored {
        signed.push(state.ingest.sign_video(video).await?.into());
    }
    Ok(Json(signed))
}

#[utoipa::path(
    get,
    path = "/api/videos/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video with a signed playback URL", body = VideoResponse),
        (status = 400, description = "Invalid ID"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoResponse>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = principal(&claims)?;

    let video = state.ingest.authorize(user_id, video_id).await?;
    let video = state.ingest.sign_video(video).await?;
    Ok(Json(video.into()))
}

#[utoipa::path(
    post,
    path = "/api/video_upload/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    request_body(content = VideoUploadForm, content_type = "multipart/form-data", description = "MP4 upload in the `video` field"),
    responses(
        (status = 200, description = "Video stored", body = VideoResponse),
        (status = 400, description = "Invalid ID, media type or empty upload"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Video not found"),
        (status = 413, description = "Upload too large")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<VideoResponse>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = principal(&claims)?;

    let mut outcome = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("video") {
            continue;
        }
        let content_type = field.content_type().map(|s| s.to_string());
        let reader = StreamReader::new(field.map_err(std::io::Error::other));

        outcome = Some(
            state
                .ingest
                .upload_video(user_id, video_id, content_type.as_deref(), reader)
                .await,
        );
        break;
    }
    drain(&mut multipart).await;

    let video = outcome.ok_or_else(|| AppError::BadRequest("Missing 'video' field".to_string()))??;
    Ok(Json(video.into()))
}
