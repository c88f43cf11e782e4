use crate::AppState;
use crate::api::error::AppError;
use crate::api::handlers::videos::{VideoResponse, drain, multipart_error, parse_video_id, principal};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart body for `POST /api/thumbnail_upload/{video_id}`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ThumbnailUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub thumbnail: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/api/thumbnail_upload/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    request_body(content = ThumbnailUploadForm, content_type = "multipart/form-data", description = "JPEG or PNG in the `thumbnail` field"),
    responses(
        (status = 200, description = "Thumbnail stored", body = VideoResponse),
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
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<VideoResponse>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = principal(&claims)?;

    let mut outcome = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("thumbnail") {
            continue;
        }
        let content_type = field.content_type().map(|s| s.to_string());
        let reader = StreamReader::new(field.map_err(std::io::Error::other));

        outcome = Some(
            state
                .thumbnails
                .upload_thumbnail(user_id, video_id, content_type.as_deref(), reader)
                .await,
        );
        break;
    }
    drain(&mut multipart).await;

    let video =
        outcome.ok_or_else(|| AppError::BadRequest("Missing 'thumbnail' field".to_string()))??;

    // The stored record keeps a locator; hand back a playable URL.
    let video = state.ingest.sign_video(video).await?;
    Ok(Json(video.into()))
}
