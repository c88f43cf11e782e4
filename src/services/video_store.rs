use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::entities::{prelude::*, videos};

/// Metadata store for video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create_video(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
    ) -> Result<videos::Model, DbErr>;

    async fn get_video(&self, id: Uuid) -> Result<Option<videos::Model>, DbErr>;

    /// Videos owned by `user_id`, newest first.
    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<videos::Model>, DbErr>;

    /// Sets only the storage locator and `updated_at`, then returns the
    /// current row. Other columns are left as they are in the database.
    async fn set_video_url(&self, id: Uuid, locator: String) -> Result<videos::Model, DbErr>;

    /// Sets only the thumbnail URL and `updated_at`, then returns the
    /// current row.
    async fn set_thumbnail_url(&self, id: Uuid, url: String) -> Result<videos::Model, DbErr>;

    async fn ping(&self) -> bool;
}

pub struct DbVideoStore {
    db: DatabaseConnection,
}

impl DbVideoStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn set_column(
        &self,
        id: Uuid,
        column: videos::Column,
        value: String,
    ) -> Result<videos::Model, DbErr> {
        let result = Videos::update_many()
            .col_expr(column, Expr::value(value))
            .col_expr(videos::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(videos::Column::Id.eq(id.to_string()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(DbErr::RecordNotUpdated);
        }

        Videos::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(id.to_string()))
    }
}

#[async_trait]
impl VideoStore for DbVideoStore {
    async fn create_video(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
    ) -> Result<videos::Model, DbErr> {
        let now = Utc::now();
        let video = videos::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            title: Set(title),
            description: Set(description),
            thumbnail_url: Set(None),
            video_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        video.insert(&self.db).await
    }

    async fn get_video(&self, id: Uuid) -> Result<Option<videos::Model>, DbErr> {
        Videos::find_by_id(id.to_string()).one(&self.db).await
    }

    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<videos::Model>, DbErr> {
        Videos::find()
            .filter(videos::Column::UserId.eq(user_id.to_string()))
            .order_by_desc(videos::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    async fn set_video_url(&self, id: Uuid, locator: String) -> Result<videos::Model, DbErr> {
        self.set_column(id, videos::Column::VideoUrl, locator).await
    }

    async fn set_thumbnail_url(&self, id: Uuid, url: String) -> Result<videos::Model, DbErr> {
        self.set_column(id, videos::Column::ThumbnailUrl, url).await
    }

    async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}
