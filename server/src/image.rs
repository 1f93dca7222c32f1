// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::postgres::PgExecutor;
use sqlx::prelude::FromRow;
use utoipa::ToSchema;

use crate::access::{AccessContext, AccessService, Target};
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::managers::{LogManager, TextLogManager};
use crate::middleware::{RouteGuard, access_guard};
use crate::model::{MessageResponse, ORGANIZER, ORGANIZER_OR_CO_HOST};

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Image {
    pub id: i64,
    pub url: String,
    pub preview: bool,
}

/// Which join table links an image to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOwner {
    Group { group_id: i64 },
    Event { event_id: i64, group_id: i64 },
}

impl ImageOwner {
    pub fn group_id(&self) -> i64 {
        match self {
            ImageOwner::Group { group_id } => *group_id,
            ImageOwner::Event { group_id, .. } => *group_id,
        }
    }
}

/// Where a new image is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Group(i64),
    Event(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub url: String,
    pub preview: bool,
}

#[derive(FromRow)]
struct OwnerRow {
    group_id: i64,
    event_id: Option<i64>,
}

pub(crate) async fn find_image_owner<'e, E: PgExecutor<'e>>(
    executor: E,
    image_id: i64,
) -> Result<Option<ImageOwner>, DatabaseError> {
    let row = sqlx::query_as::<_, OwnerRow>(
        r#"SELECT gi.group_id, NULL::BIGINT AS event_id
           FROM group_images gi
           WHERE gi.image_id = $1
           UNION ALL
           SELECT e.group_id, ei.event_id
           FROM event_images ei
           INNER JOIN events e ON e.id = ei.event_id
           WHERE ei.image_id = $1
           LIMIT 1"#,
    )
    .bind(image_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| match row.event_id {
        Some(event_id) => ImageOwner::Event {
            event_id,
            group_id: row.group_id,
        },
        None => ImageOwner::Group {
            group_id: row.group_id,
        },
    }))
}

/// Inserts the image and its join row. A preview image clears the preview
/// flag on the owner's other images.
pub(crate) async fn insert_image(
    conn: &mut PgConnection,
    attachment: Attachment,
    image: &NewImage,
) -> Result<Image, DatabaseError> {
    if image.preview {
        let statement = match attachment {
            Attachment::Group(_) => {
                r#"UPDATE images SET preview = FALSE, updated_at = now()
                   WHERE id IN (SELECT image_id FROM group_images WHERE group_id = $1)"#
            }
            Attachment::Event(_) => {
                r#"UPDATE images SET preview = FALSE, updated_at = now()
                   WHERE id IN (SELECT image_id FROM event_images WHERE event_id = $1)"#
            }
        };
        let owner_id = match attachment {
            Attachment::Group(id) | Attachment::Event(id) => id,
        };
        sqlx::query(statement)
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;
    }

    let created = sqlx::query_as::<_, Image>(
        r#"INSERT INTO images (url, preview)
           VALUES ($1, $2)
           RETURNING id, url, preview"#,
    )
    .bind(&image.url)
    .bind(image.preview)
    .fetch_one(&mut *conn)
    .await?;

    match attachment {
        Attachment::Group(group_id) => {
            sqlx::query("INSERT INTO group_images (image_id, group_id) VALUES ($1, $2)")
                .bind(created.id)
                .bind(group_id)
                .execute(&mut *conn)
                .await?;
        }
        Attachment::Event(event_id) => {
            sqlx::query("INSERT INTO event_images (image_id, event_id) VALUES ($1, $2)")
                .bind(created.id)
                .bind(event_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(created)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::NotFound(msg) => ApiError::NotFound(msg),
            DomainError::InternalError(db_err) => {
                tracing::error!("Database error: {}", db_err);
                ApiError::internal()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPOSITORY
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ImageTransaction: Send + Sync {
    fn attach_image(
        &mut self,
        attachment: Attachment,
        image: &NewImage,
    ) -> impl Future<Output = Result<Image, DatabaseError>> + Send;

    fn find_owner(
        &mut self,
        image_id: i64,
    ) -> impl Future<Output = Result<Option<ImageOwner>, DatabaseError>> + Send;

    fn delete_image(
        &mut self,
        image_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

pub trait ImageRepository: Send + Sync + Clone {
    type Transaction: ImageTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;
}

pub struct PgImageTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl ImageTransaction for PgImageTransaction {
    async fn attach_image(
        &mut self,
        attachment: Attachment,
        image: &NewImage,
    ) -> Result<Image, DatabaseError> {
        insert_image(&mut self.transaction, attachment, image).await
    }

    async fn find_owner(&mut self, image_id: i64) -> Result<Option<ImageOwner>, DatabaseError> {
        find_image_owner(&mut *self.transaction, image_id).await
    }

    async fn delete_image(&mut self, image_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(image_id)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl ImageRepository for Postgre {
    type Transaction = PgImageTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgImageTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ImageService<R: ImageRepository, G: LogManager> {
    repository: R,
    logger: G,
}

impl<R: ImageRepository, G: LogManager> ImageService<R, G> {
    pub fn new(repository: R, logger: G) -> Self {
        Self { repository, logger }
    }

    pub async fn add_image(
        &self,
        attachment: Attachment,
        image: NewImage,
    ) -> Result<Image, DomainError> {
        let mut tx = self.repository.begin().await?;
        let created = tx.attach_image(attachment, &image).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!("Image added: image_id={}, owner={:?}", created.id, attachment),
                "image",
            )
            .await;

        Ok(created)
    }

    pub async fn delete_group_image(&self, image_id: i64) -> Result<(), DomainError> {
        self.delete_image(image_id, false, "Group Image couldn't be found")
            .await
    }

    pub async fn delete_event_image(&self, image_id: i64) -> Result<(), DomainError> {
        self.delete_image(image_id, true, "Event Image couldn't be found")
            .await
    }

    async fn delete_image(
        &self,
        image_id: i64,
        event_image: bool,
        missing: &str,
    ) -> Result<(), DomainError> {
        let mut tx = self.repository.begin().await?;

        let owner = tx.find_owner(image_id).await?;
        let matches = match owner {
            Some(ImageOwner::Group { .. }) => !event_image,
            Some(ImageOwner::Event { .. }) => event_image,
            None => false,
        };
        if !matches {
            self.repository.rollback(tx).await?;
            return Err(DomainError::NotFound(missing.to_string()));
        }

        tx.delete_image(image_id).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(format!("Image deleted: image_id={}", image_id), "image")
            .await;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ImageRequest {
    pub url: Option<String>,
    pub preview: Option<bool>,
}

impl ImageRequest {
    pub fn validate(self) -> Result<NewImage, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let url = self.url.unwrap_or_default().trim().to_string();
        errors.check(!url.is_empty(), "url", "Url is required");
        errors.check(self.preview.is_some(), "preview", "Preview must be a boolean");

        errors.into_result()?;
        Ok(NewImage {
            url,
            preview: self.preview.unwrap_or(false),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Images = ImageService<Postgre, TextLogManager>;

pub fn image_routes(image_service: Images, access: AccessService<Postgre>) -> OpenApiRouter<Postgre> {
    let organizer = OpenApiRouter::new()
        .routes(routes!(add_group_image_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access.clone(), ORGANIZER, Target::Group),
            access_guard,
        ));

    let admins = OpenApiRouter::new()
        .routes(routes!(add_event_image_handler))
        .routes(routes!(delete_group_image_handler))
        .routes(routes!(delete_event_image_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ORGANIZER_OR_CO_HOST, Target::Group),
            access_guard,
        ));

    organizer.merge(admins).with_state(image_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    post,
    tag = "image",
    path = "/groups/{groupId}/images",
    params(("groupId", Path, description = "Group to attach the image to")),
    request_body = ImageRequest,
    responses(
        (status = 201, description = "Image attached", body = Image),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not the organizer", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn add_group_image_handler(
    State(service): State<Images>,
    Path(group_id): Path<i64>,
    AppJson(payload): AppJson<ImageRequest>,
) -> Result<(StatusCode, Json<Image>), ApiError> {
    let image = payload.validate().map_err(DomainError::Validation)?;
    let created = service.add_image(Attachment::Group(group_id), image).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    tag = "image",
    path = "/events/{eventId}/images",
    params(("eventId", Path, description = "Event to attach the image to")),
    request_body = ImageRequest,
    responses(
        (status = 201, description = "Image attached", body = Image),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn add_event_image_handler(
    State(service): State<Images>,
    Path(event_id): Path<i64>,
    AppJson(payload): AppJson<ImageRequest>,
) -> Result<(StatusCode, Json<Image>), ApiError> {
    let image = payload.validate().map_err(DomainError::Validation)?;
    let created = service.add_image(Attachment::Event(event_id), image).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    delete,
    tag = "image",
    path = "/group-images/{imageId}",
    params(("imageId", Path, description = "Group image to delete")),
    responses(
        (status = 200, description = "Image deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Group image not found", body = ErrorBody),
    )
)]
async fn delete_group_image_handler(
    State(service): State<Images>,
    Extension(context): Extension<AccessContext>,
) -> Result<Json<MessageResponse>, ApiError> {
    let image = context
        .image()
        .ok_or_else(|| ApiError::NotFound("Group Image couldn't be found".to_string()))?;
    service.delete_group_image(image.image.id).await?;
    Ok(Json(MessageResponse::deleted()))
}

#[utoipa::path(
    delete,
    tag = "image",
    path = "/event-images/{imageId}",
    params(("imageId", Path, description = "Event image to delete")),
    responses(
        (status = 200, description = "Image deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Event image not found", body = ErrorBody),
    )
)]
async fn delete_event_image_handler(
    State(service): State<Images>,
    Extension(context): Extension<AccessContext>,
) -> Result<Json<MessageResponse>, ApiError> {
    let image = context
        .image()
        .ok_or_else(|| ApiError::NotFound("Event Image couldn't be found".to_string()))?;
    service.delete_event_image(image.image.id).await?;
    Ok(Json(MessageResponse::deleted()))
}
