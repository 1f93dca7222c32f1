// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::access::{AccessService, Target};
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::image::{Attachment, Image, NewImage, insert_image};
use crate::managers::{LogManager, TextLogManager};
use crate::membership::GroupMember;
use crate::middleware::{AuthUser, RouteGuard, access_guard, require_auth};
use crate::model::{MeetingType, MemberRole, MessageResponse, ORGANIZER};
use crate::venue::Venue;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

/// Select list for `Group` rows; expects the table aliased as `g`.
pub const GROUP_COLUMNS: &str = r#"g.id, g.organizer_id, g.name, g.about, g.type, g.private, g.city, g.state,
    (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id AND gm.role <> 'pending') AS num_members,
    g.created_at, g.updated_at"#;

const PREVIEW_COLUMN: &str = r#"(SELECT i.url FROM group_images gi
    INNER JOIN images i ON i.id = gi.image_id
    WHERE gi.group_id = g.id AND i.preview
    ORDER BY i.id DESC LIMIT 1) AS preview_image"#;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub about: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub group_type: MeetingType,
    pub private: bool,
    pub city: String,
    pub state: String,
    pub num_members: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub group: Group,
    pub preview_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupDetails {
    #[serde(flatten)]
    pub group: Group,
    #[serde(rename = "GroupImages")]
    pub images: Vec<Image>,
    #[serde(rename = "Organizer")]
    pub organizer: Option<Organizer>,
    #[serde(rename = "Venues")]
    pub venues: Vec<Venue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub about: String,
    pub group_type: MeetingType,
    pub private: bool,
    pub city: String,
    pub state: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Group couldn't be found")]
    GroupNotFound,

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::GroupNotFound => {
                ApiError::NotFound("Group couldn't be found".to_string())
            }
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

pub trait GroupTransaction: Send + Sync {
    fn create_group(
        &mut self,
        organizer_id: i64,
        group: &NewGroup,
    ) -> impl Future<Output = Result<i64, DatabaseError>> + Send;

    fn add_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> impl Future<Output = Result<GroupMember, DatabaseError>> + Send;

    fn attach_group_image(
        &mut self,
        group_id: i64,
        image: &NewImage,
    ) -> impl Future<Output = Result<Image, DatabaseError>> + Send;

    fn fetch_group(
        &mut self,
        group_id: i64,
    ) -> impl Future<Output = Result<Option<Group>, DatabaseError>> + Send;

    fn update_group(
        &mut self,
        group_id: i64,
        group: &NewGroup,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Removes the group and every image attached to it or its events.
    fn delete_group(
        &mut self,
        group_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

pub trait GroupRepository: Send + Sync + Clone {
    type Transaction: GroupTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn find_all_groups(
        &self,
    ) -> impl Future<Output = Result<Vec<GroupSummary>, DatabaseError>> + Send;

    /// Groups the user organizes or holds any membership in.
    fn find_user_groups(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<GroupSummary>, DatabaseError>> + Send;

    fn get_group(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Option<Group>, DatabaseError>> + Send;

    fn find_group_images(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Vec<Image>, DatabaseError>> + Send;

    fn find_organizer(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<Organizer>, DatabaseError>> + Send;

    fn find_group_venues(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Vec<Venue>, DatabaseError>> + Send;
}

pub struct PgGroupTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl GroupTransaction for PgGroupTransaction {
    async fn create_group(&mut self, organizer_id: i64, group: &NewGroup) -> Result<i64, DatabaseError> {
        let group_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO groups (organizer_id, name, about, type, private, city, state)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(organizer_id)
        .bind(&group.name)
        .bind(&group.about)
        .bind(group.group_type)
        .bind(group.private)
        .bind(&group.city)
        .bind(&group.state)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(group_id)
    }

    async fn add_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<GroupMember, DatabaseError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"INSERT INTO group_members (user_id, group_id, role)
               VALUES ($1, $2, $3)
               RETURNING id, user_id, group_id, role, created_at, updated_at"#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(role)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(member)
    }

    async fn attach_group_image(&mut self, group_id: i64, image: &NewImage) -> Result<Image, DatabaseError> {
        insert_image(&mut self.transaction, Attachment::Group(group_id), image).await
    }

    async fn fetch_group(&mut self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups g WHERE g.id = $1",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(group)
    }

    async fn update_group(&mut self, group_id: i64, group: &NewGroup) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"UPDATE groups
               SET name = $2, about = $3, type = $4, private = $5, city = $6, state = $7,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(group_id)
        .bind(&group.name)
        .bind(&group.about)
        .bind(group.group_type)
        .bind(group.private)
        .bind(&group.city)
        .bind(&group.state)
        .execute(&mut *self.transaction)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_group(&mut self, group_id: i64) -> Result<bool, DatabaseError> {
        sqlx::query(
            r#"DELETE FROM images
               WHERE id IN (
                   SELECT image_id FROM group_images WHERE group_id = $1
                   UNION
                   SELECT ei.image_id FROM event_images ei
                   INNER JOIN events e ON e.id = ei.event_id
                   WHERE e.group_id = $1
               )"#,
        )
        .bind(group_id)
        .execute(&mut *self.transaction)
        .await?;

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl GroupRepository for Postgre {
    type Transaction = PgGroupTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgGroupTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn find_all_groups(&self) -> Result<Vec<GroupSummary>, DatabaseError> {
        let groups = sqlx::query_as::<_, GroupSummary>(&format!(
            "SELECT {}, {} FROM groups g ORDER BY g.id",
            GROUP_COLUMNS, PREVIEW_COLUMN
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn find_user_groups(&self, user_id: i64) -> Result<Vec<GroupSummary>, DatabaseError> {
        let groups = sqlx::query_as::<_, GroupSummary>(&format!(
            r#"SELECT {}, {} FROM groups g
               WHERE g.organizer_id = $1
                  OR EXISTS (SELECT 1 FROM group_members m WHERE m.group_id = g.id AND m.user_id = $1)
               ORDER BY g.id"#,
            GROUP_COLUMNS, PREVIEW_COLUMN
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups g WHERE g.id = $1",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn find_group_images(&self, group_id: i64) -> Result<Vec<Image>, DatabaseError> {
        let images = sqlx::query_as::<_, Image>(
            r#"SELECT i.id, i.url, i.preview
               FROM images i
               INNER JOIN group_images gi ON gi.image_id = i.id
               WHERE gi.group_id = $1
               ORDER BY i.id"#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    async fn find_organizer(&self, user_id: i64) -> Result<Option<Organizer>, DatabaseError> {
        let organizer = sqlx::query_as::<_, Organizer>(
            "SELECT id, first_name, last_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(organizer)
    }

    async fn find_group_venues(&self, group_id: i64) -> Result<Vec<Venue>, DatabaseError> {
        let venues = sqlx::query_as::<_, Venue>(
            r#"SELECT id, group_id, address, city, state, lat, lng
               FROM venues
               WHERE group_id = $1
               ORDER BY id"#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(venues)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct GroupService<R: GroupRepository, G: LogManager> {
    repository: R,
    logger: G,
}

impl<R: GroupRepository, G: LogManager> GroupService<R, G> {
    pub fn new(repository: R, logger: G) -> Self {
        Self { repository, logger }
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, DomainError> {
        Ok(self.repository.find_all_groups().await?)
    }

    pub async fn list_user_groups(&self, user_id: i64) -> Result<Vec<GroupSummary>, DomainError> {
        Ok(self.repository.find_user_groups(user_id).await?)
    }

    pub async fn get_group_details(&self, group_id: i64) -> Result<GroupDetails, DomainError> {
        let group = self
            .repository
            .get_group(group_id)
            .await?
            .ok_or(DomainError::GroupNotFound)?;

        let images = self.repository.find_group_images(group.id).await?;
        let organizer = self.repository.find_organizer(group.organizer_id).await?;
        let venues = self.repository.find_group_venues(group.id).await?;

        Ok(GroupDetails {
            group,
            images,
            organizer,
            venues,
        })
    }

    /// Creates the group, its organizer membership and the optional preview
    /// image in one transaction.
    pub async fn create_group(
        &self,
        organizer_id: i64,
        group: NewGroup,
        preview_image: Option<String>,
    ) -> Result<CreateGroupResponse, DomainError> {
        let mut tx = self.repository.begin().await?;

        let group_id = tx.create_group(organizer_id, &group).await?;
        let membership = tx
            .add_member(group_id, organizer_id, MemberRole::Organizer)
            .await?;

        if let Some(url) = preview_image {
            tx.attach_group_image(group_id, &NewImage { url, preview: true })
                .await?;
        }

        let created = tx
            .fetch_group(group_id)
            .await?
            .ok_or(DomainError::InternalError(DatabaseError::RowNotFound))?;

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Group created: group_id={}, organizer_id={}",
                    created.id, organizer_id
                ),
                "group",
            )
            .await;

        Ok(CreateGroupResponse {
            group: created,
            membership,
        })
    }

    pub async fn update_group(&self, group_id: i64, group: NewGroup) -> Result<Group, DomainError> {
        let mut tx = self.repository.begin().await?;

        if !tx.update_group(group_id, &group).await? {
            self.repository.rollback(tx).await?;
            return Err(DomainError::GroupNotFound);
        }

        let updated = tx
            .fetch_group(group_id)
            .await?
            .ok_or(DomainError::GroupNotFound)?;

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(format!("Group updated: group_id={}", group_id), "group")
            .await;

        Ok(updated)
    }

    pub async fn delete_group(&self, group_id: i64, user_id: i64) -> Result<(), DomainError> {
        let mut tx = self.repository.begin().await?;

        if !tx.delete_group(group_id).await? {
            self.repository.rollback(tx).await?;
            return Err(DomainError::GroupNotFound);
        }

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!("Group deleted: group_id={}, by user_id={}", group_id, user_id),
                "group",
            )
            .await;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: Option<String>,
    pub about: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<String>,
    pub private: Option<bool>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub preview_image: Option<String>,
}

impl GroupRequest {
    pub fn validate(&self) -> Result<NewGroup, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = self.name.as_deref().unwrap_or_default().trim().to_string();
        errors.check(!name.is_empty(), "name", "Name is required");
        errors.check(
            name.chars().count() <= 60,
            "name",
            "Name must be 60 characters or less",
        );

        let about = self.about.as_deref().unwrap_or_default().trim().to_string();
        errors.check(
            (50..=255).contains(&about.chars().count()),
            "about",
            "About must be 50 characters or more",
        );

        let group_type = self.group_type.as_deref().and_then(MeetingType::parse);
        errors.check(
            group_type.is_some(),
            "type",
            "Type must be 'Online' or 'In person'",
        );

        errors.check(self.private.is_some(), "private", "Private must be a boolean");

        let city = self.city.as_deref().unwrap_or_default().trim().to_string();
        errors.check(!city.is_empty(), "city", "City is required");

        let state = self.state.as_deref().unwrap_or_default().trim().to_string();
        errors.check(!state.is_empty(), "state", "State is required");

        errors.into_result()?;

        Ok(NewGroup {
            name,
            about,
            group_type: group_type.unwrap_or(MeetingType::Online),
            private: self.private.unwrap_or(false),
            city,
            state,
        })
    }

    pub fn preview_image(&self) -> Option<String> {
        self.preview_image
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupsResponse {
    #[serde(rename = "Groups")]
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateGroupResponse {
    #[serde(flatten)]
    pub group: Group,
    #[serde(rename = "Membership")]
    pub membership: GroupMember,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Groups = GroupService<Postgre, TextLogManager>;

pub fn group_routes(group_service: Groups, access: AccessService<Postgre>) -> OpenApiRouter<Postgre> {
    let public = OpenApiRouter::new()
        .routes(routes!(list_groups_handler))
        .routes(routes!(get_group_handler));

    let authenticated = OpenApiRouter::new()
        .routes(routes!(create_group_handler))
        .routes(routes!(current_groups_handler))
        .route_layer(from_fn(require_auth));

    let organizer = OpenApiRouter::new()
        .routes(routes!(update_group_handler, delete_group_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ORGANIZER, Target::Group),
            access_guard,
        ));

    public
        .merge(authenticated)
        .merge(organizer)
        .with_state(group_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    get,
    tag = "group",
    path = "/groups",
    responses(
        (status = 200, description = "All groups", body = GroupsResponse),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
async fn list_groups_handler(State(service): State<Groups>) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = service.list_groups().await?;
    Ok(Json(GroupsResponse { groups }))
}

#[utoipa::path(
    get,
    tag = "group",
    path = "/groups/current",
    responses(
        (status = 200, description = "Groups the user organizes or joined", body = GroupsResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
    )
)]
async fn current_groups_handler(
    State(service): State<Groups>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = service.list_user_groups(user.id).await?;
    Ok(Json(GroupsResponse { groups }))
}

#[utoipa::path(
    get,
    tag = "group",
    path = "/groups/{groupId}",
    params(("groupId", Path, description = "Group to show")),
    responses(
        (status = 200, description = "Group with images, organizer and venues", body = GroupDetails),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn get_group_handler(
    State(service): State<Groups>,
    Path(group_id): Path<i64>,
) -> Result<Json<GroupDetails>, ApiError> {
    let details = service.get_group_details(group_id).await?;
    Ok(Json(details))
}

#[utoipa::path(
    post,
    tag = "group",
    path = "/groups",
    request_body = GroupRequest,
    responses(
        (status = 201, description = "Group created with its organizer membership", body = CreateGroupResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
    )
)]
async fn create_group_handler(
    State(service): State<Groups>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<GroupRequest>,
) -> Result<(StatusCode, Json<CreateGroupResponse>), ApiError> {
    let group = payload.validate().map_err(DomainError::Validation)?;
    let created = service
        .create_group(user.id, group, payload.preview_image())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    tag = "group",
    path = "/groups/{groupId}",
    params(("groupId", Path, description = "Group to update")),
    request_body = GroupRequest,
    responses(
        (status = 200, description = "Group updated", body = Group),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not the organizer", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn update_group_handler(
    State(service): State<Groups>,
    Path(group_id): Path<i64>,
    AppJson(payload): AppJson<GroupRequest>,
) -> Result<Json<Group>, ApiError> {
    let group = payload.validate().map_err(DomainError::Validation)?;
    let updated = service.update_group(group_id, group).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    tag = "group",
    path = "/groups/{groupId}",
    params(("groupId", Path, description = "Group to delete")),
    responses(
        (status = 200, description = "Group and everything it owns deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not the organizer", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn delete_group_handler(
    State(service): State<Groups>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    service.delete_group(group_id, user.id).await?;
    Ok(Json(MessageResponse::deleted()))
}
