// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::access::{AccessContext, AccessService, Target};
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::managers::{LogManager, TextLogManager};
use crate::middleware::{AuthUser, RouteGuard, access_guard, require_auth};
use crate::model::{ANY_MEMBER, MemberRole, MessageResponse, ORGANIZER_OR_CO_HOST};

use axum::Json;
use axum::http::StatusCode;
use axum::extract::{Extension, Path, State};
use axum::middleware::{from_fn, from_fn_with_state};
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub role: MemberRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MembershipStatus {
    pub status: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "Membership")]
    pub membership: MembershipStatus,
}

impl From<MemberRow> for MemberView {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            membership: MembershipStatus { status: row.role },
        }
    }
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

    #[error("{0}")]
    MembershipNotFound(&'static str),

    #[error("Membership has already been requested")]
    AlreadyRequested,

    #[error("User is already a member of the group")]
    AlreadyMember,

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

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
            DomainError::MembershipNotFound(msg) => ApiError::NotFound(msg.to_string()),
            DomainError::AlreadyRequested => {
                ApiError::bad_request("Membership has already been requested")
            }
            DomainError::AlreadyMember => {
                ApiError::bad_request("User is already a member of the group")
            }
            DomainError::PermissionDenied(msg) => ApiError::Forbidden(msg.to_string()),
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

pub trait MembershipTransaction: Send + Sync {
    fn group_exists(
        &mut self,
        group_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    fn user_exists(
        &mut self,
        user_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Locks, in id order, the events where the user holds an attendance in
    /// the group. Taken before the membership row so removal locks events
    /// first, like attendance requests do.
    fn lock_seated_events(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<i64>, DatabaseError>> + Send;

    /// Locks the membership row.
    fn find_member(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<GroupMember>, DatabaseError>> + Send;

    fn insert_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> impl Future<Output = Result<GroupMember, DatabaseError>> + Send;

    fn update_role(
        &mut self,
        member_id: i64,
        role: MemberRole,
    ) -> impl Future<Output = Result<GroupMember, DatabaseError>> + Send;

    /// Gives back the seats held by the member's attendances.
    fn release_seats(
        &mut self,
        member_id: i64,
    ) -> impl Future<Output = Result<u64, DatabaseError>> + Send;

    fn delete_member(
        &mut self,
        member_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

pub trait MembershipRepository: Send + Sync + Clone {
    type Transaction: MembershipTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn group_exists(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    fn find_membership_role(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<MemberRole>, DatabaseError>> + Send;

    fn find_members(
        &self,
        group_id: i64,
        include_pending: bool,
    ) -> impl Future<Output = Result<Vec<MemberRow>, DatabaseError>> + Send;
}

pub struct PgMembershipTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl MembershipTransaction for PgMembershipTransaction {
    async fn group_exists(&mut self, group_id: i64) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(&mut *self.transaction)
            .await?;

        Ok(exists)
    }

    async fn user_exists(&mut self, user_id: i64) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *self.transaction)
            .await?;

        Ok(exists)
    }

    async fn lock_seated_events(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Vec<i64>, DatabaseError> {
        let events = sqlx::query_scalar::<_, i64>(
            r#"SELECT e.id
               FROM events e
               INNER JOIN event_members em ON em.event_id = e.id
               INNER JOIN group_members gm ON gm.id = em.group_member_id
               WHERE gm.group_id = $1 AND gm.user_id = $2
               ORDER BY e.id
               FOR UPDATE OF e"#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_all(&mut *self.transaction)
        .await?;

        Ok(events)
    }

    async fn find_member(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, DatabaseError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"SELECT id, user_id, group_id, role, created_at, updated_at
               FROM group_members
               WHERE group_id = $1 AND user_id = $2
               FOR UPDATE"#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(member)
    }

    async fn insert_member(
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

    async fn update_role(&mut self, member_id: i64, role: MemberRole) -> Result<GroupMember, DatabaseError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"UPDATE group_members
               SET role = $2, updated_at = now()
               WHERE id = $1
               RETURNING id, user_id, group_id, role, created_at, updated_at"#,
        )
        .bind(member_id)
        .bind(role)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(member)
    }

    async fn release_seats(&mut self, member_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"UPDATE events e
               SET num_attending = GREATEST(e.num_attending - 1, 0), updated_at = now()
               FROM event_members em
               WHERE em.event_id = e.id
                 AND em.group_member_id = $1
                 AND em.status IN ('pending', 'attending')"#,
        )
        .bind(member_id)
        .execute(&mut *self.transaction)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_member(&mut self, member_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM group_members WHERE id = $1")
            .bind(member_id)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl MembershipRepository for Postgre {
    type Transaction = PgMembershipTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgMembershipTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn group_exists(&self, group_id: i64) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn find_membership_role(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<MemberRole>, DatabaseError> {
        let role = sqlx::query_scalar::<_, MemberRole>(
            "SELECT role FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn find_members(
        &self,
        group_id: i64,
        include_pending: bool,
    ) -> Result<Vec<MemberRow>, DatabaseError> {
        let members = sqlx::query_as::<_, MemberRow>(
            r#"SELECT u.id, u.first_name, u.last_name, gm.role
               FROM group_members gm
               INNER JOIN users u ON u.id = gm.user_id
               WHERE gm.group_id = $1 AND ($2 OR gm.role <> 'pending')
               ORDER BY gm.id"#,
        )
        .bind(group_id)
        .bind(include_pending)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct MembershipService<R: MembershipRepository, G: LogManager> {
    repository: R,
    logger: G,
}

impl<R: MembershipRepository, G: LogManager> MembershipService<R, G> {
    pub fn new(repository: R, logger: G) -> Self {
        Self { repository, logger }
    }

    /// Pending members are only listed for organizer and co-host viewers.
    pub async fn list_members(
        &self,
        group_id: i64,
        viewer_id: Option<i64>,
    ) -> Result<Vec<MemberView>, DomainError> {
        if !self.repository.group_exists(group_id).await? {
            return Err(DomainError::GroupNotFound);
        }

        let viewer_role = match viewer_id {
            Some(user_id) => self.repository.find_membership_role(group_id, user_id).await?,
            None => None,
        };
        let include_pending = viewer_role.is_some_and(|role| role.is_admin());

        let members = self.repository.find_members(group_id, include_pending).await?;
        Ok(members.into_iter().map(MemberView::from).collect())
    }

    pub async fn request_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<GroupMember, DomainError> {
        let mut tx = self.repository.begin().await?;

        if !tx.group_exists(group_id).await? {
            self.repository.rollback(tx).await?;
            return Err(DomainError::GroupNotFound);
        }

        if let Some(existing) = tx.find_member(group_id, user_id).await? {
            self.repository.rollback(tx).await?;
            return Err(match existing.role {
                MemberRole::Pending => DomainError::AlreadyRequested,
                _ => DomainError::AlreadyMember,
            });
        }

        let member = match tx.insert_member(group_id, user_id, MemberRole::Pending).await {
            Ok(member) => member,
            Err(DatabaseError::UniqueConstraintViolation { .. }) => {
                self.repository.rollback(tx).await?;
                return Err(DomainError::AlreadyRequested);
            }
            Err(e) => return Err(e.into()),
        };

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Membership requested: group_id={}, user_id={}",
                    group_id, user_id
                ),
                "membership",
            )
            .await;

        Ok(member)
    }

    /// `acting_role` is the caller's role in the group, as established by the guard.
    pub async fn change_status(
        &self,
        group_id: i64,
        acting_user_id: i64,
        acting_role: MemberRole,
        change: StatusChange,
    ) -> Result<GroupMember, DomainError> {
        if change.member_id == acting_user_id {
            let mut errors = ValidationErrors::new();
            errors.add("status", "Cannot update your own status");
            return Err(DomainError::Validation(errors));
        }

        let mut tx = self.repository.begin().await?;

        if !tx.user_exists(change.member_id).await? {
            self.repository.rollback(tx).await?;
            let mut errors = ValidationErrors::new();
            errors.add("memberId", "User couldn't be found");
            return Err(DomainError::Validation(errors));
        }

        let Some(member) = tx.find_member(group_id, change.member_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::MembershipNotFound(
                "Membership between the user and the group does not exist",
            ));
        };

        let denial = if member.role == MemberRole::Organizer {
            Some("The organizer's membership cannot be changed")
        } else if change.status == MemberRole::CoHost && acting_role != MemberRole::Organizer {
            Some("Only the organizer can make somebody a co-host")
        } else if member.role == MemberRole::CoHost && acting_role != MemberRole::Organizer {
            Some("Only the organizer can change a co-host's membership")
        } else {
            None
        };
        if let Some(reason) = denial {
            self.repository.rollback(tx).await?;
            return Err(DomainError::PermissionDenied(reason));
        }

        let updated = tx.update_role(member.id, change.status).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Membership changed: group_id={}, user_id={}, role={}, by user_id={}",
                    group_id, updated.user_id, updated.role, acting_user_id
                ),
                "membership",
            )
            .await;

        Ok(updated)
    }

    /// Members may withdraw themselves; the organizer may remove anyone else.
    pub async fn remove_membership(
        &self,
        group_id: i64,
        acting_user_id: i64,
        acting_role: Option<MemberRole>,
        user_id: i64,
    ) -> Result<(), DomainError> {
        let is_self = acting_user_id == user_id;
        if !is_self && acting_role != Some(MemberRole::Organizer) {
            return Err(DomainError::PermissionDenied(
                "Only the User or organizer may delete a Membership",
            ));
        }

        let mut tx = self.repository.begin().await?;

        tx.lock_seated_events(group_id, user_id).await?;
        let Some(member) = tx.find_member(group_id, user_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::MembershipNotFound(
                "Membership does not exist for this User",
            ));
        };

        if member.role == MemberRole::Organizer {
            self.repository.rollback(tx).await?;
            return Err(DomainError::PermissionDenied(
                "The organizer's membership cannot be deleted",
            ));
        }

        tx.release_seats(member.id).await?;
        tx.delete_member(member.id).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Membership deleted: group_id={}, user_id={}, by user_id={}",
                    group_id, user_id, acting_user_id
                ),
                "membership",
            )
            .await;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusChange {
    pub member_id: i64,
    pub status: MemberRole,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUpdateRequest {
    pub member_id: Option<i64>,
    pub status: Option<String>,
}

impl MembershipUpdateRequest {
    pub fn validate(&self) -> Result<StatusChange, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let status = match self.status.as_deref().map(str::parse::<MemberRole>) {
            Some(Ok(MemberRole::Pending)) => {
                errors.add("status", "Cannot change a membership status to pending");
                None
            }
            Some(Ok(MemberRole::Organizer)) => {
                errors.add("status", "Cannot change a membership status to organizer");
                None
            }
            Some(Ok(role)) => Some(role),
            _ => {
                errors.add("status", "Status must be 'member' or 'co-host'");
                None
            }
        };

        errors.check(self.member_id.is_some(), "memberId", "User couldn't be found");

        errors.into_result()?;

        match (self.member_id, status) {
            (Some(member_id), Some(status)) => Ok(StatusChange { member_id, status }),
            _ => Err(ValidationErrors::new()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub member_id: i64,
    pub status: MemberRole,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipUpdateResponse {
    pub id: i64,
    pub group_id: i64,
    pub member_id: i64,
    pub status: MemberRole,
}

impl From<GroupMember> for MembershipUpdateResponse {
    fn from(member: GroupMember) -> Self {
        Self {
            id: member.id,
            group_id: member.group_id,
            member_id: member.user_id,
            status: member.role,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersResponse {
    #[serde(rename = "Members")]
    pub members: Vec<MemberView>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Memberships = MembershipService<Postgre, TextLogManager>;

pub fn membership_routes(
    membership_service: Memberships,
    access: AccessService<Postgre>,
) -> OpenApiRouter<Postgre> {
    let public = OpenApiRouter::new().routes(routes!(list_members_handler));

    let authenticated = OpenApiRouter::new()
        .routes(routes!(request_membership_handler))
        .route_layer(from_fn(require_auth));

    let admins = OpenApiRouter::new()
        .routes(routes!(change_status_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access.clone(), ORGANIZER_OR_CO_HOST, Target::Group),
            access_guard,
        ));

    let members = OpenApiRouter::new()
        .routes(routes!(delete_membership_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ANY_MEMBER, Target::Group),
            access_guard,
        ));

    public
        .merge(authenticated)
        .merge(admins)
        .merge(members)
        .with_state(membership_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    get,
    tag = "membership",
    path = "/groups/{groupId}/members",
    params(("groupId", Path, description = "Group whose members are listed")),
    responses(
        (status = 200, description = "Members of the group", body = MembersResponse),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn list_members_handler(
    State(service): State<Memberships>,
    Path(group_id): Path<i64>,
    viewer: Option<Extension<AuthUser>>,
) -> Result<Json<MembersResponse>, ApiError> {
    let members = service
        .list_members(group_id, viewer.map(|Extension(user)| user.id))
        .await?;
    Ok(Json(MembersResponse { members }))
}

#[utoipa::path(
    post,
    tag = "membership",
    path = "/groups/{groupId}/membership",
    params(("groupId", Path, description = "Group to join")),
    responses(
        (status = 201, description = "Membership requested", body = MembershipResponse),
        (status = 400, description = "Already requested or already a member", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn request_membership_handler(
    State(service): State<Memberships>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<i64>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let member = service.request_membership(group_id, user.id).await?;
    Ok(membership_requested(&member))
}

fn membership_requested(member: &GroupMember) -> (StatusCode, Json<MembershipResponse>) {
    (
        StatusCode::CREATED,
        Json(MembershipResponse {
            member_id: member.user_id,
            status: member.role,
        }),
    )
}

#[utoipa::path(
    put,
    tag = "membership",
    path = "/groups/{groupId}/membership",
    params(("groupId", Path, description = "Group of the membership")),
    request_body = MembershipUpdateRequest,
    responses(
        (status = 200, description = "Membership status changed", body = MembershipUpdateResponse),
        (status = 400, description = "Invalid status or member", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not allowed to make this change", body = ErrorBody),
        (status = 404, description = "Group or membership not found", body = ErrorBody),
    )
)]
async fn change_status_handler(
    State(service): State<Memberships>,
    Extension(context): Extension<AccessContext>,
    Path(group_id): Path<i64>,
    AppJson(payload): AppJson<MembershipUpdateRequest>,
) -> Result<Json<MembershipUpdateResponse>, ApiError> {
    let change = payload.validate().map_err(DomainError::Validation)?;
    let acting_role = context
        .role_in(group_id)
        .ok_or_else(|| ApiError::Forbidden("Forbidden".to_string()))?;

    let updated = service
        .change_status(group_id, context.user_id, acting_role, change)
        .await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    tag = "membership",
    path = "/groups/{groupId}/membership/{userId}",
    params(
        ("groupId", Path, description = "Group of the membership"),
        ("userId", Path, description = "Member to remove"),
    ),
    responses(
        (status = 200, description = "Membership deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not allowed to remove this member", body = ErrorBody),
        (status = 404, description = "Group, user or membership not found", body = ErrorBody),
    )
)]
async fn delete_membership_handler(
    State(service): State<Memberships>,
    Extension(context): Extension<AccessContext>,
    Path((group_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, ApiError> {
    service
        .remove_membership(group_id, context.user_id, context.role_in(group_id), user_id)
        .await?;
    Ok(Json(MessageResponse::new(
        "Successfully deleted membership from group",
    )))
}
