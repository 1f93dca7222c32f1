// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::access::{AccessContext, AccessService, Target};
use crate::config::AttendancePolicy;
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::event::{EVENT_COLUMNS, Event};
use crate::managers::{LogManager, TextLogManager};
use crate::membership::GroupMember;
use crate::middleware::{AuthUser, RouteGuard, access_guard};
use crate::model::{
    ACTIVE_MEMBER, AttendanceStatus, MemberRole, MessageResponse, ORGANIZER_OR_CO_HOST,
};

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::middleware::from_fn_with_state;
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMember {
    pub id: i64,
    pub event_id: i64,
    pub group_member_id: i64,
    pub status: AttendanceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttendeeRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceState {
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "Attendance")]
    pub attendance: AttendanceState,
}

impl From<AttendeeRow> for AttendeeView {
    fn from(row: AttendeeRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            attendance: AttendanceState { status: row.status },
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

    #[error("Event couldn't be found")]
    EventNotFound,

    #[error("{0}")]
    AttendanceNotFound(&'static str),

    #[error("Attendance has already been requested")]
    AlreadyRequested,

    #[error("User is already an attendee of the event")]
    AlreadyAttending,

    #[error("Event is at full capacity")]
    AtCapacity,

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::EventNotFound => {
                ApiError::NotFound("Event couldn't be found".to_string())
            }
            DomainError::AttendanceNotFound(msg) => ApiError::NotFound(msg.to_string()),
            DomainError::AlreadyRequested => {
                ApiError::bad_request("Attendance has already been requested")
            }
            DomainError::AlreadyAttending => {
                ApiError::bad_request("User is already an attendee of the event")
            }
            DomainError::AtCapacity => ApiError::bad_request("Event is at full capacity"),
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

pub trait AttendanceTransaction: Send + Sync {
    /// Locks the event row; every seat count change goes through this lock.
    fn lock_event(
        &mut self,
        event_id: i64,
    ) -> impl Future<Output = Result<Option<Event>, DatabaseError>> + Send;

    fn find_membership(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<GroupMember>, DatabaseError>> + Send;

    fn find_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
    ) -> impl Future<Output = Result<Option<EventMember>, DatabaseError>> + Send;

    fn insert_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
        status: AttendanceStatus,
    ) -> impl Future<Output = Result<EventMember, DatabaseError>> + Send;

    fn update_attendance(
        &mut self,
        attendance_id: i64,
        status: AttendanceStatus,
    ) -> impl Future<Output = Result<EventMember, DatabaseError>> + Send;

    fn delete_attendance(
        &mut self,
        attendance_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    fn adjust_seats(
        &mut self,
        event_id: i64,
        delta: i32,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;
}

pub trait AttendanceRepository: Send + Sync + Clone {
    type Transaction: AttendanceTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn event_group_id(
        &self,
        event_id: i64,
    ) -> impl Future<Output = Result<Option<i64>, DatabaseError>> + Send;

    fn find_viewer_role(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<MemberRole>, DatabaseError>> + Send;

    fn find_attendees(
        &self,
        event_id: i64,
        include_pending: bool,
    ) -> impl Future<Output = Result<Vec<AttendeeRow>, DatabaseError>> + Send;

    fn find_user_attendance(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<EventMember>, DatabaseError>> + Send;
}

pub struct PgAttendanceTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl AttendanceTransaction for PgAttendanceTransaction {
    async fn lock_event(&mut self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events e WHERE e.id = $1 FOR UPDATE",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(event)
    }

    async fn find_membership(
        &mut self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, DatabaseError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"SELECT id, user_id, group_id, role, created_at, updated_at
               FROM group_members
               WHERE group_id = $1 AND user_id = $2"#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(member)
    }

    async fn find_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
    ) -> Result<Option<EventMember>, DatabaseError> {
        let attendance = sqlx::query_as::<_, EventMember>(
            r#"SELECT id, event_id, group_member_id, status, created_at, updated_at
               FROM event_members
               WHERE event_id = $1 AND group_member_id = $2"#,
        )
        .bind(event_id)
        .bind(group_member_id)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(attendance)
    }

    async fn insert_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
        status: AttendanceStatus,
    ) -> Result<EventMember, DatabaseError> {
        let attendance = sqlx::query_as::<_, EventMember>(
            r#"INSERT INTO event_members (event_id, group_member_id, status)
               VALUES ($1, $2, $3)
               RETURNING id, event_id, group_member_id, status, created_at, updated_at"#,
        )
        .bind(event_id)
        .bind(group_member_id)
        .bind(status)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(attendance)
    }

    async fn update_attendance(
        &mut self,
        attendance_id: i64,
        status: AttendanceStatus,
    ) -> Result<EventMember, DatabaseError> {
        let attendance = sqlx::query_as::<_, EventMember>(
            r#"UPDATE event_members
               SET status = $2, updated_at = now()
               WHERE id = $1
               RETURNING id, event_id, group_member_id, status, created_at, updated_at"#,
        )
        .bind(attendance_id)
        .bind(status)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(attendance)
    }

    async fn delete_attendance(&mut self, attendance_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM event_members WHERE id = $1")
            .bind(attendance_id)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_seats(&mut self, event_id: i64, delta: i32) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"UPDATE events
               SET num_attending = num_attending + $2, updated_at = now()
               WHERE id = $1"#,
        )
        .bind(event_id)
        .bind(delta)
        .execute(&mut *self.transaction)
        .await?;

        Ok(())
    }
}

impl AttendanceRepository for Postgre {
    type Transaction = PgAttendanceTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgAttendanceTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn event_group_id(&self, event_id: i64) -> Result<Option<i64>, DatabaseError> {
        let group_id = sqlx::query_scalar::<_, i64>("SELECT group_id FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(group_id)
    }

    async fn find_viewer_role(
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

    async fn find_attendees(
        &self,
        event_id: i64,
        include_pending: bool,
    ) -> Result<Vec<AttendeeRow>, DatabaseError> {
        let attendees = sqlx::query_as::<_, AttendeeRow>(
            r#"SELECT u.id, u.first_name, u.last_name, em.status
               FROM event_members em
               INNER JOIN group_members gm ON gm.id = em.group_member_id
               INNER JOIN users u ON u.id = gm.user_id
               WHERE em.event_id = $1 AND ($2 OR em.status <> 'pending')
               ORDER BY em.id"#,
        )
        .bind(event_id)
        .bind(include_pending)
        .fetch_all(&self.pool)
        .await?;

        Ok(attendees)
    }

    async fn find_user_attendance(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<Option<EventMember>, DatabaseError> {
        let attendance = sqlx::query_as::<_, EventMember>(
            r#"SELECT em.id, em.event_id, em.group_member_id, em.status, em.created_at, em.updated_at
               FROM event_members em
               INNER JOIN group_members gm ON gm.id = em.group_member_id
               WHERE em.event_id = $1 AND gm.user_id = $2"#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attendance)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

const NO_ATTENDANCE: &str = "Attendance does not exist for this User";

#[derive(Clone)]
pub struct AttendanceService<R: AttendanceRepository, G: LogManager> {
    repository: R,
    policy: AttendancePolicy,
    logger: G,
}

impl<R: AttendanceRepository, G: LogManager> AttendanceService<R, G> {
    pub fn new(repository: R, policy: AttendancePolicy, logger: G) -> Self {
        Self {
            repository,
            policy,
            logger,
        }
    }

    /// Pending attendees are only listed for organizer and co-host viewers.
    pub async fn list_attendees(
        &self,
        event_id: i64,
        viewer_id: Option<i64>,
    ) -> Result<Vec<AttendeeView>, DomainError> {
        let group_id = self
            .repository
            .event_group_id(event_id)
            .await?
            .ok_or(DomainError::EventNotFound)?;

        let viewer_role = match viewer_id {
            Some(user_id) => self.repository.find_viewer_role(group_id, user_id).await?,
            None => None,
        };
        let include_pending = viewer_role.is_some_and(|role| role.is_admin());

        let attendees = self.repository.find_attendees(event_id, include_pending).await?;
        Ok(attendees.into_iter().map(AttendeeView::from).collect())
    }

    /// Takes a seat when one is free; otherwise waitlists or rejects per policy.
    pub async fn request_attendance(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<EventMember, DomainError> {
        let mut tx = self.repository.begin().await?;

        let Some(event) = tx.lock_event(event_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::EventNotFound);
        };

        let membership = tx
            .find_membership(event.group_id, user_id)
            .await?
            .filter(|m| m.role != MemberRole::Pending);
        let Some(membership) = membership else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::PermissionDenied(
                "Only members of the group may attend its events",
            ));
        };

        if let Some(existing) = tx.find_attendance(event.id, membership.id).await? {
            self.repository.rollback(tx).await?;
            return Err(match existing.status {
                AttendanceStatus::Pending => DomainError::AlreadyRequested,
                _ => DomainError::AlreadyAttending,
            });
        }

        let status = match (event.has_free_seat(), self.policy) {
            (true, _) => AttendanceStatus::Pending,
            (false, AttendancePolicy::Waitlist) => AttendanceStatus::Waitlist,
            (false, AttendancePolicy::Reject) => {
                self.repository.rollback(tx).await?;
                return Err(DomainError::AtCapacity);
            }
        };

        let attendance = tx.insert_attendance(event.id, membership.id, status).await?;
        if status.holds_seat() {
            tx.adjust_seats(event.id, 1).await?;
        }
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Attendance requested: event_id={}, user_id={}, status={}",
                    event.id, user_id, status
                ),
                "attendance",
            )
            .await;

        Ok(attendance)
    }

    /// Moves an attendee between statuses, keeping the seat count in step.
    pub async fn change_status(
        &self,
        event_id: i64,
        acting_user_id: i64,
        change: AttendanceChange,
    ) -> Result<EventMember, DomainError> {
        let mut tx = self.repository.begin().await?;

        let Some(event) = tx.lock_event(event_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::EventNotFound);
        };

        let attendance = match tx.find_membership(event.group_id, change.user_id).await? {
            Some(membership) => tx.find_attendance(event.id, membership.id).await?,
            None => None,
        };
        let Some(attendance) = attendance else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::AttendanceNotFound(
                "Attendance between the user and the event does not exist",
            ));
        };

        let held = attendance.status.holds_seat();
        let holds = change.status.holds_seat();
        if !held && holds && !event.has_free_seat() {
            self.repository.rollback(tx).await?;
            return Err(DomainError::AtCapacity);
        }

        let updated = tx.update_attendance(attendance.id, change.status).await?;
        let delta = i32::from(holds) - i32::from(held);
        if delta != 0 {
            tx.adjust_seats(event.id, delta).await?;
        }
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Attendance changed: event_id={}, user_id={}, status={}, by user_id={}",
                    event.id, change.user_id, updated.status, acting_user_id
                ),
                "attendance",
            )
            .await;

        Ok(updated)
    }

    pub async fn get_user_attendance(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<EventMember, DomainError> {
        self.repository
            .find_user_attendance(event_id, user_id)
            .await?
            .ok_or(DomainError::AttendanceNotFound(NO_ATTENDANCE))
    }

    /// Attendees may withdraw themselves; organizers and co-hosts may remove anyone.
    pub async fn withdraw(
        &self,
        event_id: i64,
        acting_user_id: i64,
        acting_role: Option<MemberRole>,
        user_id: i64,
    ) -> Result<(), DomainError> {
        let is_admin = acting_role.is_some_and(|role| role.is_admin());
        if acting_user_id != user_id && !is_admin {
            return Err(DomainError::PermissionDenied(
                "Only the User or organizer may delete an Attendance",
            ));
        }

        let mut tx = self.repository.begin().await?;

        let Some(event) = tx.lock_event(event_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::EventNotFound);
        };

        let attendance = match tx.find_membership(event.group_id, user_id).await? {
            Some(membership) => tx.find_attendance(event.id, membership.id).await?,
            None => None,
        };
        let Some(attendance) = attendance else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::AttendanceNotFound(NO_ATTENDANCE));
        };

        tx.delete_attendance(attendance.id).await?;
        if attendance.status.holds_seat() && event.num_attending > 0 {
            tx.adjust_seats(event.id, -1).await?;
        }
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!(
                    "Attendance deleted: event_id={}, user_id={}, by user_id={}",
                    event.id, user_id, acting_user_id
                ),
                "attendance",
            )
            .await;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceChange {
    pub user_id: i64,
    pub status: AttendanceStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdateRequest {
    pub user_id: Option<i64>,
    pub status: Option<String>,
}

impl AttendanceUpdateRequest {
    pub fn validate(&self) -> Result<AttendanceChange, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let status = match self.status.as_deref() {
            Some("pending") => {
                errors.add("status", "Cannot change an attendance status to pending");
                None
            }
            Some("attending") => Some(AttendanceStatus::Attending),
            Some("waitlist") => Some(AttendanceStatus::Waitlist),
            _ => {
                errors.add("status", "Status must be 'attending' or 'waitlist'");
                None
            }
        };

        errors.check(self.user_id.is_some(), "userId", "User couldn't be found");

        errors.into_result()?;

        match (self.user_id, status) {
            (Some(user_id), Some(status)) => Ok(AttendanceChange { user_id, status }),
            _ => Err(ValidationErrors::new()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub status: AttendanceStatus,
}

impl AttendanceResponse {
    fn new(attendance: EventMember, user_id: i64) -> Self {
        Self {
            id: attendance.id,
            event_id: attendance.event_id,
            user_id,
            status: attendance.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendeesResponse {
    #[serde(rename = "Attendees")]
    pub attendees: Vec<AttendeeView>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Attendances = AttendanceService<Postgre, TextLogManager>;

pub fn attendance_routes(
    attendance_service: Attendances,
    access: AccessService<Postgre>,
) -> OpenApiRouter<Postgre> {
    let public = OpenApiRouter::new().routes(routes!(list_attendees_handler));

    let members = OpenApiRouter::new()
        .routes(routes!(request_attendance_handler))
        .routes(routes!(withdraw_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access.clone(), ACTIVE_MEMBER, Target::Group),
            access_guard,
        ));

    let admins = OpenApiRouter::new()
        .routes(routes!(change_status_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access.clone(), ORGANIZER_OR_CO_HOST, Target::Group),
            access_guard,
        ));

    let attendees = OpenApiRouter::new()
        .routes(routes!(get_attendance_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ACTIVE_MEMBER, Target::Event),
            access_guard,
        ));

    public
        .merge(members)
        .merge(admins)
        .merge(attendees)
        .with_state(attendance_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    get,
    tag = "attendance",
    path = "/events/{eventId}/attendees",
    params(("eventId", Path, description = "Event whose attendees are listed")),
    responses(
        (status = 200, description = "Attendees of the event", body = AttendeesResponse),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn list_attendees_handler(
    State(service): State<Attendances>,
    Path(event_id): Path<i64>,
    viewer: Option<Extension<AuthUser>>,
) -> Result<Json<AttendeesResponse>, ApiError> {
    let attendees = service
        .list_attendees(event_id, viewer.map(|Extension(user)| user.id))
        .await?;
    Ok(Json(AttendeesResponse { attendees }))
}

#[utoipa::path(
    post,
    tag = "attendance",
    path = "/events/{eventId}/attendance",
    params(("eventId", Path, description = "Event to attend")),
    responses(
        (status = 200, description = "Attendance requested or waitlisted", body = AttendanceResponse),
        (status = 400, description = "Already requested, already attending or event full", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not a member of the group", body = ErrorBody),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn request_attendance_handler(
    State(service): State<Attendances>,
    Extension(context): Extension<AccessContext>,
    Path(event_id): Path<i64>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let attendance = service.request_attendance(event_id, context.user_id).await?;
    Ok(Json(AttendanceResponse::new(attendance, context.user_id)))
}

#[utoipa::path(
    put,
    tag = "attendance",
    path = "/events/{eventId}/attendance",
    params(("eventId", Path, description = "Event of the attendance")),
    request_body = AttendanceUpdateRequest,
    responses(
        (status = 200, description = "Attendance status changed", body = AttendanceResponse),
        (status = 400, description = "Invalid status or no free seat", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Event or attendance not found", body = ErrorBody),
    )
)]
async fn change_status_handler(
    State(service): State<Attendances>,
    Extension(context): Extension<AccessContext>,
    Path(event_id): Path<i64>,
    AppJson(payload): AppJson<AttendanceUpdateRequest>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let change = payload.validate().map_err(DomainError::Validation)?;
    let updated = service
        .change_status(event_id, context.user_id, change)
        .await?;
    Ok(Json(AttendanceResponse::new(updated, change.user_id)))
}

#[utoipa::path(
    get,
    tag = "attendance",
    path = "/events/{eventId}/attendance/{userId}",
    params(
        ("eventId", Path, description = "Event of the attendance"),
        ("userId", Path, description = "Fellow attendee"),
    ),
    responses(
        (status = 200, description = "The user's attendance", body = AttendanceResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not attending the event", body = ErrorBody),
        (status = 404, description = "Event, user or attendance not found", body = ErrorBody),
    )
)]
async fn get_attendance_handler(
    State(service): State<Attendances>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let attendance = service.get_user_attendance(event_id, user_id).await?;
    Ok(Json(AttendanceResponse::new(attendance, user_id)))
}

#[utoipa::path(
    delete,
    tag = "attendance",
    path = "/events/{eventId}/attendance/{userId}",
    params(
        ("eventId", Path, description = "Event of the attendance"),
        ("userId", Path, description = "Attendee to remove"),
    ),
    responses(
        (status = 200, description = "Attendance deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not allowed to remove this attendee", body = ErrorBody),
        (status = 404, description = "Event, user or attendance not found", body = ErrorBody),
    )
)]
async fn withdraw_handler(
    State(service): State<Attendances>,
    Extension(context): Extension<AccessContext>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let acting_role = context
        .event()
        .and_then(|event| context.role_in(event.group_id));
    service
        .withdraw(event_id, context.user_id, acting_role, user_id)
        .await?;
    Ok(Json(MessageResponse::new(
        "Successfully deleted attendance from event",
    )))
}
