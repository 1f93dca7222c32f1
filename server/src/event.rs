// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use utoipa::{IntoParams, ToSchema};

use crate::access::{AccessService, Target};
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::image::{Attachment, Image, NewImage, insert_image};
use crate::managers::{LogManager, TextLogManager};
use crate::middleware::{AuthUser, RouteGuard, access_guard};
use crate::model::{MeetingType, MessageResponse, ORGANIZER_OR_CO_HOST};
use crate::venue::Venue;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

/// Select list for `Event` rows; expects the table aliased as `e`.
pub const EVENT_COLUMNS: &str = r#"e.id, e.group_id, e.venue_id, e.name, e.description, e.type,
    e.capacity, e.price, e.num_attending, e.start_date, e.end_date, e.created_at, e.updated_at"#;

const SUMMARY_JOINS: &str = r#"
    (SELECT i.url FROM event_images ei
        INNER JOIN images i ON i.id = ei.image_id
        WHERE ei.event_id = e.id AND i.preview
        ORDER BY i.id DESC LIMIT 1) AS preview_image,
    g.name AS group_name, g.city AS group_city, g.state AS group_state,
    v.city AS venue_city, v.state AS venue_state
    FROM events e
    INNER JOIN groups g ON g.id = e.group_id
    LEFT JOIN venues v ON v.id = e.venue_id"#;

pub const MAX_PAGE_SIZE: i64 = 20;

const LOCAL_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub group_id: i64,
    pub venue_id: Option<i64>,
    pub name: String,
    pub description: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: MeetingType,
    pub capacity: i32,
    pub price: f64,
    pub num_attending: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Event {
    pub fn has_free_seat(&self) -> bool {
        self.num_attending < self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct EventGroup {
    pub id: i64,
    pub name: String,
    pub private: bool,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GroupLabel {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VenueLabel {
    pub id: i64,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub preview_image: Option<String>,
    #[serde(rename = "Group")]
    pub group: GroupLabel,
    #[serde(rename = "Venue")]
    pub venue: Option<VenueLabel>,
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    event: Event,
    preview_image: Option<String>,
    group_name: String,
    group_city: String,
    group_state: String,
    venue_city: Option<String>,
    venue_state: Option<String>,
}

impl From<SummaryRow> for EventSummary {
    fn from(row: SummaryRow) -> Self {
        let venue = match (row.event.venue_id, row.venue_city, row.venue_state) {
            (Some(id), Some(city), Some(state)) => Some(VenueLabel { id, city, state }),
            _ => None,
        };

        Self {
            group: GroupLabel {
                id: row.event.group_id,
                name: row.group_name,
                city: row.group_city,
                state: row.group_state,
            },
            venue,
            preview_image: row.preview_image,
            event: row.event,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventDetails {
    #[serde(flatten)]
    pub event: Event,
    #[serde(rename = "Group")]
    pub group: Option<EventGroup>,
    #[serde(rename = "Venue")]
    pub venue: Option<Venue>,
    #[serde(rename = "EventImages")]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub venue_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub event_type: MeetingType,
    pub capacity: i32,
    pub price: f64,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
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

    #[error("Group couldn't be found")]
    GroupNotFound,

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl DomainError {
    fn field(field: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        DomainError::Validation(errors)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::EventNotFound => {
                ApiError::NotFound("Event couldn't be found".to_string())
            }
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

pub trait EventTransaction: Send + Sync {
    /// Group owning the venue, if the venue exists.
    fn venue_group(
        &mut self,
        venue_id: i64,
    ) -> impl Future<Output = Result<Option<i64>, DatabaseError>> + Send;

    fn insert_event(
        &mut self,
        group_id: i64,
        event: &NewEvent,
    ) -> impl Future<Output = Result<Event, DatabaseError>> + Send;

    fn attach_event_image(
        &mut self,
        event_id: i64,
        image: &NewImage,
    ) -> impl Future<Output = Result<Image, DatabaseError>> + Send;

    /// Locks the event row for the rest of the transaction.
    fn lock_event(
        &mut self,
        event_id: i64,
    ) -> impl Future<Output = Result<Option<Event>, DatabaseError>> + Send;

    fn update_event(
        &mut self,
        event_id: i64,
        event: &NewEvent,
    ) -> impl Future<Output = Result<Event, DatabaseError>> + Send;

    /// Removes the event and its images.
    fn delete_event(
        &mut self,
        event_id: i64,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

pub trait EventRepository: Send + Sync + Clone {
    type Transaction: EventTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn find_events(
        &self,
        page: Page,
    ) -> impl Future<Output = Result<Vec<EventSummary>, DatabaseError>> + Send;

    fn find_group_events(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Vec<EventSummary>, DatabaseError>> + Send;

    fn has_group(&self, group_id: i64) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    fn get_event(
        &self,
        event_id: i64,
    ) -> impl Future<Output = Result<Option<Event>, DatabaseError>> + Send;

    fn event_group(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Option<EventGroup>, DatabaseError>> + Send;

    fn event_venue(
        &self,
        venue_id: i64,
    ) -> impl Future<Output = Result<Option<Venue>, DatabaseError>> + Send;

    fn find_event_images(
        &self,
        event_id: i64,
    ) -> impl Future<Output = Result<Vec<Image>, DatabaseError>> + Send;
}

pub struct PgEventTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl EventTransaction for PgEventTransaction {
    async fn venue_group(&mut self, venue_id: i64) -> Result<Option<i64>, DatabaseError> {
        let group_id = sqlx::query_scalar::<_, i64>("SELECT group_id FROM venues WHERE id = $1")
            .bind(venue_id)
            .fetch_optional(&mut *self.transaction)
            .await?;

        Ok(group_id)
    }

    async fn insert_event(&mut self, group_id: i64, event: &NewEvent) -> Result<Event, DatabaseError> {
        let created = sqlx::query_as::<_, Event>(&format!(
            r#"INSERT INTO events AS e
                   (group_id, venue_id, name, description, type, capacity, price, start_date, end_date)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {}"#,
            EVENT_COLUMNS
        ))
        .bind(group_id)
        .bind(event.venue_id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.event_type)
        .bind(event.capacity)
        .bind(event.price)
        .bind(event.start_date)
        .bind(event.end_date)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(created)
    }

    async fn attach_event_image(&mut self, event_id: i64, image: &NewImage) -> Result<Image, DatabaseError> {
        insert_image(&mut self.transaction, Attachment::Event(event_id), image).await
    }

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

    async fn update_event(&mut self, event_id: i64, event: &NewEvent) -> Result<Event, DatabaseError> {
        let updated = sqlx::query_as::<_, Event>(&format!(
            r#"UPDATE events AS e
               SET venue_id = $2, name = $3, description = $4, type = $5, capacity = $6,
                   price = $7, start_date = $8, end_date = $9, updated_at = now()
               WHERE e.id = $1
               RETURNING {}"#,
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .bind(event.venue_id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.event_type)
        .bind(event.capacity)
        .bind(event.price)
        .bind(event.start_date)
        .bind(event.end_date)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(updated)
    }

    async fn delete_event(&mut self, event_id: i64) -> Result<bool, DatabaseError> {
        sqlx::query(
            "DELETE FROM images WHERE id IN (SELECT image_id FROM event_images WHERE event_id = $1)",
        )
        .bind(event_id)
        .execute(&mut *self.transaction)
        .await?;

        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl EventRepository for Postgre {
    type Transaction = PgEventTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgEventTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn find_events(&self, page: Page) -> Result<Vec<EventSummary>, DatabaseError> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {}, {} ORDER BY e.start_date, e.id LIMIT $1 OFFSET $2",
            EVENT_COLUMNS, SUMMARY_JOINS
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EventSummary::from).collect())
    }

    async fn find_group_events(&self, group_id: i64) -> Result<Vec<EventSummary>, DatabaseError> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {}, {} WHERE e.group_id = $1 ORDER BY e.start_date, e.id",
            EVENT_COLUMNS, SUMMARY_JOINS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EventSummary::from).collect())
    }

    async fn has_group(&self, group_id: i64) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events e WHERE e.id = $1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn event_group(&self, group_id: i64) -> Result<Option<EventGroup>, DatabaseError> {
        let group = sqlx::query_as::<_, EventGroup>(
            "SELECT id, name, private, city, state FROM groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn event_venue(&self, venue_id: i64) -> Result<Option<Venue>, DatabaseError> {
        let venue = sqlx::query_as::<_, Venue>(
            "SELECT id, group_id, address, city, state, lat, lng FROM venues WHERE id = $1",
        )
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(venue)
    }

    async fn find_event_images(&self, event_id: i64) -> Result<Vec<Image>, DatabaseError> {
        let images = sqlx::query_as::<_, Image>(
            r#"SELECT i.id, i.url, i.preview
               FROM images i
               INNER JOIN event_images ei ON ei.image_id = i.id
               WHERE ei.event_id = $1
               ORDER BY i.id"#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct EventService<R: EventRepository, G: LogManager> {
    repository: R,
    logger: G,
}

impl<R: EventRepository, G: LogManager> EventService<R, G> {
    pub fn new(repository: R, logger: G) -> Self {
        Self { repository, logger }
    }

    pub async fn list_events(&self, page: Page) -> Result<Vec<EventSummary>, DomainError> {
        Ok(self.repository.find_events(page).await?)
    }

    pub async fn list_group_events(&self, group_id: i64) -> Result<Vec<EventSummary>, DomainError> {
        if !self.repository.has_group(group_id).await? {
            return Err(DomainError::GroupNotFound);
        }

        Ok(self.repository.find_group_events(group_id).await?)
    }

    pub async fn get_event_details(&self, event_id: i64) -> Result<EventDetails, DomainError> {
        let event = self
            .repository
            .get_event(event_id)
            .await?
            .ok_or(DomainError::EventNotFound)?;

        let group = self.repository.event_group(event.group_id).await?;
        let venue = match event.venue_id {
            Some(venue_id) => self.repository.event_venue(venue_id).await?,
            None => None,
        };
        let images = self.repository.find_event_images(event.id).await?;

        Ok(EventDetails {
            event,
            group,
            venue,
            images,
        })
    }

    pub async fn create_event(
        &self,
        group_id: i64,
        event: NewEvent,
        preview_image: Option<String>,
    ) -> Result<Event, DomainError> {
        if event.start_date <= OffsetDateTime::now_utc() {
            return Err(DomainError::field("startDate", "Start date must be in the future"));
        }

        let mut tx = self.repository.begin().await?;

        if let Some(venue_id) = event.venue_id {
            if tx.venue_group(venue_id).await? != Some(group_id) {
                self.repository.rollback(tx).await?;
                return Err(DomainError::field("venueId", "Venue does not exist"));
            }
        }

        let created = tx.insert_event(group_id, &event).await?;

        if let Some(url) = preview_image {
            tx.attach_event_image(created.id, &NewImage { url, preview: true })
                .await?;
        }

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!("Event created: event_id={}, group_id={}", created.id, group_id),
                "event",
            )
            .await;

        Ok(created)
    }

    /// The start date is only held to the future when it changes.
    pub async fn update_event(&self, event_id: i64, event: NewEvent) -> Result<Event, DomainError> {
        let mut tx = self.repository.begin().await?;

        let Some(existing) = tx.lock_event(event_id).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::EventNotFound);
        };

        let mut errors = ValidationErrors::new();
        errors.check(
            event.capacity >= existing.num_attending,
            "capacity",
            "Capacity cannot be less than the number of attendees",
        );
        errors.check(
            event.start_date == existing.start_date || event.start_date > OffsetDateTime::now_utc(),
            "startDate",
            "Start date must be in the future",
        );
        if let Some(venue_id) = event.venue_id {
            let venue_group = tx.venue_group(venue_id).await?;
            errors.check(
                venue_group == Some(existing.group_id),
                "venueId",
                "Venue does not exist",
            );
        }
        if let Err(errors) = errors.into_result() {
            self.repository.rollback(tx).await?;
            return Err(DomainError::Validation(errors));
        }

        let updated = tx.update_event(event_id, &event).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(format!("Event updated: event_id={}", event_id), "event")
            .await;

        Ok(updated)
    }

    pub async fn delete_event(&self, event_id: i64, user_id: i64) -> Result<(), DomainError> {
        let mut tx = self.repository.begin().await?;

        if !tx.delete_event(event_id).await? {
            self.repository.rollback(tx).await?;
            return Err(DomainError::EventNotFound);
        }

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!("Event deleted: event_id={}, by user_id={}", event_id, user_id),
                "event",
            )
            .await;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC).
fn parse_date(value: Option<&str>) -> Option<OffsetDateTime> {
    let value = value?.trim();
    OffsetDateTime::parse(value, &Rfc3339).ok().or_else(|| {
        PrimitiveDateTime::parse(value, LOCAL_DATE_FORMAT)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub venue_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub capacity: Option<i64>,
    pub price: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub preview_image: Option<String>,
}

impl EventRequest {
    pub fn validate(&self) -> Result<NewEvent, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = self.name.as_deref().unwrap_or_default().trim().to_string();
        errors.check(
            name.chars().count() >= 5,
            "name",
            "Name must be at least 5 characters",
        );

        let event_type = self.event_type.as_deref().and_then(MeetingType::parse);
        errors.check(
            event_type.is_some(),
            "type",
            "Type must be Online or In person",
        );

        let capacity = self
            .capacity
            .filter(|c| *c >= 0)
            .and_then(|c| i32::try_from(c).ok());
        errors.check(capacity.is_some(), "capacity", "Capacity must be an integer");

        let price = self.price.filter(|p| p.is_finite() && *p >= 0.0);
        errors.check(price.is_some(), "price", "Price is invalid");

        let description = self
            .description
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        errors.check(
            !description.is_empty(),
            "description",
            "Description is required",
        );

        let start_date = parse_date(self.start_date.as_deref());
        errors.check(start_date.is_some(), "startDate", "Start date is invalid");

        let end_date = parse_date(self.end_date.as_deref());
        errors.check(end_date.is_some(), "endDate", "End date is invalid");

        if let (Some(start), Some(end)) = (start_date, end_date) {
            errors.check(end >= start, "endDate", "End date is less than start date");
        }

        errors.into_result()?;

        match (event_type, capacity, price, start_date, end_date) {
            (Some(event_type), Some(capacity), Some(price), Some(start_date), Some(end_date)) => {
                Ok(NewEvent {
                    venue_id: self.venue_id,
                    name,
                    description,
                    event_type,
                    capacity,
                    price,
                    start_date,
                    end_date,
                })
            }
            _ => Err(ValidationErrors::new()),
        }
    }

    pub fn preview_image(&self) -> Option<String> {
        self.preview_image
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventQuery {
    /// 1-based page number.
    pub page: Option<String>,
    /// Events per page, at most 20.
    pub size: Option<String>,
}

impl EventQuery {
    pub fn validate(&self) -> Result<Page, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let page = match self.page.as_deref() {
            None => Some(1),
            Some(raw) => raw.trim().parse::<i64>().ok().filter(|p| *p >= 1),
        };
        errors.check(
            page.is_some(),
            "page",
            "Page must be greater than or equal to 1",
        );

        let size = match self.size.as_deref() {
            None => Some(MAX_PAGE_SIZE),
            Some(raw) => raw.trim().parse::<i64>().ok().filter(|s| *s >= 1),
        };
        errors.check(
            size.is_some(),
            "size",
            "Size must be greater than or equal to 1",
        );

        let limit = size.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let offset = page.and_then(|p| (p - 1).checked_mul(limit));
        if page.is_some() {
            errors.check(offset.is_some(), "page", "Page is out of range");
        }

        errors.into_result()?;

        Ok(Page {
            limit,
            offset: offset.unwrap_or(0),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    #[serde(rename = "Events")]
    pub events: Vec<EventSummary>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Events = EventService<Postgre, TextLogManager>;

pub fn event_routes(event_service: Events, access: AccessService<Postgre>) -> OpenApiRouter<Postgre> {
    let public = OpenApiRouter::new()
        .routes(routes!(list_events_handler))
        .routes(routes!(get_event_handler))
        .routes(routes!(list_group_events_handler));

    let admins = OpenApiRouter::new()
        .routes(routes!(create_event_handler))
        .routes(routes!(update_event_handler, delete_event_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ORGANIZER_OR_CO_HOST, Target::Group),
            access_guard,
        ));

    public.merge(admins).with_state(event_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    get,
    tag = "event",
    path = "/events",
    params(EventQuery),
    responses(
        (status = 200, description = "One page of events", body = EventsResponse),
        (status = 400, description = "Invalid pagination", body = ErrorBody),
    )
)]
async fn list_events_handler(
    State(service): State<Events>,
    Query(query): Query<EventQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let page = query.validate().map_err(DomainError::Validation)?;
    let events = service.list_events(page).await?;
    Ok(Json(EventsResponse { events }))
}

#[utoipa::path(
    get,
    tag = "event",
    path = "/events/{eventId}",
    params(("eventId", Path, description = "Event to show")),
    responses(
        (status = 200, description = "Event with group, venue and images", body = EventDetails),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn get_event_handler(
    State(service): State<Events>,
    Path(event_id): Path<i64>,
) -> Result<Json<EventDetails>, ApiError> {
    let details = service.get_event_details(event_id).await?;
    Ok(Json(details))
}

#[utoipa::path(
    get,
    tag = "event",
    path = "/groups/{groupId}/events",
    params(("groupId", Path, description = "Group whose events are listed")),
    responses(
        (status = 200, description = "Events of the group", body = EventsResponse),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn list_group_events_handler(
    State(service): State<Events>,
    Path(group_id): Path<i64>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = service.list_group_events(group_id).await?;
    Ok(Json(EventsResponse { events }))
}

#[utoipa::path(
    post,
    tag = "event",
    path = "/groups/{groupId}/events",
    params(("groupId", Path, description = "Group hosting the event")),
    request_body = EventRequest,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn create_event_handler(
    State(service): State<Events>,
    Path(group_id): Path<i64>,
    AppJson(payload): AppJson<EventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = payload.validate().map_err(DomainError::Validation)?;
    let created = service
        .create_event(group_id, event, payload.preview_image())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    tag = "event",
    path = "/events/{eventId}",
    params(("eventId", Path, description = "Event to update")),
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event updated", body = Event),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn update_event_handler(
    State(service): State<Events>,
    Path(event_id): Path<i64>,
    AppJson(payload): AppJson<EventRequest>,
) -> Result<Json<Event>, ApiError> {
    let event = payload.validate().map_err(DomainError::Validation)?;
    let updated = service.update_event(event_id, event).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    tag = "event",
    path = "/events/{eventId}",
    params(("eventId", Path, description = "Event to delete")),
    responses(
        (status = 200, description = "Event deleted", body = MessageResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Event not found", body = ErrorBody),
    )
)]
async fn delete_event_handler(
    State(service): State<Events>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    service.delete_event(event_id, user.id).await?;
    Ok(Json(MessageResponse::deleted()))
}
