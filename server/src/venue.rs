// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use utoipa::ToSchema;

use crate::access::{AccessService, Target};
use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::managers::{LogManager, TextLogManager};
use crate::middleware::{RouteGuard, access_guard};
use crate::model::ORGANIZER_OR_CO_HOST;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: i64,
    pub group_id: i64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVenue {
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lng: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Venue couldn't be found")]
    VenueNotFound,

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::VenueNotFound => {
                ApiError::NotFound("Venue couldn't be found".to_string())
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

pub trait VenueTransaction: Send + Sync {
    fn create_venue(
        &mut self,
        group_id: i64,
        venue: &NewVenue,
    ) -> impl Future<Output = Result<Venue, DatabaseError>> + Send;

    fn update_venue(
        &mut self,
        venue_id: i64,
        venue: &NewVenue,
    ) -> impl Future<Output = Result<Option<Venue>, DatabaseError>> + Send;
}

pub trait VenueRepository: Send + Sync + Clone {
    type Transaction: VenueTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn find_venues(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Vec<Venue>, DatabaseError>> + Send;
}

pub struct PgVenueTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl VenueTransaction for PgVenueTransaction {
    async fn create_venue(&mut self, group_id: i64, venue: &NewVenue) -> Result<Venue, DatabaseError> {
        let result = sqlx::query_as::<_, Venue>(
            r#"INSERT INTO venues (group_id, address, city, state, lat, lng)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, group_id, address, city, state, lat, lng"#,
        )
        .bind(group_id)
        .bind(&venue.address)
        .bind(&venue.city)
        .bind(&venue.state)
        .bind(venue.lat)
        .bind(venue.lng)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(result)
    }

    async fn update_venue(
        &mut self,
        venue_id: i64,
        venue: &NewVenue,
    ) -> Result<Option<Venue>, DatabaseError> {
        let result = sqlx::query_as::<_, Venue>(
            r#"UPDATE venues
               SET address = $2, city = $3, state = $4, lat = $5, lng = $6, updated_at = now()
               WHERE id = $1
               RETURNING id, group_id, address, city, state, lat, lng"#,
        )
        .bind(venue_id)
        .bind(&venue.address)
        .bind(&venue.city)
        .bind(&venue.state)
        .bind(venue.lat)
        .bind(venue.lng)
        .fetch_optional(&mut *self.transaction)
        .await?;

        Ok(result)
    }
}

impl VenueRepository for Postgre {
    type Transaction = PgVenueTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgVenueTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn find_venues(&self, group_id: i64) -> Result<Vec<Venue>, DatabaseError> {
        let result = sqlx::query_as::<_, Venue>(
            r#"SELECT id, group_id, address, city, state, lat, lng
               FROM venues
               WHERE group_id = $1
               ORDER BY id"#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(result)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct VenueService<R: VenueRepository, G: LogManager> {
    repository: R,
    logger: G,
}

impl<R: VenueRepository, G: LogManager> VenueService<R, G> {
    pub fn new(repository: R, logger: G) -> Self {
        Self { repository, logger }
    }

    pub async fn list_venues(&self, group_id: i64) -> Result<Vec<Venue>, DomainError> {
        Ok(self.repository.find_venues(group_id).await?)
    }

    pub async fn create_venue(&self, group_id: i64, venue: NewVenue) -> Result<Venue, DomainError> {
        let mut tx = self.repository.begin().await?;
        let created = tx.create_venue(group_id, &venue).await?;
        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(
                format!("Venue created: venue_id={}, group_id={}", created.id, group_id),
                "venue",
            )
            .await;

        Ok(created)
    }

    pub async fn update_venue(&self, venue_id: i64, venue: NewVenue) -> Result<Venue, DomainError> {
        let mut tx = self.repository.begin().await?;

        let Some(updated) = tx.update_venue(venue_id, &venue).await? else {
            self.repository.rollback(tx).await?;
            return Err(DomainError::VenueNotFound);
        };

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(format!("Venue updated: venue_id={}", venue_id), "venue")
            .await;

        Ok(updated)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VenueRequest {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl VenueRequest {
    pub fn validate(self) -> Result<NewVenue, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let address = self.address.unwrap_or_default().trim().to_string();
        errors.check(!address.is_empty(), "address", "Street address is required");

        let city = self.city.unwrap_or_default().trim().to_string();
        errors.check(!city.is_empty(), "city", "City is required");

        let state = self.state.unwrap_or_default().trim().to_string();
        errors.check(!state.is_empty(), "state", "State is required");

        let lat = self.lat.unwrap_or(f64::NAN);
        errors.check(
            (-90.0..=90.0).contains(&lat),
            "lat",
            "Latitude must be within -90 and 90",
        );

        let lng = self.lng.unwrap_or(f64::NAN);
        errors.check(
            (-180.0..=180.0).contains(&lng),
            "lng",
            "Longitude must be within -180 and 180",
        );

        errors.into_result()?;
        Ok(NewVenue {
            address,
            city,
            state,
            lat,
            lng,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VenuesResponse {
    #[serde(rename = "Venues")]
    pub venues: Vec<Venue>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Venues = VenueService<Postgre, TextLogManager>;

pub fn venue_routes(venue_service: Venues, access: AccessService<Postgre>) -> OpenApiRouter<Postgre> {
    OpenApiRouter::new()
        .routes(routes!(list_venues_handler, create_venue_handler))
        .routes(routes!(update_venue_handler))
        .route_layer(from_fn_with_state(
            RouteGuard::new(access, ORGANIZER_OR_CO_HOST, Target::Group),
            access_guard,
        ))
        .with_state(venue_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    get,
    tag = "venue",
    path = "/groups/{groupId}/venues",
    params(("groupId", Path, description = "Group whose venues are listed")),
    responses(
        (status = 200, description = "Venues of the group", body = VenuesResponse),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn list_venues_handler(
    State(service): State<Venues>,
    Path(group_id): Path<i64>,
) -> Result<Json<VenuesResponse>, ApiError> {
    let venues = service.list_venues(group_id).await?;
    Ok(Json(VenuesResponse { venues }))
}

#[utoipa::path(
    post,
    tag = "venue",
    path = "/groups/{groupId}/venues",
    params(("groupId", Path, description = "Group that owns the new venue")),
    request_body = VenueRequest,
    responses(
        (status = 201, description = "Venue created", body = Venue),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Group not found", body = ErrorBody),
    )
)]
async fn create_venue_handler(
    State(service): State<Venues>,
    Path(group_id): Path<i64>,
    AppJson(payload): AppJson<VenueRequest>,
) -> Result<(StatusCode, Json<Venue>), ApiError> {
    let venue = payload.validate().map_err(DomainError::Validation)?;
    let created = service.create_venue(group_id, venue).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    tag = "venue",
    path = "/venues/{venueId}",
    params(("venueId", Path, description = "Venue to update")),
    request_body = VenueRequest,
    responses(
        (status = 200, description = "Venue updated", body = Venue),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 403, description = "Not an organizer or co-host", body = ErrorBody),
        (status = 404, description = "Venue not found", body = ErrorBody),
    )
)]
async fn update_venue_handler(
    State(service): State<Venues>,
    Path(venue_id): Path<i64>,
    AppJson(payload): AppJson<VenueRequest>,
) -> Result<Json<Venue>, ApiError> {
    let venue = payload.validate().map_err(DomainError::Validation)?;
    let updated = service.update_venue(venue_id, venue).await?;
    Ok(Json(updated))
}
