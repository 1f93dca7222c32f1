// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::future::Future;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::managers::{LogManager, TextLogManager};
use crate::middleware::{AuthUser, TokenService};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bcrypt::{DEFAULT_COST, hash};
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
        }
    }
}

/// Login lookup row. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    pub id: i64,
    pub hashed_password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid");
}

pub fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("User already exists: {0}")]
    UserExists(ValidationErrors),

    #[error("Password hashing failed")]
    PasswordHashingError,

    #[error("Token signing failed: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::UserExists(errors) => ApiError::BadRequest {
                message: "User already exists".to_string(),
                errors: Some(errors.0),
            },
            DomainError::PasswordHashingError => {
                tracing::error!("Password hashing failed");
                ApiError::internal()
            }
            DomainError::TokenError(e) => {
                tracing::error!("Token signing failed: {}", e);
                ApiError::internal()
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

pub trait UserTransaction: Send + Sync {
    fn create_user(
        &mut self,
        user: &NewUser,
        hashed_password: &str,
    ) -> impl Future<Output = Result<User, DatabaseError>> + Send;
}

pub trait UserRepository: Send + Sync + Clone {
    type Transaction: UserTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, DatabaseError>> + Send;

    fn commit(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn rollback(
        &self,
        transaction: Self::Transaction,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    fn find_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<User>, DatabaseError>> + Send;

    /// Matches `credential` against username or email.
    fn find_credentials(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Option<Credentials>, DatabaseError>> + Send;
}

pub struct PgUserTransaction {
    transaction: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl UserTransaction for PgUserTransaction {
    async fn create_user(
        &mut self,
        user: &NewUser,
        hashed_password: &str,
    ) -> Result<User, DatabaseError> {
        let result = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (first_name, last_name, email, username, hashed_password)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, username, email, first_name, last_name, created_at, updated_at"#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.username)
        .bind(hashed_password)
        .fetch_one(&mut *self.transaction)
        .await?;

        Ok(result)
    }
}

impl UserRepository for Postgre {
    type Transaction = PgUserTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PgUserTransaction { transaction: tx })
    }

    async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.commit().await?;
        Ok(())
    }

    async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
        transaction.transaction.rollback().await?;
        Ok(())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let result = sqlx::query_as::<_, User>(
            r#"SELECT id, username, email, first_name, last_name, created_at, updated_at
               FROM users
               WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_credentials(
        &self,
        credential: &str,
    ) -> Result<Option<Credentials>, DatabaseError> {
        let result = sqlx::query_as::<_, Credentials>(
            r#"SELECT id, hashed_password
               FROM users
               WHERE username = $1 OR email = $1
               LIMIT 1"#,
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct UserService<R: UserRepository, G: LogManager> {
    repository: R,
    tokens: TokenService,
    logger: G,
}

impl<R: UserRepository, G: LogManager> UserService<R, G> {
    pub fn new(repository: R, tokens: TokenService, logger: G) -> Self {
        Self {
            repository,
            tokens,
            logger,
        }
    }

    pub async fn signup(&self, new_user: NewUser) -> Result<User, DomainError> {
        let hashed_password =
            hash(&new_user.password, DEFAULT_COST).map_err(|_| DomainError::PasswordHashingError)?;

        let mut tx = self.repository.begin().await?;

        let user = match tx.create_user(&new_user, &hashed_password).await {
            Ok(user) => user,
            Err(DatabaseError::UniqueConstraintViolation { constraint }) => {
                self.repository.rollback(tx).await?;
                let mut errors = ValidationErrors::new();
                if constraint == "unique_email" {
                    errors.add("email", "User with that email already exists");
                } else {
                    errors.add("username", "User with that username already exists");
                }
                return Err(DomainError::UserExists(errors));
            }
            Err(e) => return Err(e.into()),
        };

        self.repository.commit(tx).await?;

        let _ = self
            .logger
            .log_entry(format!("User signed up: user_id={}", user.id), "user")
            .await;

        Ok(user)
    }

    pub fn session_cookie(&self, user: &User) -> Result<Cookie<'static>, DomainError> {
        let token = self.tokens.issue(&user.auth_user())?;
        Ok(self.tokens.session_cookie(token))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SignupRequest {
    pub fn validate(self) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let email = self.email.unwrap_or_default().trim().to_string();
        errors.check(!email.is_empty(), "email", "Email is required");
        errors.check(is_email(&email), "email", "Invalid email");
        errors.check(email.len() <= 255, "email", "Email must be 255 characters or less");

        let username = self.username.unwrap_or_default().trim().to_string();
        errors.check(!username.is_empty(), "username", "Username is required");
        errors.check(
            (4..=30).contains(&username.chars().count()),
            "username",
            "Username must be between 4 and 30 characters",
        );
        errors.check(!is_email(&username), "username", "Username cannot be an email");

        let first_name = self.first_name.unwrap_or_default().trim().to_string();
        errors.check(!first_name.is_empty(), "firstName", "First Name is required");
        errors.check(
            first_name.chars().count() <= 50,
            "firstName",
            "First Name must be 50 characters or less",
        );

        let last_name = self.last_name.unwrap_or_default().trim().to_string();
        errors.check(!last_name.is_empty(), "lastName", "Last Name is required");
        errors.check(
            last_name.chars().count() <= 50,
            "lastName",
            "Last Name must be 50 characters or less",
        );

        let password = self.password.unwrap_or_default();
        errors.check(
            password.chars().count() >= 6,
            "password",
            "Password must be 6 characters or more",
        );

        errors.into_result()?;

        Ok(NewUser {
            first_name,
            last_name,
            email,
            username,
            password,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub user: User,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn user_routes(user_service: UserService<Postgre, TextLogManager>) -> OpenApiRouter<Postgre> {
    OpenApiRouter::new()
        .routes(routes!(signup_handler))
        .with_state(user_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    post,
    tag = "user",
    path = "/users",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and logged in", body = UserResponse),
        (status = 400, description = "Validation failed or user already exists", body = ErrorBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
async fn signup_handler(
    State(service): State<UserService<Postgre, TextLogManager>>,
    jar: CookieJar,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), ApiError> {
    let new_user = payload.validate().map_err(DomainError::Validation)?;
    let user = service.signup(new_user).await?;
    let cookie = service.session_cookie(&user)?;

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(UserResponse { user }),
    ))
}
