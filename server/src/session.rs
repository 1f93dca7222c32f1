// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::Postgre;
use crate::error::{ApiError, AppJson, DatabaseError, ErrorBody, ValidationErrors};
use crate::managers::{DefaultLockoutManager, LockoutManager, LogManager, TextLogManager};
use crate::middleware::{AuthUser, TokenService};
use crate::model::MessageResponse;
use crate::user::{User, UserRepository};

use axum::Json;
use axum::extract::{Extension, State};
use axum_extra::extract::cookie::CookieJar;
use bcrypt::verify;
use utoipa_axum::{router::OpenApiRouter, routes};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Credential locked for {0} seconds")]
    LockedOut(u64),

    #[error("Password verification failed")]
    PasswordVerificationError,

    #[error("Token signing failed: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(errors) => errors.into(),
            DomainError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            DomainError::LockedOut(seconds) => ApiError::Unauthorized(format!(
                "Too many failed login attempts, try again in {} seconds",
                seconds
            )),
            DomainError::PasswordVerificationError => {
                tracing::error!("Password verification failed");
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
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct SessionService<R: UserRepository, L: LockoutManager, G: LogManager> {
    repository: R,
    tokens: TokenService,
    lockout_manager: L,
    logger: G,
}

impl<R: UserRepository, L: LockoutManager, G: LogManager> SessionService<R, L, G> {
    pub fn new(repository: R, tokens: TokenService, lockout_manager: L, logger: G) -> Self {
        Self {
            repository,
            tokens,
            lockout_manager,
            logger,
        }
    }

    /// Returns the user and a fresh session token.
    pub async fn login(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<(User, String), DomainError> {
        if let Some(remaining_seconds) = self.lockout_manager.is_locked_out(credential) {
            return Err(DomainError::LockedOut(remaining_seconds));
        }

        let credentials = self
            .repository
            .find_credentials(credential)
            .await?
            .ok_or_else(|| {
                self.lockout_manager.record_failed_attempt(credential);
                DomainError::InvalidCredentials
            })?;

        if !verify(password, &credentials.hashed_password)
            .map_err(|_| DomainError::PasswordVerificationError)?
        {
            self.lockout_manager.record_failed_attempt(credential);
            return Err(DomainError::InvalidCredentials);
        }

        self.lockout_manager.record_successful_login(credential);

        let user = self
            .repository
            .find_user(credentials.id)
            .await?
            .ok_or(DomainError::InvalidCredentials)?;

        let token = self.tokens.issue(&user.auth_user())?;

        let _ = self
            .logger
            .log_entry(format!("User logged in: user_id={}", user.id), "session")
            .await;

        Ok((user, token))
    }

    pub async fn current(&self, user: Option<&AuthUser>) -> Result<Option<User>, DomainError> {
        match user {
            Some(user) => Ok(self.repository.find_user(user.id).await?),
            None => Ok(None),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub credential: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// `credential` wins over the `username`/`email` aliases.
    pub fn validate(self) -> Result<(String, String), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let credential = self
            .credential
            .or(self.username)
            .or(self.email)
            .unwrap_or_default()
            .trim()
            .to_string();
        errors.check(
            !credential.is_empty(),
            "credential",
            "Email or username is required",
        );

        let password = self.password.unwrap_or_default();
        errors.check(!password.is_empty(), "password", "Password is required");

        errors.into_result()?;
        Ok((credential, password))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: Option<User>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

type Sessions = SessionService<Postgre, DefaultLockoutManager, TextLogManager>;

pub fn session_routes(session_service: Sessions) -> OpenApiRouter<Postgre> {
    OpenApiRouter::new()
        .routes(routes!(
            login_handler,
            current_session_handler,
            logout_handler
        ))
        .with_state(session_service)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

#[utoipa::path(
    post,
    tag = "session",
    path = "/session",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 400, description = "Missing credential or password", body = ErrorBody),
        (status = 401, description = "Invalid credentials or locked out", body = ErrorBody),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
async fn login_handler(
    State(service): State<Sessions>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let (credential, password) = payload.validate().map_err(DomainError::Validation)?;
    let (user, token) = service.login(&credential, &password).await?;
    let cookie = service.tokens.session_cookie(token);

    Ok((jar.add(cookie), Json(SessionResponse { user: Some(user) })))
}

#[utoipa::path(
    get,
    tag = "session",
    path = "/session",
    responses(
        (status = 200, description = "The current user, or null", body = SessionResponse),
        (status = 500, description = "Internal Server Error", body = ErrorBody),
    )
)]
async fn current_session_handler(
    State(service): State<Sessions>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = service.current(user.as_ref().map(|Extension(u)| u)).await?;
    Ok(Json(SessionResponse { user }))
}

#[utoipa::path(
    delete,
    tag = "session",
    path = "/session",
    responses(
        (status = 200, description = "Session cookie cleared", body = MessageResponse),
    )
)]
async fn logout_handler(
    State(service): State<Sessions>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.remove(service.tokens.removal_cookie()),
        Json(MessageResponse::new("success")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLogManager, MemoryStore};
    use crate::user::{SignupRequest, UserService};
    use std::time::Duration;

    async fn setup() -> (
        SessionService<MemoryStore, DefaultLockoutManager, MemoryLogManager>,
        MemoryLogManager,
    ) {
        let store = MemoryStore::new();
        let tokens = TokenService::new("secret", Duration::from_secs(60), false);
        let logger = MemoryLogManager::default();

        UserService::new(store.clone(), tokens.clone(), logger.clone())
            .signup(
                SignupRequest {
                    first_name: Some("Demo".to_string()),
                    last_name: Some("Lition".to_string()),
                    email: Some("demo@user.io".to_string()),
                    username: Some("Demo-lition".to_string()),
                    password: Some("password".to_string()),
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        let lockout = DefaultLockoutManager::new(
            2,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        (
            SessionService::new(store, tokens, lockout, logger.clone()),
            logger,
        )
    }

    #[test]
    fn login_accepts_username_and_email_aliases() {
        let (credential, _) = LoginRequest {
            email: Some("demo@user.io".to_string()),
            password: Some("password".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(credential, "demo@user.io");

        let errors = LoginRequest::default().validate().unwrap_err();
        assert!(errors.contains("credential"));
        assert!(errors.contains("password"));
    }

    #[tokio::test]
    async fn login_by_username_or_email() {
        let (sessions, logger) = setup().await;

        let (user, token) = sessions.login("Demo-lition", "password").await.unwrap();
        assert_eq!(user.email, "demo@user.io");
        assert!(!token.is_empty());

        let (user, _) = sessions.login("demo@user.io", "password").await.unwrap();
        assert_eq!(user.username, "Demo-lition");

        assert!(logger.categories().await.contains(&"session".to_string()));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_credential() {
        let (sessions, _) = setup().await;

        for _ in 0..2 {
            let err = sessions.login("Demo-lition", "wrong").await.unwrap_err();
            assert!(matches!(err, DomainError::InvalidCredentials));
        }

        let err = sessions.login("Demo-lition", "password").await.unwrap_err();
        assert!(matches!(err, DomainError::LockedOut(_)));
        assert_eq!(ApiError::from(err).status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn current_session_is_null_without_a_user() {
        let (sessions, _) = setup().await;
        assert!(sessions.current(None).await.unwrap().is_none());
    }
}
