use std::time::Duration;

use axum::{
    extract::{RawPathParams, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::access::{AccessRepository, AccessService, Target};
use crate::config::Config;
use crate::error::ApiError;
use crate::model::MemberRole;
use crate::user::UserRepository;

pub const TOKEN_COOKIE: &str = "token";

/// The authenticated user attached to every request carrying a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub data: AuthUser,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expires_in: Duration,
    production: bool,
}

impl TokenService {
    pub fn new(secret: &str, expires_in: Duration, production: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expires_in,
            production,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            config.jwt_expiration(),
            config.production,
        )
    }

    fn lifetime_secs(&self) -> i64 {
        i64::try_from(self.expires_in.as_secs()).unwrap_or(i64::MAX)
    }

    pub fn issue(&self, user: &AuthUser) -> Result<String, jsonwebtoken::errors::Error> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            data: user.clone(),
            iat: now,
            exp: now.saturating_add(self.lifetime_secs()),
        };

        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(token_data.claims)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((TOKEN_COOKIE, token))
            .path("/")
            .http_only(true)
            .max_age(time::Duration::seconds(self.lifetime_secs()));

        if self.production {
            cookie = cookie.secure(true).same_site(SameSite::Lax);
        }

        cookie.build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((TOKEN_COOKIE, "")).path("/").build()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION RESTORE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("user {0} no longer exists")]
    UnknownUser(i64),
}

#[derive(Clone)]
pub struct AuthorizeService<T: UserRepository> {
    users: T,
    pub tokens: TokenService,
}

impl<T: UserRepository> AuthorizeService<T> {
    pub fn new(users: T, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Verifies the token and reloads the user it names.
    pub async fn restore(&self, token: &str) -> Result<Option<AuthUser>, RestoreError> {
        let claims = self.tokens.verify(token)?;

        match self.users.find_user(claims.data.id).await {
            Ok(Some(user)) => Ok(Some(AuthUser {
                id: user.id,
                email: user.email,
                username: user.username,
            })),
            Ok(None) => Err(RestoreError::UnknownUser(claims.data.id)),
            Err(e) => {
                tracing::error!("Failed to restore session user: {}", e);
                Ok(None)
            }
        }
    }
}

pub async fn restore_user<T: UserRepository + 'static>(
    State(auth_service): State<AuthorizeService<T>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()) else {
        return next.run(request).await;
    };

    match auth_service.restore(&token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(reason) => {
            tracing::debug!("Clearing session cookie: {}", reason);
            let response = next.run(request).await;
            (jar.remove(auth_service.tokens.removal_cookie()), response).into_response()
        }
    }
}

pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthUser>().is_none() {
        return Err(ApiError::Unauthorized("Authentication required".to_string()));
    }

    Ok(next.run(request).await)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTE GUARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Allowed roles and target type of one guarded route group.
#[derive(Clone)]
pub struct RouteGuard<R: AccessRepository> {
    access: AccessService<R>,
    roles: &'static [MemberRole],
    target: Target,
}

impl<R: AccessRepository> RouteGuard<R> {
    pub fn new(access: AccessService<R>, roles: &'static [MemberRole], target: Target) -> Self {
        Self {
            access,
            roles,
            target,
        }
    }
}

/// 401 without a session, 404 for a missing route entity, 403 when the walk
/// fails. On success the handler finds an `AccessContext` extension.
pub async fn access_guard<R: AccessRepository + 'static>(
    State(guard): State<RouteGuard<R>>,
    params: RawPathParams,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let params: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    let context = guard
        .access
        .authorize(user.id, &params, guard.roles, guard.target)
        .await
        .map_err(|e| {
            tracing::debug!(
                "Access denied for user {} on {:?} route: {}",
                user.id,
                guard.target,
                e
            );
            ApiError::from(e)
        })?;

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessContext;
    use crate::model::{ACTIVE_MEMBER, ORGANIZER_OR_CO_HOST};
    use crate::testing::{MemoryStore, Seed};
    use axum::{
        Extension, Router,
        body::Body,
        http::{StatusCode, header},
        middleware::from_fn_with_state,
        routing::{get, put},
    };
    use tower::ServiceExt;

    fn tokens() -> TokenService {
        TokenService::new("test-secret", Duration::from_secs(3600), false)
    }

    async fn whoami(Extension(context): Extension<AccessContext>) -> String {
        format!("{:?}", context.valid_group_ids)
    }

    fn guarded(store: MemoryStore, roles: &'static [MemberRole], acting: Option<i64>) -> Router {
        let router = Router::new()
            .route("/groups/{groupId}", put(whoami))
            .route("/groups/{groupId}/members/{userId}", get(whoami))
            .route_layer(from_fn_with_state(
                RouteGuard::new(AccessService::new(store), roles, Target::Group),
                access_guard,
            ));

        match acting {
            Some(id) => router.layer(Extension(AuthUser {
                id,
                email: format!("user{}@user.io", id),
                username: format!("user{}", id),
            })),
            None => router,
        }
    }

    async fn status_of(router: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[test]
    fn tokens_round_trip_and_reject_foreign_signatures() {
        let user = AuthUser {
            id: 7,
            email: "demo@user.io".to_string(),
            username: "Demo-lition".to_string(),
        };

        let token = tokens().issue(&user).unwrap();
        let claims = tokens().verify(&token).unwrap();
        assert_eq!(claims.data, user);
        assert_eq!(claims.exp - claims.iat, 3600);

        let other = TokenService::new("other-secret", Duration::from_secs(3600), false);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn oversized_lifetime_saturates_instead_of_wrapping() {
        let user = AuthUser {
            id: 7,
            email: "demo@user.io".to_string(),
            username: "Demo-lition".to_string(),
        };
        let forever = TokenService::new("test-secret", Duration::from_secs(u64::MAX), false);

        let claims = forever.verify(&forever.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.exp, i64::MAX);
        assert!(claims.exp > claims.iat);

        let cookie = forever.session_cookie("abc".to_string());
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(i64::MAX)));
    }

    #[test]
    fn production_cookies_are_secure() {
        let cookie = tokens().session_cookie("abc".to_string());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), None);

        let prod = TokenService::new("s", Duration::from_secs(60), true);
        let cookie = prod.session_cookie("abc".to_string());
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[tokio::test]
    async fn guard_answers_401_without_a_session() {
        let store = MemoryStore::new();
        let seed = Seed::group_with_member(&store).await;

        let status = status_of(
            guarded(store, ORGANIZER_OR_CO_HOST, None),
            "PUT",
            &format!("/groups/{}", seed.group),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn guard_answers_404_for_missing_group_before_role_check() {
        let store = MemoryStore::new();
        let seed = Seed::group_with_member(&store).await;

        let status = status_of(
            guarded(store, ORGANIZER_OR_CO_HOST, Some(seed.member)),
            "PUT",
            "/groups/9999",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn guard_distinguishes_member_from_admin_role_sets() {
        let store = MemoryStore::new();
        let seed = Seed::group_with_member(&store).await;
        let uri = format!("/groups/{}", seed.group);

        let status = status_of(
            guarded(store.clone(), ORGANIZER_OR_CO_HOST, Some(seed.member)),
            "PUT",
            &uri,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let status = status_of(
            guarded(store, ACTIVE_MEMBER, Some(seed.member)),
            "PUT",
            &uri,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn guard_masks_unrelated_users_as_not_found() {
        let store = MemoryStore::new();
        let seed = Seed::group_with_member(&store).await;
        let stranger = store.seed_user("stranger").await;

        let router = guarded(store, ACTIVE_MEMBER, Some(seed.organizer));
        let status = status_of(
            router.clone(),
            "GET",
            &format!("/groups/{}/members/{}", seed.group, seed.member),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let status = status_of(
            router,
            "GET",
            &format!("/groups/{}/members/{}", seed.group, stranger),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn restore_user_attaches_the_user_and_clears_bad_cookies() {
        let store = MemoryStore::new();
        let user_id = store.seed_user("Demo-lition").await;
        let auth_service = AuthorizeService::new(store.clone(), tokens());

        async fn echo(user: Option<Extension<AuthUser>>) -> String {
            user.map(|Extension(u)| u.username).unwrap_or_default()
        }

        let router = Router::new()
            .route("/", get(echo))
            .layer(from_fn_with_state(auth_service, restore_user::<MemoryStore>));

        let token = tokens()
            .issue(&AuthUser {
                id: user_id,
                email: "stale@user.io".to_string(),
                username: "stale".to_string(),
            })
            .unwrap();
        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, format!("{}={}", TOKEN_COOKIE, token))
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Demo-lition");

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, format!("{}=garbage", TOKEN_COOKIE))
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(cleared.starts_with("token="));
    }
}
