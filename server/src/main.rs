mod access;
mod attendance;
mod config;
mod db;
mod error;
mod event;
mod group;
mod image;
mod managers;
mod membership;
mod middleware;
mod model;
mod session;
mod user;
mod venue;

#[cfg(test)]
mod testing;

use access::AccessService;
use attendance::{AttendanceService, attendance_routes};
use config::Config;
use db::Postgre;
use event::{EventService, event_routes};
use group::{GroupService, group_routes};
use image::{ImageService, image_routes};
use managers::{DefaultLockoutManager, TextLogManager};
use membership::{MembershipService, membership_routes};
use middleware::{AuthorizeService, TokenService, restore_user};
use session::{SessionService, session_routes};
use user::{UserService, user_routes};
use venue::{VenueService, venue_routes};

use axum::middleware::from_fn_with_state;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub const USER_TAG: &str = "user";
pub const SESSION_TAG: &str = "session";
pub const GROUP_TAG: &str = "group";
pub const VENUE_TAG: &str = "venue";
pub const EVENT_TAG: &str = "event";
pub const MEMBERSHIP_TAG: &str = "membership";
pub const ATTENDANCE_TAG: &str = "attendance";
pub const IMAGE_TAG: &str = "image";

#[derive(OpenApi)]
#[openapi(tags(
    (name = USER_TAG, description = "User signup endpoints"),
    (name = SESSION_TAG, description = "Session API endpoints"),
    (name = GROUP_TAG, description = "Group API endpoints"),
    (name = VENUE_TAG, description = "Venue API endpoints"),
    (name = EVENT_TAG, description = "Event API endpoints"),
    (name = MEMBERSHIP_TAG, description = "Group membership API endpoints"),
    (name = ATTENDANCE_TAG, description = "Event attendance API endpoints"),
    (name = IMAGE_TAG, description = "Group and event image API endpoints")
))]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let postgre = Postgre::connect(&config).await?;
    postgre.migrate().await?;

    let tokens = TokenService::from_config(&config);
    let log_manager = TextLogManager::new(&config.audit_log_path);
    let access = AccessService::new(postgre.clone());

    let user_service = UserService::new(postgre.clone(), tokens.clone(), log_manager.clone());
    let session_service = SessionService::new(
        postgre.clone(),
        tokens.clone(),
        DefaultLockoutManager::default(),
        log_manager.clone(),
    );
    let authorize_service = AuthorizeService::new(postgre.clone(), tokens.clone());
    let group_service = GroupService::new(postgre.clone(), log_manager.clone());
    let venue_service = VenueService::new(postgre.clone(), log_manager.clone());
    let event_service = EventService::new(postgre.clone(), log_manager.clone());
    let membership_service = MembershipService::new(postgre.clone(), log_manager.clone());
    let attendance_service = AttendanceService::new(
        postgre.clone(),
        config.attendance_policy,
        log_manager.clone(),
    );
    let image_service = ImageService::new(postgre.clone(), log_manager.clone());

    let api = OpenApiRouter::new()
        .merge(user_routes(user_service))
        .merge(session_routes(session_service))
        .merge(group_routes(group_service, access.clone()))
        .merge(venue_routes(venue_service, access.clone()))
        .merge(event_routes(event_service, access.clone()))
        .merge(membership_routes(membership_service, access.clone()))
        .merge(attendance_routes(attendance_service, access.clone()))
        .merge(image_routes(image_service, access));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api", api)
        .layer(from_fn_with_state(authorize_service, restore_user::<Postgre>))
        .with_state(postgre)
        .split_for_parts();

    let router = router.merge(SwaggerUi::new("/swagger-ui").url("/apidoc/openapi.json", api));

    let router = if config.production {
        router
    } else {
        router.layer(CorsLayer::permissive())
    };

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("HTTP server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
