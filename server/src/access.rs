// ═══════════════════════════════════════════════════════════════════════════════
// IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

use std::collections::BTreeSet;
use std::future::Future;

use crate::attendance::EventMember;
use crate::db::Postgre;
use crate::error::{ApiError, DatabaseError};
use crate::event::{EVENT_COLUMNS, Event};
use crate::group::{GROUP_COLUMNS, Group};
use crate::image::{Image, ImageOwner, find_image_owner};
use crate::membership::GroupMember;
use crate::model::MemberRole;
use crate::user::User;
use crate::venue::Venue;

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every entity a route parameter may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Group,
    GroupMember,
    Venue,
    Event,
    EventMember,
    Image,
}

/// Route parameter name → entity kind. Parameters outside this table are refused.
const ROUTE_PARAMETERS: &[(&str, EntityKind)] = &[
    ("userId", EntityKind::User),
    ("groupId", EntityKind::Group),
    ("groupMemberId", EntityKind::GroupMember),
    ("venueId", EntityKind::Venue),
    ("eventId", EntityKind::Event),
    ("eventMemberId", EntityKind::EventMember),
    ("imageId", EntityKind::Image),
];

impl EntityKind {
    pub fn from_param(name: &str) -> Option<Self> {
        ROUTE_PARAMETERS
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, kind)| *kind)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Group => "Group",
            EntityKind::GroupMember => "Group member",
            EntityKind::Venue => "Venue",
            EntityKind::Event => "Event",
            EntityKind::EventMember => "Event member",
            EntityKind::Image => "Image",
        }
    }
}

/// The entity type whose membership decides access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Group,
    Event,
}

/// A user named by the route, with the history the walker needs.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub memberships: Vec<GroupMember>,
    pub attendances: Vec<EventMember>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub attendance: EventMember,
    pub group_id: i64,
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub image: Image,
    pub owner: Option<ImageOwner>,
}

#[derive(Debug, Clone)]
pub enum Entity {
    User(UserRecord),
    Group(Group),
    GroupMember(GroupMember),
    Venue(Venue),
    Event(Event),
    EventMember(AttendanceRecord),
    Image(ImageRecord),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Group(_) => EntityKind::Group,
            Entity::GroupMember(_) => EntityKind::GroupMember,
            Entity::Venue(_) => EntityKind::Venue,
            Entity::Event(_) => EntityKind::Event,
            Entity::EventMember(_) => EntityKind::EventMember,
            Entity::Image(_) => EntityKind::Image,
        }
    }

    /// Id of the group or event that owns this entity for the given target.
    ///
    /// Covers the entity being the target itself, a direct child (group member,
    /// event member) and a grandchild (venue, event under a group, image).
    /// `None` means there is no ownership path to the target.
    pub fn owner(&self, target: Target) -> Option<i64> {
        match (self, target) {
            (Entity::Group(group), Target::Group) => Some(group.id),
            (Entity::Event(event), Target::Event) => Some(event.id),

            (Entity::GroupMember(member), Target::Group) => Some(member.group_id),
            (Entity::EventMember(record), Target::Event) => Some(record.attendance.event_id),

            (Entity::Venue(venue), Target::Group) => Some(venue.group_id),
            (Entity::Event(event), Target::Group) => Some(event.group_id),
            (Entity::EventMember(record), Target::Group) => Some(record.group_id),
            (Entity::Image(record), Target::Group) => record.owner.map(|o| o.group_id()),
            (Entity::Image(record), Target::Event) => match record.owner {
                Some(ImageOwner::Event { event_id, .. }) => Some(event_id),
                _ => None,
            },

            _ => None,
        }
    }
}

/// Entities named by the route, in path order, at most one per kind.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntities(Vec<Entity>);

impl ResolvedEntities {
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.0.iter().any(|e| e.kind() == kind)
    }

    /// Adds `entity` unless one of the same kind is already attached.
    pub fn attach(mut self, entity: Entity) -> Self {
        if !self.contains(entity.kind()) {
            self.0.push(entity);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn group(&self) -> Option<&Group> {
        self.0.iter().find_map(|e| match e {
            Entity::Group(group) => Some(group),
            _ => None,
        })
    }

    pub fn event(&self) -> Option<&Event> {
        self.0.iter().find_map(|e| match e {
            Entity::Event(event) => Some(event),
            _ => None,
        })
    }

    pub fn venue(&self) -> Option<&Venue> {
        self.0.iter().find_map(|e| match e {
            Entity::Venue(venue) => Some(venue),
            _ => None,
        })
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.0.iter().find_map(|e| match e {
            Entity::User(record) => Some(record),
            _ => None,
        })
    }

    pub fn image(&self) -> Option<&ImageRecord> {
        self.0.iter().find_map(|e| match e {
            Entity::Image(record) => Some(record),
            _ => None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("{} couldn't be found", .0.label())]
    NotFound(EntityKind),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Route parameter '{0}' does not name a known entity")]
    UnknownParameter(String),

    #[error("Internal error")]
    InternalError(#[from] DatabaseError),
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotFound(kind) => {
                ApiError::NotFound(format!("{} couldn't be found", kind.label()))
            }
            AccessError::Forbidden(_) => ApiError::Forbidden("Forbidden".to_string()),
            AccessError::UnknownParameter(name) => {
                tracing::error!("Route parameter '{}' is not in the entity table", name);
                ApiError::internal()
            }
            AccessError::InternalError(db_err) => {
                tracing::error!("Database error: {}", db_err);
                ApiError::internal()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPOSITORY
// ═══════════════════════════════════════════════════════════════════════════════

pub trait AccessRepository: Send + Sync + Clone {
    fn find_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<User>, DatabaseError>> + Send;

    fn find_memberships(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<GroupMember>, DatabaseError>> + Send;

    fn find_attendances(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<EventMember>, DatabaseError>> + Send;

    fn find_group(
        &self,
        group_id: i64,
    ) -> impl Future<Output = Result<Option<Group>, DatabaseError>> + Send;

    fn find_group_member(
        &self,
        member_id: i64,
    ) -> impl Future<Output = Result<Option<GroupMember>, DatabaseError>> + Send;

    fn find_venue(
        &self,
        venue_id: i64,
    ) -> impl Future<Output = Result<Option<Venue>, DatabaseError>> + Send;

    fn find_event(
        &self,
        event_id: i64,
    ) -> impl Future<Output = Result<Option<Event>, DatabaseError>> + Send;

    fn find_event_member(
        &self,
        event_member_id: i64,
    ) -> impl Future<Output = Result<Option<AttendanceRecord>, DatabaseError>> + Send;

    fn find_image(
        &self,
        image_id: i64,
    ) -> impl Future<Output = Result<Option<ImageRecord>, DatabaseError>> + Send;
}

impl AccessRepository for Postgre {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, username, email, first_name, last_name, created_at, updated_at
               FROM users
               WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_memberships(&self, user_id: i64) -> Result<Vec<GroupMember>, DatabaseError> {
        let memberships = sqlx::query_as::<_, GroupMember>(
            r#"SELECT id, user_id, group_id, role, created_at, updated_at
               FROM group_members
               WHERE user_id = $1
               ORDER BY id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    async fn find_attendances(&self, user_id: i64) -> Result<Vec<EventMember>, DatabaseError> {
        let attendances = sqlx::query_as::<_, EventMember>(
            r#"SELECT em.id, em.event_id, em.group_member_id, em.status, em.created_at, em.updated_at
               FROM event_members em
               INNER JOIN group_members gm ON gm.id = em.group_member_id
               WHERE gm.user_id = $1
               ORDER BY em.id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attendances)
    }

    async fn find_group(&self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups g WHERE g.id = $1",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn find_group_member(
        &self,
        member_id: i64,
    ) -> Result<Option<GroupMember>, DatabaseError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"SELECT id, user_id, group_id, role, created_at, updated_at
               FROM group_members
               WHERE id = $1"#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn find_venue(&self, venue_id: i64) -> Result<Option<Venue>, DatabaseError> {
        let venue = sqlx::query_as::<_, Venue>(
            r#"SELECT id, group_id, address, city, state, lat, lng
               FROM venues
               WHERE id = $1"#,
        )
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(venue)
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events e WHERE e.id = $1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_event_member(
        &self,
        event_member_id: i64,
    ) -> Result<Option<AttendanceRecord>, DatabaseError> {
        let attendance = sqlx::query_as::<_, EventMember>(
            r#"SELECT id, event_id, group_member_id, status, created_at, updated_at
               FROM event_members
               WHERE id = $1"#,
        )
        .bind(event_member_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(attendance) = attendance else {
            return Ok(None);
        };

        let group_id = sqlx::query_scalar::<_, i64>("SELECT group_id FROM events WHERE id = $1")
            .bind(attendance.event_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(AttendanceRecord {
            attendance,
            group_id,
        }))
    }

    async fn find_image(&self, image_id: i64) -> Result<Option<ImageRecord>, DatabaseError> {
        let image = sqlx::query_as::<_, Image>("SELECT id, url, preview FROM images WHERE id = $1")
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(image) = image else {
            return Ok(None);
        };

        let owner = find_image_owner(&self.pool, image.id).await?;

        Ok(Some(ImageRecord { image, owner }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCESS GRAPH WALKER
// ═══════════════════════════════════════════════════════════════════════════════

/// What the guard hands to a handler: the acting user, their qualifying
/// memberships, the resolved route entities and the narrowed id sets.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub user_id: i64,
    pub memberships: Vec<GroupMember>,
    pub attendances: Vec<EventMember>,
    pub valid_group_ids: BTreeSet<i64>,
    pub valid_event_ids: BTreeSet<i64>,
    pub entities: ResolvedEntities,
    /// Private groups owning a resolved entity. Denials under them read as not found.
    pub private_group_ids: BTreeSet<i64>,
}

impl AccessContext {
    /// Keeps only the memberships whose role is listed in `allowed_roles`,
    /// and the attendances made through them.
    pub fn new(
        user_id: i64,
        memberships: Vec<GroupMember>,
        attendances: Vec<EventMember>,
        allowed_roles: &[MemberRole],
        entities: ResolvedEntities,
    ) -> Self {
        let memberships: Vec<GroupMember> = memberships
            .into_iter()
            .filter(|m| m.user_id == user_id && allowed_roles.contains(&m.role))
            .collect();

        let member_ids: BTreeSet<i64> = memberships.iter().map(|m| m.id).collect();
        let attendances: Vec<EventMember> = attendances
            .into_iter()
            .filter(|a| member_ids.contains(&a.group_member_id))
            .collect();

        Self {
            user_id,
            valid_group_ids: memberships.iter().map(|m| m.group_id).collect(),
            valid_event_ids: attendances.iter().map(|a| a.event_id).collect(),
            memberships,
            attendances,
            entities,
            private_group_ids: BTreeSet::new(),
        }
    }

    pub fn with_private_groups(mut self, group_ids: BTreeSet<i64>) -> Self {
        self.private_group_ids = group_ids;
        self
    }

    /// Checks every resolved entity in path order. Each successful step
    /// narrows the valid ids to the owner it established.
    pub fn walk(self, target: Target) -> Result<Self, AccessError> {
        let entities = self.entities.clone();
        entities
            .iter()
            .try_fold(self, |context, entity| context.check(entity, target))
    }

    fn valid_ids(&self, target: Target) -> &BTreeSet<i64> {
        match target {
            Target::Group => &self.valid_group_ids,
            Target::Event => &self.valid_event_ids,
        }
    }

    fn narrowed(mut self, target: Target, ids: BTreeSet<i64>) -> Self {
        match target {
            Target::Group => self.valid_group_ids = ids,
            Target::Event => self.valid_event_ids = ids,
        }
        self
    }

    fn check(self, entity: &Entity, target: Target) -> Result<Self, AccessError> {
        if let Entity::User(other) = entity {
            return self.check_other_user(other, target);
        }

        let Some(owner) = entity.owner(target) else {
            return Err(AccessError::Forbidden(format!(
                "{} has no ownership path to the {:?}",
                entity.kind().label(),
                target
            )));
        };

        if !self.valid_ids(target).contains(&owner) {
            // Nothing under a private group is revealed to outsiders.
            let hidden = match entity {
                Entity::Group(group) => group.private,
                _ => entity
                    .owner(Target::Group)
                    .is_some_and(|group_id| self.private_group_ids.contains(&group_id)),
            };
            if hidden {
                return Err(AccessError::NotFound(entity.kind()));
            }
            return Err(AccessError::Forbidden(format!(
                "user {} lacks the required role on {:?} {}",
                self.user_id, target, owner
            )));
        }

        Ok(self.narrowed(target, BTreeSet::from([owner])))
    }

    /// The other user must share a group (or event) with the current valid
    /// set. Failure is reported as not found so memberships are not leaked.
    fn check_other_user(self, other: &UserRecord, target: Target) -> Result<Self, AccessError> {
        let shared: BTreeSet<i64> = match target {
            Target::Group => other
                .memberships
                .iter()
                .map(|m| m.group_id)
                .filter(|id| self.valid_group_ids.contains(id))
                .collect(),
            Target::Event => other
                .attendances
                .iter()
                .map(|a| a.event_id)
                .filter(|id| self.valid_event_ids.contains(id))
                .collect(),
        };

        if shared.is_empty() {
            return Err(AccessError::NotFound(EntityKind::User));
        }

        Ok(self.narrowed(target, shared))
    }

    pub fn role_in(&self, group_id: i64) -> Option<MemberRole> {
        self.memberships
            .iter()
            .find(|m| m.group_id == group_id)
            .map(|m| m.role)
    }

    pub fn group(&self) -> Option<&Group> {
        self.entities.group()
    }

    pub fn event(&self) -> Option<&Event> {
        self.entities.event()
    }

    pub fn venue(&self) -> Option<&Venue> {
        self.entities.venue()
    }

    pub fn other_user(&self) -> Option<&UserRecord> {
        self.entities.user()
    }

    pub fn image(&self) -> Option<&ImageRecord> {
        self.entities.image()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AccessService<R: AccessRepository> {
    repository: R,
}

impl<R: AccessRepository> AccessService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Entity Resolver: loads every `<entity>Id` route parameter by primary key.
    pub async fn resolve(
        &self,
        params: &[(String, String)],
    ) -> Result<ResolvedEntities, AccessError> {
        let mut resolved = ResolvedEntities::default();

        for (name, raw_id) in params {
            let kind = EntityKind::from_param(name)
                .ok_or_else(|| AccessError::UnknownParameter(name.clone()))?;

            if resolved.contains(kind) {
                continue;
            }

            let id: i64 = raw_id.parse().map_err(|_| AccessError::NotFound(kind))?;
            let entity = self.load(kind, id).await?.ok_or(AccessError::NotFound(kind))?;

            resolved = resolved.attach(entity);
        }

        Ok(resolved)
    }

    async fn load(&self, kind: EntityKind, id: i64) -> Result<Option<Entity>, DatabaseError> {
        let entity = match kind {
            EntityKind::User => match self.repository.find_user(id).await? {
                Some(user) => {
                    let memberships = self.repository.find_memberships(user.id).await?;
                    let attendances = self.repository.find_attendances(user.id).await?;
                    Some(Entity::User(UserRecord {
                        user,
                        memberships,
                        attendances,
                    }))
                }
                None => None,
            },
            EntityKind::Group => self.repository.find_group(id).await?.map(Entity::Group),
            EntityKind::GroupMember => self
                .repository
                .find_group_member(id)
                .await?
                .map(Entity::GroupMember),
            EntityKind::Venue => self.repository.find_venue(id).await?.map(Entity::Venue),
            EntityKind::Event => self.repository.find_event(id).await?.map(Entity::Event),
            EntityKind::EventMember => self
                .repository
                .find_event_member(id)
                .await?
                .map(Entity::EventMember),
            EntityKind::Image => self.repository.find_image(id).await?.map(Entity::Image),
        };

        Ok(entity)
    }

    /// Resolves the route entities, then walks them against the acting user's
    /// memberships. Missing entities fail before any role is looked at.
    pub async fn authorize(
        &self,
        user_id: i64,
        params: &[(String, String)],
        allowed_roles: &[MemberRole],
        target: Target,
    ) -> Result<AccessContext, AccessError> {
        let entities = self.resolve(params).await?;
        let private_groups = self.private_owners(&entities).await?;

        let memberships = self.repository.find_memberships(user_id).await?;
        let attendances = self.repository.find_attendances(user_id).await?;

        AccessContext::new(user_id, memberships, attendances, allowed_roles, entities)
            .with_private_groups(private_groups)
            .walk(target)
    }

    /// Owning groups of the resolved entities that are private.
    async fn private_owners(
        &self,
        entities: &ResolvedEntities,
    ) -> Result<BTreeSet<i64>, DatabaseError> {
        let mut private = BTreeSet::new();

        for entity in entities.iter() {
            let group_id = match entity {
                Entity::Group(group) => {
                    if group.private {
                        private.insert(group.id);
                    }
                    continue;
                }
                Entity::User(_) => continue,
                other => other.owner(Target::Group),
            };
            let Some(group_id) = group_id else { continue };
            if private.contains(&group_id) {
                continue;
            }
            if let Some(group) = self.repository.find_group(group_id).await? {
                if group.private {
                    private.insert(group_id);
                }
            }
        }

        Ok(private)
    }
}
