//! In-memory repositories for unit tests.
//!
//! A transaction owns the whole store lock, so concurrent transactions run one
//! after another the way row locks serialise them in Postgres. Dropping an
//! uncommitted transaction restores the state it started from.

use std::collections::BTreeMap;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::access::{AccessRepository, AttendanceRecord, ImageRecord};
use crate::attendance::{AttendanceRepository, AttendanceTransaction, AttendeeRow, EventMember};
use crate::error::DatabaseError;
use crate::event::{
    Event, EventGroup, EventRepository, EventSummary, EventTransaction, GroupLabel, NewEvent,
    Page, VenueLabel,
};
use crate::group::{Group, GroupRepository, GroupSummary, GroupTransaction, NewGroup, Organizer};
use crate::image::{Attachment, Image, ImageOwner, ImageRepository, ImageTransaction, NewImage};
use crate::managers::{LogEntry, LogError, LogManager};
use crate::membership::{GroupMember, MemberRow, MembershipRepository, MembershipTransaction};
use crate::model::{AttendanceStatus, MeetingType, MemberRole};
use crate::user::{Credentials, NewUser, User, UserRepository, UserTransaction};
use crate::venue::{NewVenue, Venue, VenueRepository, VenueTransaction};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct StoredUser {
    user: User,
    hashed_password: String,
}

#[derive(Clone)]
struct StoredImage {
    image: Image,
    owner: Attachment,
}

#[derive(Clone, Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, StoredUser>,
    groups: BTreeMap<i64, Group>,
    members: BTreeMap<i64, GroupMember>,
    venues: BTreeMap<i64, Venue>,
    events: BTreeMap<i64, Event>,
    attendances: BTreeMap<i64, EventMember>,
    images: BTreeMap<i64, StoredImage>,
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn unique(constraint: &str) -> DatabaseError {
    DatabaseError::UniqueConstraintViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryState {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn group(&self, group_id: i64) -> Option<Group> {
        let mut group = self.groups.get(&group_id)?.clone();
        group.num_members = self
            .members
            .values()
            .filter(|m| m.group_id == group_id && m.role != MemberRole::Pending)
            .count() as i64;
        Some(group)
    }

    fn member_of(&self, group_id: i64, user_id: i64) -> Option<GroupMember> {
        self.members
            .values()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned()
    }

    fn insert_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<GroupMember, DatabaseError> {
        if self.member_of(group_id, user_id).is_some() {
            return Err(unique("unique_group_member"));
        }
        let member = GroupMember {
            id: self.id(),
            user_id,
            group_id,
            role,
            created_at: now(),
            updated_at: now(),
        };
        self.members.insert(member.id, member.clone());
        Ok(member)
    }

    fn preview_of(&self, owner: Attachment) -> Option<String> {
        self.images
            .values()
            .rev()
            .find(|stored| stored.owner == owner && stored.image.preview)
            .map(|stored| stored.image.url.clone())
    }

    fn images_of(&self, owner: Attachment) -> Vec<Image> {
        self.images
            .values()
            .filter(|stored| stored.owner == owner)
            .map(|stored| stored.image.clone())
            .collect()
    }

    fn image_owner(&self, image_id: i64) -> Option<ImageOwner> {
        match self.images.get(&image_id)?.owner {
            Attachment::Group(group_id) => Some(ImageOwner::Group { group_id }),
            Attachment::Event(event_id) => self.events.get(&event_id).map(|e| ImageOwner::Event {
                event_id,
                group_id: e.group_id,
            }),
        }
    }

    fn insert_image(&mut self, owner: Attachment, image: &NewImage) -> Image {
        if image.preview {
            for stored in self.images.values_mut().filter(|s| s.owner == owner) {
                stored.image.preview = false;
            }
        }
        let created = Image {
            id: self.id(),
            url: image.url.clone(),
            preview: image.preview,
        };
        self.images.insert(
            created.id,
            StoredImage {
                image: created.clone(),
                owner,
            },
        );
        created
    }

    fn summary(&self, event: &Event) -> Option<EventSummary> {
        let group = self.groups.get(&event.group_id)?;
        let venue = event
            .venue_id
            .and_then(|id| self.venues.get(&id))
            .map(|v| VenueLabel {
                id: v.id,
                city: v.city.clone(),
                state: v.state.clone(),
            });
        Some(EventSummary {
            event: event.clone(),
            preview_image: self.preview_of(Attachment::Event(event.id)),
            group: GroupLabel {
                id: group.id,
                name: group.name.clone(),
                city: group.city.clone(),
                state: group.state.clone(),
            },
            venue,
        })
    }

    fn group_summary(&self, group_id: i64) -> Option<GroupSummary> {
        Some(GroupSummary {
            group: self.group(group_id)?,
            preview_image: self.preview_of(Attachment::Group(group_id)),
        })
    }

    fn adjust_seats(&mut self, event_id: i64, delta: i32) -> Result<(), DatabaseError> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(DatabaseError::RowNotFound)?;
        let seats = event.num_attending + delta;
        if seats < 0 || seats > event.capacity {
            return Err(DatabaseError::CheckConstraintViolation {
                constraint: "num_attending_within_capacity".to_string(),
            });
        }
        event.num_attending = seats;
        event.updated_at = now();
        Ok(())
    }

    fn delete_member(&mut self, member_id: i64) -> bool {
        self.attendances.retain(|_, a| a.group_member_id != member_id);
        self.members.remove(&member_id).is_some()
    }

    fn delete_event(&mut self, event_id: i64) -> bool {
        self.images
            .retain(|_, stored| stored.owner != Attachment::Event(event_id));
        self.attendances.retain(|_, a| a.event_id != event_id);
        self.events.remove(&event_id).is_some()
    }

    fn delete_group(&mut self, group_id: i64) -> bool {
        let events: Vec<i64> = self
            .events
            .values()
            .filter(|e| e.group_id == group_id)
            .map(|e| e.id)
            .collect();
        for event_id in events {
            self.delete_event(event_id);
        }
        let members: Vec<i64> = self
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.id)
            .collect();
        for member_id in members {
            self.delete_member(member_id);
        }
        self.venues.retain(|_, v| v.group_id != group_id);
        self.images
            .retain(|_, stored| stored.owner != Attachment::Group(group_id));
        self.groups.remove(&group_id).is_some()
    }

    fn attendance_of(&self, event_id: i64, user_id: i64) -> Option<EventMember> {
        self.attendances
            .values()
            .find(|a| {
                a.event_id == event_id
                    && self
                        .members
                        .get(&a.group_member_id)
                        .is_some_and(|m| m.user_id == user_id)
            })
            .cloned()
    }

    fn role_of(&self, group_id: i64, user_id: i64) -> Option<MemberRole> {
        self.member_of(group_id, user_id).map(|m| m.role)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

pub struct MemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl MemoryTransaction {
    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

macro_rules! memory_transactions {
    () => {
        type Transaction = MemoryTransaction;

        async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
            Ok(self.open().await)
        }

        async fn commit(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
            transaction.commit();
            Ok(())
        }

        async fn rollback(&self, transaction: Self::Transaction) -> Result<(), DatabaseError> {
            drop(transaction);
            Ok(())
        }
    };
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self) -> MemoryTransaction {
        let state = self.state.clone().lock_owned().await;
        let snapshot = Some(state.clone());
        MemoryTransaction { state, snapshot }
    }

    // Seeding

    pub async fn seed_user(&self, username: &str) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.id();
        let user = User {
            id,
            username: username.to_string(),
            email: format!("{}{}@user.io", username.to_lowercase(), id),
            first_name: username.to_string(),
            last_name: "Seeded".to_string(),
            created_at: now(),
            updated_at: now(),
        };
        state.users.insert(
            id,
            StoredUser {
                user,
                hashed_password: String::new(),
            },
        );
        id
    }

    /// Creates the group together with its organizer membership.
    pub async fn seed_group(&self, organizer_id: i64, private: bool) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.id();
        state.groups.insert(
            id,
            Group {
                id,
                organizer_id,
                name: format!("Group {}", id),
                about: Some("A seeded group that meets every week to run along the river.".to_string()),
                group_type: MeetingType::InPerson,
                private,
                city: "Austin".to_string(),
                state: "TX".to_string(),
                num_members: 0,
                created_at: now(),
                updated_at: now(),
            },
        );
        let _ = state.insert_member(id, organizer_id, MemberRole::Organizer);
        id
    }

    /// Returns the membership id.
    pub async fn seed_member(&self, group_id: i64, user_id: i64, role: MemberRole) -> i64 {
        let mut state = self.state.lock().await;
        match state.insert_member(group_id, user_id, role) {
            Ok(member) => member.id,
            Err(_) => panic!("user {} already belongs to group {}", user_id, group_id),
        }
    }

    pub async fn seed_venue(&self, group_id: i64) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.id();
        state.venues.insert(
            id,
            Venue {
                id,
                group_id,
                address: "123 Disney Lane".to_string(),
                city: "New York".to_string(),
                state: "NY".to_string(),
                lat: 37.7645358,
                lng: -122.4730327,
            },
        );
        id
    }

    /// A week out, two hours long.
    pub async fn seed_event(&self, group_id: i64, capacity: i32) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.id();
        let start_date = now() + Duration::days(7);
        state.events.insert(
            id,
            Event {
                id,
                group_id,
                venue_id: None,
                name: format!("Seeded event {}", id),
                description: "A seeded event".to_string(),
                event_type: MeetingType::Online,
                capacity,
                price: 0.0,
                num_attending: 0,
                start_date,
                end_date: start_date + Duration::hours(2),
                created_at: now(),
                updated_at: now(),
            },
        );
        id
    }

    /// Seat-holding statuses take a seat on the event.
    pub async fn seed_attendance(
        &self,
        event_id: i64,
        group_member_id: i64,
        status: AttendanceStatus,
    ) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.id();
        state.attendances.insert(
            id,
            EventMember {
                id,
                event_id,
                group_member_id,
                status,
                created_at: now(),
                updated_at: now(),
            },
        );
        if status.holds_seat() {
            if let Err(e) = state.adjust_seats(event_id, 1) {
                panic!("cannot seat attendance on event {}: {}", event_id, e);
            }
        }
        id
    }

    pub async fn seed_event_image(&self, event_id: i64) -> i64 {
        let mut state = self.state.lock().await;
        state
            .insert_image(
                Attachment::Event(event_id),
                &NewImage {
                    url: format!("https://img.test/events/{}.png", event_id),
                    preview: false,
                },
            )
            .id
    }

    // Inspection

    pub async fn group_members(&self, group_id: i64) -> Vec<GroupMember> {
        let state = self.state.lock().await;
        state
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect()
    }

    pub async fn venue(&self, venue_id: i64) -> Option<Venue> {
        self.state.lock().await.venues.get(&venue_id).cloned()
    }

    pub async fn event(&self, event_id: i64) -> Option<Event> {
        self.state.lock().await.events.get(&event_id).cloned()
    }

    pub async fn attendances_of_event(&self, event_id: i64) -> Vec<EventMember> {
        let state = self.state.lock().await;
        state
            .attendances
            .values()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect()
    }

    pub async fn group_images(&self, group_id: i64) -> Vec<Image> {
        self.state.lock().await.images_of(Attachment::Group(group_id))
    }

    pub async fn image_count(&self) -> usize {
        self.state.lock().await.images.len()
    }
}

/// A public group with its organizer and one plain member.
pub struct Seed {
    pub organizer: i64,
    pub member: i64,
    pub group: i64,
    pub membership: i64,
}

impl Seed {
    pub async fn group_with_member(store: &MemoryStore) -> Seed {
        let organizer = store.seed_user("organizer").await;
        let member = store.seed_user("member").await;
        let group = store.seed_group(organizer, false).await;
        let membership = store.seed_member(group, member, MemberRole::Member).await;

        Seed {
            organizer,
            member,
            group,
            membership,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCESS
// ═══════════════════════════════════════════════════════════════════════════════

impl AccessRepository for MemoryStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).map(|stored| stored.user.clone()))
    }

    async fn find_memberships(&self, user_id: i64) -> Result<Vec<GroupMember>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_attendances(&self, user_id: i64) -> Result<Vec<EventMember>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .attendances
            .values()
            .filter(|a| {
                state
                    .members
                    .get(&a.group_member_id)
                    .is_some_and(|m| m.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn find_group(&self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        Ok(self.state.lock().await.group(group_id))
    }

    async fn find_group_member(&self, member_id: i64) -> Result<Option<GroupMember>, DatabaseError> {
        Ok(self.state.lock().await.members.get(&member_id).cloned())
    }

    async fn find_venue(&self, venue_id: i64) -> Result<Option<Venue>, DatabaseError> {
        Ok(self.state.lock().await.venues.get(&venue_id).cloned())
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn find_event_member(
        &self,
        event_member_id: i64,
    ) -> Result<Option<AttendanceRecord>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.attendances.get(&event_member_id).and_then(|attendance| {
            state.events.get(&attendance.event_id).map(|event| AttendanceRecord {
                attendance: attendance.clone(),
                group_id: event.group_id,
            })
        }))
    }

    async fn find_image(&self, image_id: i64) -> Result<Option<ImageRecord>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.images.get(&image_id).map(|stored| ImageRecord {
            image: stored.image.clone(),
            owner: state.image_owner(image_id),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// USERS
// ═══════════════════════════════════════════════════════════════════════════════

impl UserTransaction for MemoryTransaction {
    async fn create_user(&mut self, user: &NewUser, hashed_password: &str) -> Result<User, DatabaseError> {
        let state = &mut *self.state;
        if state.users.values().any(|u| u.user.email == user.email) {
            return Err(unique("unique_email"));
        }
        if state.users.values().any(|u| u.user.username == user.username) {
            return Err(unique("unique_username"));
        }

        let created = User {
            id: state.id(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: now(),
            updated_at: now(),
        };
        state.users.insert(
            created.id,
            StoredUser {
                user: created.clone(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(created)
    }
}

impl UserRepository for MemoryStore {
    memory_transactions!();

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).map(|stored| stored.user.clone()))
    }

    async fn find_credentials(&self, credential: &str) -> Result<Option<Credentials>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|stored| stored.user.username == credential || stored.user.email == credential)
            .map(|stored| Credentials {
                id: stored.user.id,
                hashed_password: stored.hashed_password.clone(),
            }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMAGES
// ═══════════════════════════════════════════════════════════════════════════════

impl ImageTransaction for MemoryTransaction {
    async fn attach_image(&mut self, attachment: Attachment, image: &NewImage) -> Result<Image, DatabaseError> {
        Ok(self.state.insert_image(attachment, image))
    }

    async fn find_owner(&mut self, image_id: i64) -> Result<Option<ImageOwner>, DatabaseError> {
        Ok(self.state.image_owner(image_id))
    }

    async fn delete_image(&mut self, image_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.images.remove(&image_id).is_some())
    }
}

impl ImageRepository for MemoryStore {
    memory_transactions!();
}

// ═══════════════════════════════════════════════════════════════════════════════
// VENUES
// ═══════════════════════════════════════════════════════════════════════════════

impl VenueTransaction for MemoryTransaction {
    async fn create_venue(&mut self, group_id: i64, venue: &NewVenue) -> Result<Venue, DatabaseError> {
        if !self.state.groups.contains_key(&group_id) {
            return Err(DatabaseError::ForeignKeyViolation {
                constraint: "venues_group_id_fkey".to_string(),
            });
        }
        let created = Venue {
            id: self.state.id(),
            group_id,
            address: venue.address.clone(),
            city: venue.city.clone(),
            state: venue.state.clone(),
            lat: venue.lat,
            lng: venue.lng,
        };
        self.state.venues.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_venue(&mut self, venue_id: i64, venue: &NewVenue) -> Result<Option<Venue>, DatabaseError> {
        Ok(self.state.venues.get_mut(&venue_id).map(|stored| {
            stored.address = venue.address.clone();
            stored.city = venue.city.clone();
            stored.state = venue.state.clone();
            stored.lat = venue.lat;
            stored.lng = venue.lng;
            stored.clone()
        }))
    }
}

impl VenueRepository for MemoryStore {
    memory_transactions!();

    async fn find_venues(&self, group_id: i64) -> Result<Vec<Venue>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .venues
            .values()
            .filter(|v| v.group_id == group_id)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GROUPS
// ═══════════════════════════════════════════════════════════════════════════════

impl GroupTransaction for MemoryTransaction {
    async fn create_group(&mut self, organizer_id: i64, group: &NewGroup) -> Result<i64, DatabaseError> {
        let id = self.state.id();
        self.state.groups.insert(
            id,
            Group {
                id,
                organizer_id,
                name: group.name.clone(),
                about: Some(group.about.clone()),
                group_type: group.group_type,
                private: group.private,
                city: group.city.clone(),
                state: group.state.clone(),
                num_members: 0,
                created_at: now(),
                updated_at: now(),
            },
        );
        Ok(id)
    }

    async fn add_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<GroupMember, DatabaseError> {
        self.state.insert_member(group_id, user_id, role)
    }

    async fn attach_group_image(&mut self, group_id: i64, image: &NewImage) -> Result<Image, DatabaseError> {
        Ok(self.state.insert_image(Attachment::Group(group_id), image))
    }

    async fn fetch_group(&mut self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        Ok(self.state.group(group_id))
    }

    async fn update_group(&mut self, group_id: i64, group: &NewGroup) -> Result<bool, DatabaseError> {
        Ok(match self.state.groups.get_mut(&group_id) {
            Some(stored) => {
                stored.name = group.name.clone();
                stored.about = Some(group.about.clone());
                stored.group_type = group.group_type;
                stored.private = group.private;
                stored.city = group.city.clone();
                stored.state = group.state.clone();
                stored.updated_at = now();
                true
            }
            None => false,
        })
    }

    async fn delete_group(&mut self, group_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.delete_group(group_id))
    }
}

impl GroupRepository for MemoryStore {
    memory_transactions!();

    async fn find_all_groups(&self) -> Result<Vec<GroupSummary>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .keys()
            .filter_map(|&id| state.group_summary(id))
            .collect())
    }

    async fn find_user_groups(&self, user_id: i64) -> Result<Vec<GroupSummary>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .values()
            .filter(|g| g.organizer_id == user_id || state.member_of(g.id, user_id).is_some())
            .filter_map(|g| state.group_summary(g.id))
            .collect())
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<Group>, DatabaseError> {
        Ok(self.state.lock().await.group(group_id))
    }

    async fn find_group_images(&self, group_id: i64) -> Result<Vec<Image>, DatabaseError> {
        Ok(self.state.lock().await.images_of(Attachment::Group(group_id)))
    }

    async fn find_organizer(&self, user_id: i64) -> Result<Option<Organizer>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).map(|stored| Organizer {
            id: stored.user.id,
            first_name: stored.user.first_name.clone(),
            last_name: stored.user.last_name.clone(),
        }))
    }

    async fn find_group_venues(&self, group_id: i64) -> Result<Vec<Venue>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .venues
            .values()
            .filter(|v| v.group_id == group_id)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBERSHIPS
// ═══════════════════════════════════════════════════════════════════════════════

impl MembershipTransaction for MemoryTransaction {
    async fn group_exists(&mut self, group_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.groups.contains_key(&group_id))
    }

    async fn user_exists(&mut self, user_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.users.contains_key(&user_id))
    }

    async fn lock_seated_events(&mut self, group_id: i64, user_id: i64) -> Result<Vec<i64>, DatabaseError> {
        let Some(member) = self.state.member_of(group_id, user_id) else {
            return Ok(Vec::new());
        };
        let mut events: Vec<i64> = self
            .state
            .attendances
            .values()
            .filter(|a| a.group_member_id == member.id)
            .map(|a| a.event_id)
            .collect();
        events.sort_unstable();
        events.dedup();
        Ok(events)
    }

    async fn find_member(&mut self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>, DatabaseError> {
        Ok(self.state.member_of(group_id, user_id))
    }

    async fn insert_member(
        &mut self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<GroupMember, DatabaseError> {
        self.state.insert_member(group_id, user_id, role)
    }

    async fn update_role(&mut self, member_id: i64, role: MemberRole) -> Result<GroupMember, DatabaseError> {
        let member = self
            .state
            .members
            .get_mut(&member_id)
            .ok_or(DatabaseError::RowNotFound)?;
        member.role = role;
        member.updated_at = now();
        Ok(member.clone())
    }

    async fn release_seats(&mut self, member_id: i64) -> Result<u64, DatabaseError> {
        let seated: Vec<i64> = self
            .state
            .attendances
            .values()
            .filter(|a| a.group_member_id == member_id && a.status.holds_seat())
            .map(|a| a.event_id)
            .collect();
        for event_id in &seated {
            if let Some(event) = self.state.events.get_mut(event_id) {
                event.num_attending = (event.num_attending - 1).max(0);
            }
        }
        Ok(seated.len() as u64)
    }

    async fn delete_member(&mut self, member_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.delete_member(member_id))
    }
}

impl MembershipRepository for MemoryStore {
    memory_transactions!();

    async fn group_exists(&self, group_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.lock().await.groups.contains_key(&group_id))
    }

    async fn find_membership_role(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<MemberRole>, DatabaseError> {
        Ok(self.state.lock().await.role_of(group_id, user_id))
    }

    async fn find_members(&self, group_id: i64, include_pending: bool) -> Result<Vec<MemberRow>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.group_id == group_id && (include_pending || m.role != MemberRole::Pending))
            .filter_map(|m| {
                state.users.get(&m.user_id).map(|stored| MemberRow {
                    id: stored.user.id,
                    first_name: stored.user.first_name.clone(),
                    last_name: stored.user.last_name.clone(),
                    role: m.role,
                })
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

impl EventTransaction for MemoryTransaction {
    async fn venue_group(&mut self, venue_id: i64) -> Result<Option<i64>, DatabaseError> {
        Ok(self.state.venues.get(&venue_id).map(|v| v.group_id))
    }

    async fn insert_event(&mut self, group_id: i64, event: &NewEvent) -> Result<Event, DatabaseError> {
        let created = Event {
            id: self.state.id(),
            group_id,
            venue_id: event.venue_id,
            name: event.name.clone(),
            description: event.description.clone(),
            event_type: event.event_type,
            capacity: event.capacity,
            price: event.price,
            num_attending: 0,
            start_date: event.start_date,
            end_date: event.end_date,
            created_at: now(),
            updated_at: now(),
        };
        self.state.events.insert(created.id, created.clone());
        Ok(created)
    }

    async fn attach_event_image(&mut self, event_id: i64, image: &NewImage) -> Result<Image, DatabaseError> {
        Ok(self.state.insert_image(Attachment::Event(event_id), image))
    }

    async fn lock_event(&mut self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        Ok(self.state.events.get(&event_id).cloned())
    }

    async fn update_event(&mut self, event_id: i64, event: &NewEvent) -> Result<Event, DatabaseError> {
        let stored = self
            .state
            .events
            .get_mut(&event_id)
            .ok_or(DatabaseError::RowNotFound)?;
        if event.capacity < stored.num_attending {
            return Err(DatabaseError::CheckConstraintViolation {
                constraint: "num_attending_within_capacity".to_string(),
            });
        }
        stored.venue_id = event.venue_id;
        stored.name = event.name.clone();
        stored.description = event.description.clone();
        stored.event_type = event.event_type;
        stored.capacity = event.capacity;
        stored.price = event.price;
        stored.start_date = event.start_date;
        stored.end_date = event.end_date;
        stored.updated_at = now();
        Ok(stored.clone())
    }

    async fn delete_event(&mut self, event_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.delete_event(event_id))
    }
}

impl EventRepository for MemoryStore {
    memory_transactions!();

    async fn find_events(&self, page: Page) -> Result<Vec<EventSummary>, DatabaseError> {
        let state = self.state.lock().await;
        let mut events: Vec<&Event> = state.events.values().collect();
        events.sort_by_key(|e| (e.start_date, e.id));
        Ok(events
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .filter_map(|e| state.summary(e))
            .collect())
    }

    async fn find_group_events(&self, group_id: i64) -> Result<Vec<EventSummary>, DatabaseError> {
        let state = self.state.lock().await;
        let mut events: Vec<&Event> = state
            .events
            .values()
            .filter(|e| e.group_id == group_id)
            .collect();
        events.sort_by_key(|e| (e.start_date, e.id));
        Ok(events.into_iter().filter_map(|e| state.summary(e)).collect())
    }

    async fn has_group(&self, group_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.lock().await.groups.contains_key(&group_id))
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn event_group(&self, group_id: i64) -> Result<Option<EventGroup>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state.groups.get(&group_id).map(|g| EventGroup {
            id: g.id,
            name: g.name.clone(),
            private: g.private,
            city: g.city.clone(),
            state: g.state.clone(),
        }))
    }

    async fn event_venue(&self, venue_id: i64) -> Result<Option<Venue>, DatabaseError> {
        Ok(self.state.lock().await.venues.get(&venue_id).cloned())
    }

    async fn find_event_images(&self, event_id: i64) -> Result<Vec<Image>, DatabaseError> {
        Ok(self.state.lock().await.images_of(Attachment::Event(event_id)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTENDANCE
// ═══════════════════════════════════════════════════════════════════════════════

impl AttendanceTransaction for MemoryTransaction {
    async fn lock_event(&mut self, event_id: i64) -> Result<Option<Event>, DatabaseError> {
        Ok(self.state.events.get(&event_id).cloned())
    }

    async fn find_membership(&mut self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>, DatabaseError> {
        Ok(self.state.member_of(group_id, user_id))
    }

    async fn find_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
    ) -> Result<Option<EventMember>, DatabaseError> {
        Ok(self
            .state
            .attendances
            .values()
            .find(|a| a.event_id == event_id && a.group_member_id == group_member_id)
            .cloned())
    }

    async fn insert_attendance(
        &mut self,
        event_id: i64,
        group_member_id: i64,
        status: AttendanceStatus,
    ) -> Result<EventMember, DatabaseError> {
        let taken = self
            .state
            .attendances
            .values()
            .any(|a| a.event_id == event_id && a.group_member_id == group_member_id);
        if taken {
            return Err(unique("unique_event_member"));
        }
        let created = EventMember {
            id: self.state.id(),
            event_id,
            group_member_id,
            status,
            created_at: now(),
            updated_at: now(),
        };
        self.state.attendances.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_attendance(
        &mut self,
        attendance_id: i64,
        status: AttendanceStatus,
    ) -> Result<EventMember, DatabaseError> {
        let attendance = self
            .state
            .attendances
            .get_mut(&attendance_id)
            .ok_or(DatabaseError::RowNotFound)?;
        attendance.status = status;
        attendance.updated_at = now();
        Ok(attendance.clone())
    }

    async fn delete_attendance(&mut self, attendance_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.state.attendances.remove(&attendance_id).is_some())
    }

    async fn adjust_seats(&mut self, event_id: i64, delta: i32) -> Result<(), DatabaseError> {
        self.state.adjust_seats(event_id, delta)
    }
}

impl AttendanceRepository for MemoryStore {
    memory_transactions!();

    async fn event_group_id(&self, event_id: i64) -> Result<Option<i64>, DatabaseError> {
        Ok(self.state.lock().await.events.get(&event_id).map(|e| e.group_id))
    }

    async fn find_viewer_role(&self, group_id: i64, user_id: i64) -> Result<Option<MemberRole>, DatabaseError> {
        Ok(self.state.lock().await.role_of(group_id, user_id))
    }

    async fn find_attendees(&self, event_id: i64, include_pending: bool) -> Result<Vec<AttendeeRow>, DatabaseError> {
        let state = self.state.lock().await;
        Ok(state
            .attendances
            .values()
            .filter(|a| a.event_id == event_id)
            .filter(|a| include_pending || a.status != AttendanceStatus::Pending)
            .filter_map(|a| {
                let member = state.members.get(&a.group_member_id)?;
                let stored = state.users.get(&member.user_id)?;
                Some(AttendeeRow {
                    id: stored.user.id,
                    first_name: stored.user.first_name.clone(),
                    last_name: stored.user.last_name.clone(),
                    status: a.status,
                })
            })
            .collect())
    }

    async fn find_user_attendance(&self, event_id: i64, user_id: i64) -> Result<Option<EventMember>, DatabaseError> {
        Ok(self.state.lock().await.attendance_of(event_id, user_id))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Keeps audit entries in memory.
#[derive(Clone, Default)]
pub struct MemoryLogManager {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLogManager {
    pub async fn categories(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        entries.iter().map(|e| e.category.clone()).collect()
    }
}

impl LogManager for MemoryLogManager {
    async fn log_entry(&self, log: String, category: &'static str) -> Result<LogEntry, LogError> {
        let entry = LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            log,
            date: now(),
            category: category.to_string(),
        };
        self.entries.lock().await.push(entry.clone());
        Ok(entry)
    }
}
