use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role of a user inside a group. Closed set, stored as the `member_role` enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
    sqlx::Type,
)]
#[sqlx(type_name = "member_role", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum MemberRole {
    Organizer,
    CoHost,
    Member,
    Pending,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Organizer => "organizer",
            MemberRole::CoHost => "co-host",
            MemberRole::Member => "member",
            MemberRole::Pending => "pending",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, MemberRole::Organizer | MemberRole::CoHost)
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(MemberRole::Organizer),
            "co-host" => Ok(MemberRole::CoHost),
            "member" => Ok(MemberRole::Member),
            "pending" => Ok(MemberRole::Pending),
            other => Err(format!("not a valid role for group member: {}", other)),
        }
    }
}

// Role sets handed to the route guard. Flat lists: a role not listed is denied
// even if it ranks higher.
pub const ORGANIZER: &[MemberRole] = &[MemberRole::Organizer];
pub const ORGANIZER_OR_CO_HOST: &[MemberRole] = &[MemberRole::Organizer, MemberRole::CoHost];
pub const ACTIVE_MEMBER: &[MemberRole] =
    &[MemberRole::Organizer, MemberRole::CoHost, MemberRole::Member];
pub const ANY_MEMBER: &[MemberRole] = &[
    MemberRole::Organizer,
    MemberRole::CoHost,
    MemberRole::Member,
    MemberRole::Pending,
];

/// Attendance state of an event member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Waitlist,
    Attending,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Waitlist => "waitlist",
            AttendanceStatus::Attending => "attending",
        }
    }

    /// Statuses counted by `Event::num_attending`.
    pub fn holds_seat(&self) -> bool {
        matches!(self, AttendanceStatus::Pending | AttendanceStatus::Attending)
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared by groups and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "group_type")]
pub enum MeetingType {
    Online,
    #[sqlx(rename = "In person")]
    #[serde(rename = "In person")]
    InPerson,
}

impl MeetingType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Online" => Some(MeetingType::Online),
            "In person" => Some(MeetingType::InPerson),
            _ => None,
        }
    }
}

/// Plain `{"message": ...}` success body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn deleted() -> Self {
        Self::new("Successfully deleted")
    }
}
