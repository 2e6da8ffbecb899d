//! The closed set of resource types.

use std::fmt;
use std::str::FromStr;

/// Every resource type the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    School,
    Building,
    Role,
    Group,
    User,
    GradingPeriod,
    Course,
    Section,
    Enrollment,
    Collection,
    Assignment,
    Grade,
    Message,
    MessageThread,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::School,
        ResourceKind::Building,
        ResourceKind::Role,
        ResourceKind::Group,
        ResourceKind::User,
        ResourceKind::GradingPeriod,
        ResourceKind::Course,
        ResourceKind::Section,
        ResourceKind::Enrollment,
        ResourceKind::Collection,
        ResourceKind::Assignment,
        ResourceKind::Grade,
        ResourceKind::Message,
        ResourceKind::MessageThread,
    ];

    /// Key used in resource declarations
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::School => "school",
            ResourceKind::Building => "building",
            ResourceKind::Role => "role",
            ResourceKind::Group => "group",
            ResourceKind::User => "user",
            ResourceKind::GradingPeriod => "grading_period",
            ResourceKind::Course => "course",
            ResourceKind::Section => "section",
            ResourceKind::Enrollment => "enrollment",
            ResourceKind::Collection => "collection",
            ResourceKind::Assignment => "assignment",
            ResourceKind::Grade => "grade",
            ResourceKind::Message => "message",
            ResourceKind::MessageThread => "message_thread",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Tag the API uses when this type owns other resources.
    ///
    /// Buildings share the `school` tag. Types without a tag cannot be realms.
    pub fn realm_tag(self) -> Option<&'static str> {
        match self {
            ResourceKind::School | ResourceKind::Building => Some("school"),
            ResourceKind::Role => Some("role"),
            ResourceKind::Group => Some("group"),
            ResourceKind::User => Some("user"),
            ResourceKind::GradingPeriod => Some("gradingperiod"),
            ResourceKind::Course => Some("course"),
            ResourceKind::Section => Some("section"),
            ResourceKind::Collection => Some("collection"),
            ResourceKind::Enrollment
            | ResourceKind::Assignment
            | ResourceKind::Grade
            | ResourceKind::Message
            | ResourceKind::MessageThread => None,
        }
    }

    /// Map a realm tag from the wire back to a type
    pub fn from_realm_tag(tag: &str) -> Option<Self> {
        match tag {
            "school" => Some(ResourceKind::School),
            "building" => Some(ResourceKind::Building),
            "role" => Some(ResourceKind::Role),
            "group" => Some(ResourceKind::Group),
            "user" => Some(ResourceKind::User),
            "gradingperiod" => Some(ResourceKind::GradingPeriod),
            "course" => Some(ResourceKind::Course),
            "section" => Some(ResourceKind::Section),
            "collection" => Some(ResourceKind::Collection),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown resource type: {}", s))
    }
}
