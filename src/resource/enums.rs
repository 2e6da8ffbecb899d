//! Enumerations and flag sets as they appear on the wire.
//!
//! Each enum is declared once through [`wire_enum!`], which produces the Rust
//! enum, the [`EnumDecl`] coercions look up by name, and a [`FromField`] impl.

use super::coerce::{Field, FromField};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Name/value table of a wire enum
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: &'static str,
    pub variants: &'static [(&'static str, i64)],
}

impl EnumDecl {
    pub fn by_value(&'static self, value: i64) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|&&(_, v)| v == value)
            .map(|&(name, value)| EnumValue {
                decl: self.name,
                name,
                value,
            })
    }

    pub fn by_name(&'static self, name: &str) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|&&(n, _)| n == name)
            .map(|&(name, value)| EnumValue {
                decl: self.name,
                name,
                value,
            })
    }
}

/// A decoded enum variant, not yet mapped to its Rust type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    pub decl: &'static str,
    pub name: &'static str,
    pub value: i64,
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $decl:ident = $tag:literal {
            $($variant:ident = $value:literal => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        pub static $decl: EnumDecl = EnumDecl {
            name: $tag,
            variants: &[$(($wire, $value)),+],
        };

        impl $name {
            /// Variant name on the wire
            pub fn wire_name(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Numeric value on the wire
            pub fn value(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl FromField for $name {
            fn from_field(field: Field) -> Result<Self> {
                match field {
                    Field::Enum(e) if e.decl == $tag => match e.name {
                        $($wire => Ok($name::$variant),)+
                        other => Err(Error::decode($tag, other)),
                    },
                    other => Err(Error::decode($tag, other.describe())),
                }
            }
        }
    };
}

wire_enum! {
    /// Built-in collection a user owns
    DefaultCollection as DEFAULT_COLLECTION = "default_collection" {
        None = 0 => "NONE",
        Home = 1 => "HOME",
        Downloads = 2 => "DOWNLOADS",
    }
}

wire_enum! {
    EnrollmentStatus as ENROLLMENT_STATUS = "enrollment_status" {
        Active = 1 => "ACTIVE",
        Expired = 2 => "EXPIRED",
        Invited = 3 => "INVITED",
        Requested = 4 => "REQUESTED",
        Archived = 5 => "ARCHIVED",
    }
}

wire_enum! {
    Gender as GENDER = "gender" {
        Male = 1 => "M",
        Female = 2 => "F",
    }
}

wire_enum! {
    GradeException as GRADE_EXCEPTION = "grade_exception" {
        None = 0 => "NONE",
        Excused = 1 => "EXCUSED",
        Incomplete = 2 => "INCOMPLETE",
    }
}

wire_enum! {
    GradeItemType as GRADE_ITEM_TYPE = "grade_item_type" {
        Assignment = 1 => "assignment",
        Assessment = 2 => "assessment",
        Discussion = 3 => "discussion",
        GradeColumn = 4 => "grade_column",
    }
}

wire_enum! {
    GradingScaleType as GRADING_SCALE_TYPE = "grading_scale_type" {
        Numeric = 0 => "NUMERIC",
        Percent = 1 => "PERCENT",
        Point = 3 => "POINT",
    }
}

wire_enum! {
    PrivacyLevel as PRIVACY_LEVEL = "privacy_level" {
        Everyone = 1 => "everyone",
        School = 2 => "school",
        Building = 3 => "building",
        Group = 4 => "group",
        Custom = 5 => "custom",
    }
}

wire_enum! {
    RoleType as ROLE_TYPE = "role_type" {
        Organization = 1 => "ORGANIZATION",
        Building = 2 => "BUILDING",
    }
}

wire_enum! {
    SubjectArea as SUBJECT_AREA = "subject_area" {
        Other = 0 => "OTHER",
        HealthAndPhysicalEducation = 1 => "HEALTH_AND_PHYSICAL_EDUCATION",
        Language = 2 => "LANGUAGE",
        Mathematics = 3 => "MATHEMATICS",
        ProfessionalDevelopment = 4 => "PROFESSIONAL_DEVELOPMENT",
        Science = 5 => "SCIENCE",
        SocialStudies = 6 => "SOCIAL_STUDIES",
        SpecialEducation = 7 => "SPECIAL_EDUCATION",
        Technology = 8 => "TECHNOLOGY",
        Arts = 9 => "ARTS",
    }
}

static ENUMS: &[&EnumDecl] = &[
    &DEFAULT_COLLECTION,
    &ENROLLMENT_STATUS,
    &GENDER,
    &GRADE_EXCEPTION,
    &GRADE_ITEM_TYPE,
    &GRADING_SCALE_TYPE,
    &PRIVACY_LEVEL,
    &ROLE_TYPE,
    &SUBJECT_AREA,
];

/// Look up an enum declaration by name
pub fn enum_decl(name: &str) -> Option<&'static EnumDecl> {
    ENUMS.iter().copied().find(|d| d.name == name)
}

/// Known flags of a flag-set field
#[derive(Debug, PartialEq, Eq)]
pub struct FlagDecl {
    pub name: &'static str,
    pub flags: &'static [&'static str],
}

pub static GROUP_OPTIONS: FlagDecl = FlagDecl {
    name: "group_options",
    flags: &[
        "member_post",
        "member_post_comment",
        "create_discussion",
        "create_files",
        "invite_type",
    ],
};

pub static USER_PERMISSIONS: FlagDecl = FlagDecl {
    name: "user_permissions",
    flags: &["is_directory_public", "allow_connections"],
};

static FLAG_SETS: &[&FlagDecl] = &[&GROUP_OPTIONS, &USER_PERMISSIONS];

/// Look up a flag-set declaration by name
pub fn flag_decl(name: &str) -> Option<&'static FlagDecl> {
    FLAG_SETS.iter().copied().find(|d| d.name == name)
}

/// Set of enabled flags, encoded on the wire as `{flag: 0|1, ...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet {
    decl: &'static FlagDecl,
    enabled: BTreeSet<&'static str>,
}

impl FlagSet {
    pub fn empty(decl: &'static FlagDecl) -> Self {
        Self {
            decl,
            enabled: BTreeSet::new(),
        }
    }

    /// Decode a mapping of flag name to truthy value.
    ///
    /// Only enabled flags must be known; unknown names that are off are skipped.
    pub fn decode(decl: &'static FlagDecl, map: &Map<String, Value>) -> Result<Self> {
        let mut set = Self::empty(decl);
        for (key, _) in map.iter().filter(|(_, v)| truthy(v)) {
            set.insert(key)?;
        }
        Ok(set)
    }

    /// Every known flag present as 0 or 1
    pub fn encode(&self) -> Map<String, Value> {
        self.decl
            .flags
            .iter()
            .map(|flag| {
                (
                    flag.to_string(),
                    Value::from(i64::from(self.enabled.contains(flag))),
                )
            })
            .collect()
    }

    pub fn insert(&mut self, flag: &str) -> Result<()> {
        let known = self
            .decl
            .flags
            .iter()
            .copied()
            .find(|f| *f == flag)
            .ok_or_else(|| Error::decode(self.decl.name, flag))?;
        self.enabled.insert(known);
        Ok(())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.enabled.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn decl(&self) -> &'static FlagDecl {
        self.decl
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", flags.join(", "))
    }
}

/// Truthiness of a flag value: `0`, `"0"`, `""`, `false` and `null` are off
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flag_set_decode_and_encode() {
        let wire = json!({ "member_post": 1, "create_files": 0 });
        let set = FlagSet::decode(&GROUP_OPTIONS, wire.as_object().unwrap()).unwrap();

        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["member_post"]);

        let encoded = set.encode();
        assert_eq!(encoded.len(), GROUP_OPTIONS.flags.len());
        assert_eq!(encoded["member_post"], 1);
        assert_eq!(encoded["create_files"], 0);
        assert_eq!(encoded["invite_type"], 0);
    }

    #[test]
    fn test_flag_set_string_values() {
        let wire = json!({ "is_directory_public": "1", "allow_connections": "0" });
        let set = FlagSet::decode(&USER_PERMISSIONS, wire.as_object().unwrap()).unwrap();
        assert!(set.contains("is_directory_public"));
        assert!(!set.contains("allow_connections"));
    }

    #[test]
    fn test_flag_set_rejects_unknown_enabled_flag() {
        let wire = json!({ "launch_rockets": 1 });
        assert!(FlagSet::decode(&GROUP_OPTIONS, wire.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_flag_set_skips_unknown_disabled_flag() {
        let wire = json!({ "member_post": 1, "launch_rockets": 0, "new_feature": "0" });
        let set = FlagSet::decode(&GROUP_OPTIONS, wire.as_object().unwrap()).unwrap();
        assert!(set.contains("member_post"));
        assert_eq!(set.encode().len(), GROUP_OPTIONS.flags.len());
        assert!(!set.encode().contains_key("launch_rockets"));
    }

    #[test]
    fn test_enum_lookup() {
        let status = ENROLLMENT_STATUS.by_value(3).unwrap();
        assert_eq!(status.name, "INVITED");
        assert!(ENROLLMENT_STATUS.by_value(9).is_none());

        let gender = GENDER.by_name("F").unwrap();
        assert_eq!(Gender::from_field(Field::Enum(gender)).unwrap(), Gender::Female);
    }

    #[test]
    fn test_enum_rejects_foreign_decl() {
        let value = GENDER.by_name("M").unwrap();
        assert!(EnrollmentStatus::from_field(Field::Enum(value)).is_err());
        assert!(EnrollmentStatus::from_field(Field::Int(1)).is_err());
    }

    #[test]
    fn test_decl_registry() {
        assert!(enum_decl("subject_area").is_some());
        assert!(enum_decl("nope").is_none());
        assert!(flag_decl("group_options").is_some());
        assert_eq!(SubjectArea::Mathematics.value(), 3);
        assert_eq!(PrivacyLevel::Group.wire_name(), "group");
    }
}
