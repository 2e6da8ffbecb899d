//! Coercion Library
//!
//! Pure conversions from raw wire values to typed [`Field`]s. A property's
//! chain is applied left to right; `null` short-circuits the whole chain.
//!
//! Numeric fields frequently arrive as strings, so every numeric coercion
//! accepts both.

use super::enums::{enum_decl, flag_decl, EnumDecl, EnumValue, FlagDecl, FlagSet};
use super::identity::{Identity, Realm, RefTarget, ResourceRef};
use super::kind::ResourceKind;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One step of a coercion chain
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Int,
    Float,
    Str,
    /// `true`/`false`, `1`/`0`, `"1"`/`"0"`
    Bool,
    /// Integer first, then non-zero
    IntBool,
    Date,
    Time,
    DateTime,
    /// Seconds since the Unix epoch, UTC
    Timestamp,
    /// Keep the raw value
    Json,
    /// True when the string form differs from the given text
    NotEqual(String),
    /// Comma-separated string; the chain applies to each segment
    Csv(Vec<Coercion>),
    /// JSON array; the chain applies to each element
    Each(Vec<Coercion>),
    Flags(&'static FlagDecl),
    /// Enum by numeric value
    Enum(&'static EnumDecl),
    /// Enum by variant name
    EnumName(&'static EnumDecl),
    Ref(ResourceKind),
    /// Reference resolved within the owning object's realm
    RealmRef(ResourceKind),
}

/// Declarative form of a [`Coercion`] as written in resource declarations
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoercionDef {
    Name(String),
    Csv { csv: Vec<CoercionDef> },
    Each { each: Vec<CoercionDef> },
}

impl Coercion {
    /// Compile a declaration, failing on unknown names
    pub fn compile(def: &CoercionDef) -> Result<Self> {
        match def {
            CoercionDef::Csv { csv } => Ok(Coercion::Csv(compile_chain(csv)?)),
            CoercionDef::Each { each } => Ok(Coercion::Each(compile_chain(each)?)),
            CoercionDef::Name(name) => Self::parse(name),
        }
    }

    fn parse(name: &str) -> Result<Self> {
        let simple = match name {
            "int" => Some(Coercion::Int),
            "float" => Some(Coercion::Float),
            "str" => Some(Coercion::Str),
            "bool" => Some(Coercion::Bool),
            "int_bool" => Some(Coercion::IntBool),
            "date" => Some(Coercion::Date),
            "time" => Some(Coercion::Time),
            "datetime" => Some(Coercion::DateTime),
            "timestamp" => Some(Coercion::Timestamp),
            "json" => Some(Coercion::Json),
            _ => None,
        };
        if let Some(c) = simple {
            return Ok(c);
        }

        let Some((prefix, arg)) = name.split_once(':') else {
            return Err(Error::config(format!("unknown coercion `{}`", name)));
        };
        let kind = || {
            ResourceKind::from_name(arg)
                .ok_or_else(|| Error::config(format!("unknown resource type in `{}`", name)))
        };
        match prefix {
            "ne" => Ok(Coercion::NotEqual(arg.to_string())),
            "flags" => flag_decl(arg)
                .map(Coercion::Flags)
                .ok_or_else(|| Error::config(format!("unknown flag set in `{}`", name))),
            "enum" => enum_decl(arg)
                .map(Coercion::Enum)
                .ok_or_else(|| Error::config(format!("unknown enum in `{}`", name))),
            "enum_name" => enum_decl(arg)
                .map(Coercion::EnumName)
                .ok_or_else(|| Error::config(format!("unknown enum in `{}`", name))),
            "ref" => Ok(Coercion::Ref(kind()?)),
            "realm_ref" => Ok(Coercion::RealmRef(kind()?)),
            _ => Err(Error::config(format!("unknown coercion `{}`", name))),
        }
    }

    /// Resource types this step may construct references to
    pub fn referenced_kinds(&self) -> Vec<ResourceKind> {
        match self {
            Coercion::Ref(kind) | Coercion::RealmRef(kind) => vec![*kind],
            Coercion::Csv(chain) | Coercion::Each(chain) => {
                chain.iter().flat_map(Coercion::referenced_kinds).collect()
            }
            _ => Vec::new(),
        }
    }

    fn apply(&self, field: Field, ctx: &CoerceContext<'_>) -> Result<Field> {
        match self {
            Coercion::Int => Ok(Field::Int(field_to_int(&field)?)),
            Coercion::Float => Ok(Field::Float(field_to_float(&field)?)),
            Coercion::Str => Ok(Field::Str(field_to_string(&field)?)),
            Coercion::Bool => Ok(Field::Bool(field_to_bool(&field)?)),
            Coercion::IntBool => Ok(Field::Bool(field_to_int(&field)? != 0)),
            Coercion::Date => parse_text(&field, "date", |s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT).map(Field::Date)
            }),
            Coercion::Time => parse_text(&field, "time", |s| {
                NaiveTime::parse_from_str(s, TIME_FORMAT).map(Field::Time)
            }),
            Coercion::DateTime => parse_text(&field, "datetime", |s| {
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map(Field::DateTime)
            }),
            Coercion::Timestamp => {
                let secs = field_to_int(&field)?;
                DateTime::from_timestamp(secs, 0)
                    .map(|dt| Field::DateTime(dt.naive_utc()))
                    .ok_or_else(|| Error::decode("timestamp", secs))
            }
            Coercion::Json => Ok(field),
            Coercion::NotEqual(text) => Ok(Field::Bool(field_to_string(&field)? != *text)),
            Coercion::Csv(chain) => {
                let text = field_to_string(&field)?;
                let items = text
                    .split(',')
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| apply_steps(chain, Field::Raw(Value::from(segment)), ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Field::List(items))
            }
            Coercion::Each(chain) => {
                let elements: Vec<Field> = match field {
                    Field::Raw(Value::Array(items)) => items.into_iter().map(Field::Raw).collect(),
                    Field::List(items) => items,
                    other => return Err(Error::decode("list", other.describe())),
                };
                let items = elements
                    .into_iter()
                    .filter(|item| !item.is_blank())
                    .map(|item| apply_steps(chain, item, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Field::List(items))
            }
            Coercion::Flags(decl) => match field {
                Field::Raw(Value::Object(map)) => Ok(Field::Flags(FlagSet::decode(decl, &map)?)),
                // PHP serializes an empty map as an empty list
                Field::Raw(Value::Array(items)) if items.is_empty() => {
                    Ok(Field::Flags(FlagSet::empty(decl)))
                }
                Field::Flags(set) => Ok(Field::Flags(set)),
                other => Err(Error::decode(decl.name, other.describe())),
            },
            Coercion::Enum(decl) => {
                let value = field_to_int(&field)?;
                decl.by_value(value)
                    .map(Field::Enum)
                    .ok_or_else(|| Error::decode(decl.name, value))
            }
            Coercion::EnumName(decl) => {
                let name = field_to_string(&field)?;
                decl.by_name(name.trim())
                    .map(Field::Enum)
                    .ok_or_else(|| Error::decode(decl.name, name))
            }
            Coercion::Ref(kind) => Ok(Field::Ref(make_ref(*kind, field, None)?)),
            Coercion::RealmRef(kind) => Ok(Field::Ref(make_ref(*kind, field, ctx.realm.cloned())?)),
        }
    }
}

/// Compile a whole chain
pub fn compile_chain(defs: &[CoercionDef]) -> Result<Vec<Coercion>> {
    defs.iter().map(Coercion::compile).collect()
}

/// Information about the owning object available to coercions
#[derive(Debug, Clone, Copy, Default)]
pub struct CoerceContext<'a> {
    pub realm: Option<&'a Realm>,
}

/// Apply `chain` to a raw value. `null` yields [`Field::Null`].
pub fn apply(chain: &[Coercion], raw: Value, ctx: &CoerceContext<'_>) -> Result<Field> {
    apply_steps(chain, Field::Raw(raw), ctx)
}

fn apply_steps(chain: &[Coercion], field: Field, ctx: &CoerceContext<'_>) -> Result<Field> {
    let mut field = field;
    for step in chain {
        if field.is_null() {
            return Ok(Field::Null);
        }
        field = step.apply(field, ctx)?;
    }
    if field.is_null() {
        return Ok(Field::Null);
    }
    Ok(field)
}

/// Typed value produced by a coercion chain
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Raw(Value),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<Field>),
    Flags(FlagSet),
    Enum(EnumValue),
    Ref(ResourceRef),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null | Field::Raw(Value::Null))
    }

    fn is_blank(&self) -> bool {
        match self {
            Field::Raw(Value::String(s)) | Field::Str(s) => s.is_empty(),
            other => other.is_null(),
        }
    }

    /// Short description used in decode errors
    pub fn describe(&self) -> String {
        match self {
            Field::Raw(value) => {
                let text = value.to_string();
                if text.chars().count() > 40 {
                    format!("{}...", text.chars().take(40).collect::<String>())
                } else {
                    text
                }
            }
            Field::Null => "null".to_string(),
            Field::List(_) => "list".to_string(),
            Field::Flags(_) => "flag set".to_string(),
            Field::Ref(r) => format!("reference {}", r),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Null => f.write_str("-"),
            Field::Raw(Value::String(s)) => f.write_str(s),
            Field::Raw(value) => write!(f, "{}", value),
            Field::Int(i) => write!(f, "{}", i),
            Field::Float(x) => write!(f, "{}", x),
            Field::Str(s) => f.write_str(s),
            Field::Bool(b) => write!(f, "{}", b),
            Field::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Field::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Field::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Field::List(items) => {
                let items: Vec<String> = items.iter().map(Field::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Field::Flags(set) => write!(f, "{}", set),
            Field::Enum(e) => write!(f, "{}", e),
            Field::Ref(r) => write!(f, "{}", r),
        }
    }
}

/// Conversion from a coerced [`Field`] into a Rust type
pub trait FromField: Sized {
    fn from_field(field: Field) -> Result<Self>;
}

impl FromField for Field {
    fn from_field(field: Field) -> Result<Self> {
        Ok(field)
    }
}

impl FromField for Value {
    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::Raw(value) => Ok(value),
            other => Err(Error::decode("raw value", other.describe())),
        }
    }
}

macro_rules! from_field {
    ($ty:ty, $expected:literal, $($pat:pat => $out:expr),+ $(,)?) => {
        impl FromField for $ty {
            fn from_field(field: Field) -> Result<Self> {
                match field {
                    $($pat => Ok($out),)+
                    other => Err(Error::decode($expected, other.describe())),
                }
            }
        }
    };
}

from_field!(i64, "integer", Field::Int(i) => i);
from_field!(f64, "float", Field::Float(x) => x, Field::Int(i) => i as f64);
from_field!(String, "string", Field::Str(s) => s);
from_field!(bool, "boolean", Field::Bool(b) => b);
from_field!(NaiveDate, "date", Field::Date(d) => d);
from_field!(NaiveTime, "time", Field::Time(t) => t);
from_field!(NaiveDateTime, "datetime", Field::DateTime(dt) => dt);
from_field!(FlagSet, "flag set", Field::Flags(set) => set);
from_field!(EnumValue, "enum", Field::Enum(e) => e);
from_field!(ResourceRef, "reference", Field::Ref(r) => r);

impl<T: FromField> FromField for Vec<T> {
    fn from_field(field: Field) -> Result<Self> {
        match field {
            Field::List(items) => items.into_iter().map(T::from_field).collect(),
            other => Err(Error::decode("list", other.describe())),
        }
    }
}

/// Integer from a JSON number or numeric string
pub fn to_int(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_to_int))
            .ok_or_else(|| Error::decode("integer", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::decode("integer", value)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(Error::decode("integer", other)),
    }
}

fn field_to_int(field: &Field) -> Result<i64> {
    match field {
        Field::Raw(value) => to_int(value),
        Field::Int(i) => Ok(*i),
        Field::Bool(b) => Ok(i64::from(*b)),
        Field::Str(s) => to_int(&Value::from(s.as_str())),
        Field::Float(x) => whole_to_int(*x).ok_or_else(|| Error::decode("integer", x)),
        other => Err(Error::decode("integer", other.describe())),
    }
}

/// `x` as an integer if it is whole and fits in `i64`
fn whole_to_int(x: f64) -> Option<i64> {
    // 2^63 is exact as f64; anything at or above it overflows
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (x.fract() == 0.0 && x >= -LIMIT && x < LIMIT).then_some(x as i64)
}

fn field_to_float(field: &Field) -> Result<f64> {
    match field {
        Field::Raw(Value::Number(n)) => n.as_f64().ok_or_else(|| Error::decode("float", n)),
        Field::Raw(Value::String(s)) | Field::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::decode("float", s)),
        Field::Int(i) => Ok(*i as f64),
        Field::Float(x) => Ok(*x),
        other => Err(Error::decode("float", other.describe())),
    }
}

fn field_to_string(field: &Field) -> Result<String> {
    match field {
        Field::Raw(Value::String(s)) | Field::Str(s) => Ok(s.clone()),
        Field::Raw(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
        Field::Int(i) => Ok(i.to_string()),
        Field::Float(x) => Ok(x.to_string()),
        Field::Bool(b) => Ok(b.to_string()),
        other => Err(Error::decode("string", other.describe())),
    }
}

fn field_to_bool(field: &Field) -> Result<bool> {
    match field {
        Field::Raw(Value::Bool(b)) | Field::Bool(b) => Ok(*b),
        Field::Raw(Value::Number(n)) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Field::Int(i) => Ok(*i != 0),
        Field::Raw(Value::String(s)) | Field::Str(s) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(Error::decode("boolean", s)),
        },
        other => Err(Error::decode("boolean", other.describe())),
    }
}

/// Parse a textual date/time; empty strings mean "not set"
fn parse_text<F>(field: &Field, expected: &str, parse: F) -> Result<Field>
where
    F: FnOnce(&str) -> std::result::Result<Field, chrono::ParseError>,
{
    let text = match field {
        Field::Raw(Value::String(s)) | Field::Str(s) => s.trim(),
        other => return Err(Error::decode(expected, other.describe())),
    };
    if text.is_empty() {
        return Ok(Field::Null);
    }
    parse(text).map_err(|_| Error::decode(expected, text))
}

fn make_ref(kind: ResourceKind, field: Field, realm: Option<Realm>) -> Result<ResourceRef> {
    let target = match field {
        Field::Raw(Value::Object(map)) => RefTarget::Inline(map),
        Field::Ref(existing) if existing.kind == kind => existing.target,
        other => RefTarget::Id(Identity::single(field_to_int(&other)?)),
    };
    Ok(ResourceRef {
        kind,
        target,
        realm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(chain: &[Coercion], raw: Value) -> Result<Field> {
        apply(chain, raw, &CoerceContext::default())
    }

    fn chain(defs: Value) -> Vec<Coercion> {
        let defs: Vec<CoercionDef> = serde_json::from_value(defs).unwrap();
        compile_chain(&defs).unwrap()
    }

    #[test]
    fn test_int_from_string_and_number() {
        assert_eq!(run(&[Coercion::Int], json!("42")).unwrap(), Field::Int(42));
        assert_eq!(run(&[Coercion::Int], json!(42)).unwrap(), Field::Int(42));
        assert!(matches!(
            run(&[Coercion::Int], json!("forty")),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_int_rejects_out_of_range_floats() {
        assert_eq!(run(&[Coercion::Int], json!(3.0)).unwrap(), Field::Int(3));
        assert!(matches!(run(&[Coercion::Int], json!(1e30)), Err(Error::Decode { .. })));
        assert!(matches!(run(&[Coercion::Int], json!(-1e30)), Err(Error::Decode { .. })));
        assert!(matches!(run(&[Coercion::Int], json!(2.5)), Err(Error::Decode { .. })));
        assert!(matches!(
            run(&[Coercion::Float, Coercion::Int], json!("1e30")),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_null_short_circuits() {
        assert_eq!(run(&[Coercion::Int, Coercion::Ref(ResourceKind::School)], Value::Null).unwrap(), Field::Null);
        assert_eq!(run(&[Coercion::Date, Coercion::Str], json!("")).unwrap(), Field::Null);
    }

    #[test]
    fn test_bool_forms() {
        assert_eq!(run(&[Coercion::Bool], json!("0")).unwrap(), Field::Bool(false));
        assert_eq!(run(&[Coercion::Bool], json!(true)).unwrap(), Field::Bool(true));
        assert_eq!(run(&[Coercion::Bool], json!(1)).unwrap(), Field::Bool(true));
        assert_eq!(run(&[Coercion::IntBool], json!("1")).unwrap(), Field::Bool(true));
        assert_eq!(run(&[Coercion::IntBool], json!("0")).unwrap(), Field::Bool(false));
        assert!(run(&[Coercion::IntBool], json!("yes")).is_err());
        assert!(run(&[Coercion::Bool], json!("maybe")).is_err());
    }

    #[test]
    fn test_dates_and_times() {
        assert_eq!(
            run(&[Coercion::Date], json!("2019-08-26")).unwrap(),
            Field::Date(NaiveDate::from_ymd_opt(2019, 8, 26).unwrap())
        );
        assert_eq!(
            run(&[Coercion::Time], json!("08:15")).unwrap(),
            Field::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap())
        );
        let expected = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            run(&[Coercion::DateTime], json!("2020-01-02 03:04:05")).unwrap(),
            Field::DateTime(expected)
        );
        assert!(run(&[Coercion::Date], json!("26/08/2019")).is_err());
    }

    #[test]
    fn test_timestamp_is_distinct_from_datetime() {
        let expected = NaiveDate::from_ymd_opt(2023, 11, 14)
            .unwrap()
            .and_hms_opt(22, 13, 20)
            .unwrap();
        assert_eq!(
            run(&[Coercion::Timestamp], json!("1700000000")).unwrap(),
            Field::DateTime(expected)
        );
        assert!(run(&[Coercion::DateTime], json!("1700000000")).is_err());
        assert!(run(&[Coercion::Timestamp], json!("2023-11-14 22:13:20")).is_err());
    }

    #[test]
    fn test_csv_with_sub_chain() {
        let field = run(&chain(json!([{ "csv": ["int", "ref:user"] }])), json!("3,,5,")).unwrap();
        let refs: Vec<ResourceRef> = Vec::from_field(field).unwrap();
        assert_eq!(
            refs,
            vec![
                ResourceRef::new(ResourceKind::User, 3),
                ResourceRef::new(ResourceKind::User, 5)
            ]
        );
    }

    #[test]
    fn test_each_drops_blank_elements() {
        let field = run(&chain(json!([{ "each": ["int"] }])), json!(["1", "", "3", null])).unwrap();
        assert_eq!(Vec::<i64>::from_field(field).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_flags_coercion() {
        let field = run(
            &chain(json!(["flags:group_options"])),
            json!({ "member_post": 1, "create_files": 0 }),
        )
        .unwrap();
        let set = FlagSet::from_field(field).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["member_post"]);

        let field = run(&chain(json!(["flags:group_options"])), json!([])).unwrap();
        assert!(FlagSet::from_field(field).unwrap().is_empty());
    }

    #[test]
    fn test_enum_by_value_and_name() {
        use crate::resource::enums::{EnrollmentStatus, GradeItemType};

        let field = run(&chain(json!(["enum:enrollment_status"])), json!("2")).unwrap();
        assert_eq!(EnrollmentStatus::from_field(field).unwrap(), EnrollmentStatus::Expired);

        let field = run(&chain(json!(["enum_name:grade_item_type"])), json!("discussion")).unwrap();
        assert_eq!(GradeItemType::from_field(field).unwrap(), GradeItemType::Discussion);

        assert!(run(&chain(json!(["enum:enrollment_status"])), json!("42")).is_err());
    }

    #[test]
    fn test_ref_from_inline_object() {
        let field = run(&[Coercion::Ref(ResourceKind::Message)], json!({ "id": 1, "subject": "hi" })).unwrap();
        let r = ResourceRef::from_field(field).unwrap();
        assert!(matches!(r.target, RefTarget::Inline(_)));
        assert_eq!(r.identity(), None);
    }

    #[test]
    fn test_realm_ref_carries_context_realm() {
        let realm = Realm::new(ResourceKind::Section, Identity::single(42), "sections/42".into());
        let ctx = CoerceContext { realm: Some(&realm) };
        let field = apply(&[Coercion::Int, Coercion::RealmRef(ResourceKind::Assignment)], json!("5"), &ctx).unwrap();
        let r = ResourceRef::from_field(field).unwrap();
        assert_eq!(r.realm.as_ref().map(Realm::path), Some("sections/42"));

        let field = apply(&[Coercion::Int, Coercion::Ref(ResourceKind::Assignment)], json!("5"), &ctx).unwrap();
        assert_eq!(ResourceRef::from_field(field).unwrap().realm, None);
    }

    #[test]
    fn test_not_equal() {
        let chain = chain(json!(["ne:read"]));
        assert_eq!(run(&chain, json!("read")).unwrap(), Field::Bool(false));
        assert_eq!(run(&chain, json!("unread")).unwrap(), Field::Bool(true));
    }

    #[test]
    fn test_unknown_coercion_is_configuration_error() {
        let defs: Vec<CoercionDef> = serde_json::from_value(json!(["int", "bogus"])).unwrap();
        assert!(matches!(compile_chain(&defs), Err(Error::Configuration(_))));

        let defs: Vec<CoercionDef> = serde_json::from_value(json!(["ref:spaceship"])).unwrap();
        assert!(matches!(compile_chain(&defs), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_typed_mismatch_is_decode_error() {
        let field = run(&[Coercion::Str], json!("abc")).unwrap();
        assert!(matches!(i64::from_field(field), Err(Error::Decode { .. })));
    }
}
