//! Property-based tests using proptest
//!
//! These tests verify coercions, flag sets, identities and path composition
//! using randomized inputs.

use lms::resource::coerce::{apply, compile_chain, CoerceContext, CoercionDef, Field, FromField};
use lms::resource::enums::{FlagSet, GROUP_OPTIONS};
use lms::resource::identity::{Identity, Realm};
use lms::resource::path::{resolve, PathTemplate};
use lms::resource::{ResourceKind, ResourceRef};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn chain(defs: Value) -> Vec<lms::resource::coerce::Coercion> {
    let defs: Vec<CoercionDef> = serde_json::from_value(defs).unwrap();
    compile_chain(&defs).unwrap()
}

/// Generate a comma-separated list with random empty segments
fn arb_csv() -> impl Strategy<Value = (Vec<i64>, String)> {
    prop::collection::vec((0i64..1_000_000, any::<bool>()), 0..20).prop_map(|items| {
        let ids: Vec<i64> = items.iter().map(|(id, _)| *id).collect();
        let text = items
            .iter()
            .map(|(id, gap)| if *gap { format!("{},", id) } else { id.to_string() })
            .collect::<Vec<_>>()
            .join(",");
        (ids, text)
    })
}

/// Generate a wire flag mapping over known flags
fn arb_flags() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(
        prop_oneof![Just(json!(0)), Just(json!(1)), Just(json!("0")), Just(json!("1"))],
        GROUP_OPTIONS.flags.len(),
    )
    .prop_map(|values| {
        GROUP_OPTIONS
            .flags
            .iter()
            .zip(values)
            .map(|(flag, value)| (flag.to_string(), value))
            .collect()
    })
}

fn is_on(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.as_i64() == Some(1)) || value == "1"
}

proptest! {
    /// Integers survive transmission as strings or numbers
    #[test]
    fn test_int_from_either_form(n in any::<i64>(), as_string in any::<bool>()) {
        let raw = if as_string { json!(n.to_string()) } else { json!(n) };
        let field = apply(&chain(json!(["int"])), raw, &CoerceContext::default()).unwrap();
        prop_assert_eq!(field, Field::Int(n));
    }

    /// Csv drops empty segments and keeps order
    #[test]
    fn test_csv_keeps_every_id((ids, text) in arb_csv()) {
        let field = apply(&chain(json!([{ "csv": ["int"] }])), json!(text), &CoerceContext::default()).unwrap();
        let decoded: Vec<i64> = Vec::from_field(field).unwrap();
        prop_assert_eq!(decoded, ids);
    }

    /// Csv of references builds one reference per id
    #[test]
    fn test_csv_references((ids, text) in arb_csv()) {
        let field = apply(&chain(json!([{ "csv": ["int", "ref:user"] }])), json!(text), &CoerceContext::default()).unwrap();
        let refs: Vec<ResourceRef> = Vec::from_field(field).unwrap();
        let expected: Vec<ResourceRef> = ids.into_iter().map(|id| ResourceRef::new(ResourceKind::User, id)).collect();
        prop_assert_eq!(refs, expected);
    }

    /// Decoding keeps exactly the truthy flags and encoding restores 0/1 for all
    #[test]
    fn test_flag_set_decode_encode(wire in arb_flags()) {
        let set = FlagSet::decode(&GROUP_OPTIONS, &wire).unwrap();
        let encoded = set.encode();

        prop_assert_eq!(encoded.len(), GROUP_OPTIONS.flags.len());
        for (flag, value) in &wire {
            prop_assert_eq!(set.contains(flag), is_on(value));
            prop_assert_eq!(&encoded[flag], &json!(i64::from(is_on(value))));
        }
    }

    /// Identities print and parse back unchanged
    #[test]
    fn test_identity_parse(parts in prop::collection::vec(any::<i64>(), 1..3)) {
        let identity = Identity::composite(parts);
        prop_assert_eq!(Identity::parse(&identity.to_string()).unwrap(), identity);
    }

    /// Realm paths are prefixed with exactly one separator
    #[test]
    fn test_realm_path_composition(section in 1i64..1_000_000, id in 1i64..1_000_000) {
        let template = PathTemplate::parse("enrollments/{id}", &["id".to_string()], &[]).unwrap();
        let realm = Realm::new(ResourceKind::Section, Identity::single(section), format!("sections/{}", section));
        let path = resolve(&template, &Identity::single(id), Some(&realm), None).unwrap();
        prop_assert_eq!(path, format!("sections/{}/enrollments/{}", section, id));
    }

    /// Non-numeric strings never decode as integers
    #[test]
    fn test_int_rejects_words(word in "[a-z]{1,12}") {
        let result = apply(&chain(json!(["int"])), json!(word), &CoerceContext::default());
        prop_assert!(result.is_err());
    }
}
