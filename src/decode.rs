//! Discriminated-type decoding for polymorphic Graph payloads.
//!
//! Several Graph endpoints return arrays whose elements have different
//! shapes. Each element names its own shape in `@odata.type`, for example
//! `#microsoft.graph.fido2AuthenticationMethod`. A [`VariantRegistry`] maps
//! each known discriminator string to a function that decodes the element
//! into one variant of a closed Rust enum.
//!
//! Decoding rules:
//! - The discriminator is read first, without touching the rest of the
//!   element.
//! - An element with no discriminator, a non-string discriminator, or one
//!   the registry does not know is skipped. It is not an error. This keeps
//!   compatibility with Graph adding new types, but it also means schema
//!   drift is invisible in the decoded output. Skips are traced at `debug`.
//! - An element whose discriminator matched but whose body does not fit
//!   the variant fails the whole call with a [`DecodeError`].
//! - Output order follows input order, and output is never longer than
//!   input.
//!
//! Registries are built once behind a `Lazy` and are read-only afterwards,
//! so decoding is safe from any number of tasks at once.

use std::collections::HashMap;
use std::fmt;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::odata::ODATA_TYPE;

/// Decodes one raw element into a registry's result type.
pub type DecodeFn<T> = Box<dyn Fn(&Value) -> Result<T, serde_json::Error> + Send + Sync>;

/// A matched element failed full decoding.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode {discriminator} at index {index}: {source}")]
pub struct DecodeError {
    /// The discriminator that selected the variant.
    pub discriminator: String,
    /// Position of the element in its array (0 for single values).
    pub index: usize,
    /// The serde error for the offending element.
    #[source]
    pub source: serde_json::Error,
}

/// Immutable mapping from discriminator string to decode function.
pub struct VariantRegistry<T> {
    family: &'static str,
    entries: HashMap<&'static str, DecodeFn<T>>,
}

impl<T: 'static> VariantRegistry<T> {
    /// Creates an empty registry. `family` names the result type in logs.
    pub fn new(family: &'static str) -> Self {
        VariantRegistry {
            family,
            entries: HashMap::new(),
        }
    }

    /// Registers `discriminator` to decode as `V` and wrap with `wrap`.
    ///
    /// Registering the same discriminator twice replaces the earlier entry.
    pub fn with_variant<V>(mut self, discriminator: &'static str, wrap: fn(V) -> T) -> Self
    where
        V: DeserializeOwned + 'static,
    {
        self.entries.insert(
            discriminator,
            Box::new(move |raw: &Value| V::deserialize(raw).map(wrap)),
        );
        self
    }

    /// Name of the result family, used in log fields.
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Whether `discriminator` has a registered decoder.
    pub fn contains(&self, discriminator: &str) -> bool {
        self.entries.contains_key(discriminator)
    }

    /// All registered discriminators, in no particular order.
    pub fn discriminators(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    fn lookup(&self, discriminator: &str) -> Option<&DecodeFn<T>> {
        self.entries.get(discriminator)
    }
}

impl<T> fmt::Debug for VariantRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("VariantRegistry")
            .field("family", &self.family)
            .field("discriminators", &keys)
            .finish()
    }
}

/// A closed set of variants selected by `@odata.type`.
pub trait Discriminated: Sized + 'static {
    /// The process-wide registry for this type.
    fn registry() -> &'static VariantRegistry<Self>;
}

/// Reads the `@odata.type` string of a raw element, if it has one.
pub fn discriminator(raw: &Value) -> Option<&str> {
    raw.get(ODATA_TYPE).and_then(Value::as_str)
}

/// Decodes an ordered array of raw elements, skipping unknown shapes.
pub fn decode_collection<T: 'static>(
    registry: &VariantRegistry<T>,
    raw: &[Value],
) -> Result<Vec<T>, DecodeError> {
    let mut decoded = Vec::with_capacity(raw.len());
    for (index, element) in raw.iter().enumerate() {
        let Some(odata_type) = discriminator(element) else {
            tracing::debug!(
                family = registry.family(),
                index,
                "skipping element without @odata.type"
            );
            continue;
        };
        let Some(decode) = registry.lookup(odata_type) else {
            tracing::debug!(
                family = registry.family(),
                index,
                odata_type,
                "skipping element with unrecognized @odata.type"
            );
            continue;
        };
        let value = decode(element).map_err(|source| DecodeError {
            discriminator: odata_type.to_string(),
            index,
            source,
        })?;
        decoded.push(value);
    }
    Ok(decoded)
}

/// Decodes one raw object.
///
/// Returns `Ok(None)` when the object carries no discriminator or one the
/// registry does not know.
pub fn decode_single<T: 'static>(
    registry: &VariantRegistry<T>,
    raw: &Value,
) -> Result<Option<T>, DecodeError> {
    let Some(odata_type) = discriminator(raw) else {
        return Ok(None);
    };
    let Some(decode) = registry.lookup(odata_type) else {
        tracing::debug!(
            family = registry.family(),
            odata_type,
            "unrecognized @odata.type on single value"
        );
        return Ok(None);
    };
    decode(raw).map(Some).map_err(|source| DecodeError {
        discriminator: odata_type.to_string(),
        index: 0,
        source,
    })
}

/// Decodes the `children` array owned by a parent variant.
///
/// Recurses through the same registry as the parent. There is no explicit
/// depth limit; serde_json's recursion limit applies when the payload is
/// parsed from text.
pub fn decode_nested_children<T: Discriminated>(raw: &[Value]) -> Result<Vec<T>, DecodeError> {
    decode_collection(T::registry(), raw)
}

/// `deserialize_with` adapter for polymorphic child arrays.
///
/// A missing or `null` field decodes as an empty list.
pub fn children<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Discriminated,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    decode_nested_children(&raw).map_err(D::Error::custom)
}

/// `deserialize_with` adapter for a single optional polymorphic field.
pub fn single<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Discriminated,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(raw) => decode_single(T::registry(), &raw).map_err(D::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Circle {
        id: String,
        radius: f64,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Group {
        id: String,
        #[serde(default, deserialize_with = "children")]
        children: Vec<Shape>,
    }

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle(Circle),
        Group(Group),
    }

    static SHAPES: Lazy<VariantRegistry<Shape>> = Lazy::new(|| {
        VariantRegistry::new("shape")
            .with_variant("#test.circle", Shape::Circle)
            .with_variant("#test.group", Shape::Group)
    });

    impl Discriminated for Shape {
        fn registry() -> &'static VariantRegistry<Self> {
            &SHAPES
        }
    }

    fn circle(id: &str) -> Shape {
        Shape::Circle(Circle {
            id: id.to_string(),
            radius: 1.0,
        })
    }

    #[test]
    fn collection_keeps_order_and_skips_unknown() {
        let raw = vec![
            json!({"@odata.type": "#test.circle", "id": "a", "radius": 1.0}),
            json!({"id": "no-type"}),
            json!({"@odata.type": "#test.square", "id": "b"}),
            json!({"@odata.type": "#test.circle", "id": "c", "radius": 1.0}),
            json!({"@odata.type": 42, "id": "numeric-type"}),
            json!("not an object"),
        ];
        let decoded = decode_collection(&SHAPES, &raw).unwrap();
        assert_eq!(decoded, vec![circle("a"), circle("c")]);
    }

    #[test]
    fn collection_of_only_unknowns_is_empty() {
        let raw = vec![json!({"id": "x"}), json!({"@odata.type": "#test.other"})];
        assert!(decode_collection(&SHAPES, &raw).unwrap().is_empty());
        assert!(decode_collection(&SHAPES, &[]).unwrap().is_empty());
    }

    #[test]
    fn matched_element_with_bad_shape_fails_whole_call() {
        let raw = vec![
            json!({"@odata.type": "#test.circle", "id": "a", "radius": 1.0}),
            json!({"@odata.type": "#test.circle", "id": "b", "radius": "wide"}),
        ];
        let err = decode_collection(&SHAPES, &raw).unwrap_err();
        assert_eq!(err.discriminator, "#test.circle");
        assert_eq!(err.index, 1);
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn single_without_discriminator_is_none() {
        assert!(
            decode_single(&SHAPES, &json!({"id": "a", "radius": 2.0}))
                .unwrap()
                .is_none()
        );
        assert!(
            decode_single(&SHAPES, &json!({"@odata.type": "#test.square"}))
                .unwrap()
                .is_none()
        );
        let found = decode_single(
            &SHAPES,
            &json!({"@odata.type": "#test.circle", "id": "a", "radius": 1.0}),
        )
        .unwrap();
        assert_eq!(found, Some(circle("a")));
    }

    #[test]
    fn nested_children_recurse_through_registry() {
        let raw = json!({
            "@odata.type": "#test.group",
            "id": "outer",
            "children": [
                {"@odata.type": "#test.group", "id": "inner", "children": [
                    {"@odata.type": "#test.circle", "id": "leaf", "radius": 1.0},
                    {"id": "dropped"}
                ]},
                {"@odata.type": "#test.circle", "id": "sibling", "radius": 1.0}
            ]
        });
        let Some(Shape::Group(outer)) = decode_single(&SHAPES, &raw).unwrap() else {
            panic!("expected group");
        };
        assert_eq!(outer.id, "outer");
        assert_eq!(outer.children.len(), 2);
        let Shape::Group(inner) = &outer.children[0] else {
            panic!("expected inner group");
        };
        assert_eq!(inner.children, vec![circle("leaf")]);
        assert_eq!(outer.children[1], circle("sibling"));
    }

    #[test]
    fn nested_decode_failure_propagates() {
        let raw = vec![json!({
            "@odata.type": "#test.group",
            "id": "outer",
            "children": [{"@odata.type": "#test.circle", "id": "bad"}]
        })];
        let err = decode_collection(&SHAPES, &raw).unwrap_err();
        assert_eq!(err.discriminator, "#test.group");
        assert!(err.to_string().contains("#test.circle"));
    }

    #[test]
    fn null_children_decode_as_empty() {
        let raw = json!({"@odata.type": "#test.group", "id": "g", "children": null});
        let Some(Shape::Group(group)) = decode_single(&SHAPES, &raw).unwrap() else {
            panic!("expected group");
        };
        assert!(group.children.is_empty());
    }

    #[test]
    fn registry_reports_contents() {
        assert!(SHAPES.contains("#test.circle"));
        assert!(!SHAPES.contains("#Test.Circle"));
        let mut keys: Vec<_> = SHAPES.discriminators().collect();
        keys.sort();
        assert_eq!(keys, vec!["#test.circle", "#test.group"]);
        assert!(format!("{:?}", *SHAPES).contains("shape"));
    }

    #[test]
    fn registry_is_shared_across_threads() {
        let raw = vec![json!({"@odata.type": "#test.circle", "id": "a", "radius": 1.0})];
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(decode_nested_children::<Shape>(&raw).unwrap().len(), 1);
                });
            }
        });
    }
}
