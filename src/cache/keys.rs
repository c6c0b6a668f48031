//! Cache key definitions.
//!
//! Provides the deterministic key generator for parameterised queries, the
//! fixed key names for single entities, and the glob matcher used by pattern
//! invalidation.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::products::{CategoryId, ProductId};

/// Prefix of product list query keys (`products_{digest}`).
pub const PRODUCT_LIST_PREFIX: &str = "products";
/// Prefix of category list query keys (`categories_{digest}`).
pub const CATEGORY_LIST_PREFIX: &str = "categories";

/// Number of digest bytes kept in a key (128 bits, 32 hex characters).
const DIGEST_BYTES: usize = 16;

/// Identifies a domain entity or derived collection for cache invalidation.
///
/// Cached entries can be registered against any number of these; when the
/// entity changes, every registered key is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Product(ProductId),
    Category(CategoryId),
    /// Any product list query result.
    ProductLists,
    /// Any category list query result.
    CategoryLists,
}

/// A request parameter value.
///
/// The type tag takes part in the digest, so `Str("1")`, `Int(1)` and
/// `Float(1.0)` produce three different keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("cache key prefix must not be empty")]
    EmptyPrefix,
    #[error("parameter `{path}` is a non-finite float and cannot be hashed")]
    NonFiniteFloat { path: String },
    #[error("parameters must serialize to a map, got {found}")]
    NotAMap { found: &'static str },
    #[error("failed to serialize parameters: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Generate `{prefix}_{digest}` for a parameter map.
///
/// Parameters are collected into a sorted map before hashing, so the result
/// never depends on the order the caller supplies them in. A repeated name
/// keeps its last value.
pub fn generate_key<I, K>(prefix: &str, params: I) -> Result<String, KeyError>
where
    I: IntoIterator<Item = (K, ParamValue)>,
    K: Into<String>,
{
    if prefix.is_empty() {
        return Err(KeyError::EmptyPrefix);
    }

    let canonical: BTreeMap<String, ParamValue> = params
        .into_iter()
        .map(|(name, value)| (name.into(), value))
        .collect();

    for (name, value) in &canonical {
        ensure_finite(name, value)?;
    }

    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{prefix}_{}", hex::encode(&digest[..DIGEST_BYTES])))
}

/// Generate a key from any serializable parameter struct or map.
///
/// Goes through the `serde_json` data model, so struct field names become
/// parameter names. Non-finite floats are turned into null by that data model
/// before they reach the generator; use [`generate_key`] with [`ParamValue`]
/// when floats must be rejected instead.
pub fn generate_key_from<T>(prefix: &str, params: &T) -> Result<String, KeyError>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(params)? {
        serde_json::Value::Object(map) => generate_key(
            prefix,
            map.into_iter()
                .map(|(name, value)| (name, ParamValue::from(value))),
        ),
        other => Err(KeyError::NotAMap {
            found: json_kind(&other),
        }),
    }
}

fn ensure_finite(path: &str, value: &ParamValue) -> Result<(), KeyError> {
    match value {
        ParamValue::Float(number) if !number.is_finite() => Err(KeyError::NonFiniteFloat {
            path: path.to_string(),
        }),
        ParamValue::List(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| ensure_finite(&format!("{path}[{index}]"), item)),
        ParamValue::Map(entries) => entries
            .iter()
            .try_for_each(|(name, item)| ensure_finite(&format!("{path}.{name}"), item)),
        _ => Ok(()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ============================================================================
// Entity key names
// ============================================================================

pub fn product_key(id: ProductId) -> String {
    format!("product_{id}")
}

pub fn product_variations_key(id: ProductId) -> String {
    format!("product_variations_{id}")
}

pub fn category_key(id: CategoryId) -> String {
    format!("category_{id}")
}

/// Glob covering every product list query result.
pub fn product_lists_pattern() -> String {
    format!("{PRODUCT_LIST_PREFIX}_*")
}

/// Glob covering every category list query result.
pub fn category_lists_pattern() -> String {
    format!("{CATEGORY_LIST_PREFIX}_*")
}

// ============================================================================
// Pattern matching
// ============================================================================

/// Check if a pattern matches a key.
///
/// - `*` matches any run of characters, including none
/// - `?` matches exactly one character
/// - A pattern without wildcards matches as a substring
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    if !pattern.contains(['*', '?']) {
        return key.contains(pattern);
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some('?') => {
                p += 1;
                k += 1;
            }
            Some(c) if *c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::Int(i128::from(value))
                }
            }
        )*
    };
}

int_param!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        // usize is at most 64 bits on supported targets.
        Self::Int(value as i128)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Self::Int(i128::from(int))
                } else if let Some(int) = number.as_u64() {
                    Self::Int(i128::from(int))
                } else {
                    Self::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(text) => Self::Str(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(name, item)| (name, Self::from(item)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    fn page_params(page: i64, limit: i64) -> Vec<(&'static str, ParamValue)> {
        vec![("page", page.into()), ("limit", limit.into())]
    }

    #[test]
    fn key_has_prefix_and_32_hex_digest() {
        let key = generate_key("products", page_params(1, 10)).expect("key");
        let (prefix, digest) = key.split_once('_').expect("separator");
        assert_eq!(prefix, "products");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = generate_key("products", page_params(1, 10)).expect("key");
        let mut reversed = page_params(1, 10);
        reversed.reverse();
        let reversed = generate_key("products", reversed).expect("key");
        assert_eq!(forward, reversed);

        let hashed: HashMap<String, ParamValue> = page_params(1, 10)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(forward, generate_key("products", hashed).expect("key"));
    }

    #[test]
    fn empty_params_are_deterministic() {
        let empty: Vec<(String, ParamValue)> = Vec::new();
        let first = generate_key("products", empty.clone()).expect("key");
        let second = generate_key("products", empty).expect("key");
        assert_eq!(first, second);
    }

    #[test]
    fn type_tag_participates_in_digest() {
        let as_str = generate_key("p", [("id", ParamValue::from("1"))]).expect("key");
        let as_int = generate_key("p", [("id", ParamValue::from(1_i64))]).expect("key");
        let as_float = generate_key("p", [("id", ParamValue::from(1.0))]).expect("key");
        assert_ne!(as_str, as_int);
        assert_ne!(as_int, as_float);
        assert_ne!(as_str, as_float);
    }

    #[test]
    fn prefix_participates_in_key() {
        let products = generate_key("products", page_params(1, 10)).expect("key");
        let categories = generate_key("categories", page_params(1, 10)).expect("key");
        assert_ne!(products, categories);
    }

    #[test]
    fn no_collisions_across_varied_shapes() {
        let mut seen = HashSet::new();
        for i in 0..10_000_i64 {
            let params: Vec<(String, ParamValue)> = match i % 4 {
                0 => vec![("page".into(), i.into())],
                1 => vec![
                    ("page".into(), (i / 4).into()),
                    ("search".into(), format!("term-{i}").into()),
                ],
                2 => vec![
                    ("category".into(), ParamValue::from(vec![i, i + 1])),
                    ("in_stock".into(), (i % 3 == 0).into()),
                ],
                _ => vec![
                    ("filter".into(), ParamValue::Map(BTreeMap::from([(
                        "min_price".to_string(),
                        ParamValue::from(i as f64 / 7.0),
                    )]))),
                    ("tag".into(), ParamValue::Null),
                ],
            };
            let key = generate_key("products", params).expect("key");
            assert!(seen.insert(key), "collision at trial {i}");
        }
    }

    #[test]
    fn non_finite_float_is_rejected_with_path() {
        let params = [(
            "filter",
            ParamValue::Map(BTreeMap::from([(
                "ranges".to_string(),
                ParamValue::List(vec![ParamValue::Float(1.0), ParamValue::Float(f64::NAN)]),
            )])),
        )];
        match generate_key("products", params) {
            Err(KeyError::NonFiniteFloat { path }) => assert_eq!(path, "filter.ranges[1]"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let result = generate_key("", page_params(1, 10));
        assert!(matches!(result, Err(KeyError::EmptyPrefix)));
    }

    #[test]
    fn serializable_struct_matches_explicit_params() {
        #[derive(Serialize)]
        struct ListQuery {
            page: u32,
            limit: u32,
        }

        let from_struct =
            generate_key_from("products", &ListQuery { page: 1, limit: 10 }).expect("key");
        let explicit = generate_key("products", page_params(1, 10)).expect("key");
        assert_eq!(from_struct, explicit);
    }

    #[test]
    fn non_map_params_are_rejected() {
        let result = generate_key_from("products", &vec![1, 2, 3]);
        assert!(matches!(result, Err(KeyError::NotAMap { found: "array" })));
    }

    #[test]
    fn non_string_map_keys_fail_serialization() {
        let params: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        let result = generate_key_from("products", &params);
        assert!(matches!(result, Err(KeyError::Serialization(_))));
    }

    #[test]
    fn entity_key_names() {
        assert_eq!(product_key(12), "product_12");
        assert_eq!(product_variations_key(12), "product_variations_12");
        assert_eq!(category_key(5), "category_5");
        assert_eq!(product_lists_pattern(), "products_*");
    }

    #[test]
    fn pattern_matches_wildcards() {
        assert!(matches_pattern("products_*", "products_abc"));
        assert!(!matches_pattern("products_*", "product_5"));
        assert!(matches_pattern("product_?", "product_5"));
        assert!(!matches_pattern("product_?", "product_55"));
        assert!(matches_pattern("*_5", "category_5"));
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("p*_*s_1*", "product_variations_12"));
    }

    #[test]
    fn pattern_without_wildcards_matches_substring() {
        assert!(matches_pattern("variations", "product_variations_12"));
        assert!(!matches_pattern("category", "product_12"));
    }
}
