//! Response mapping: nested API documents into flat attribute maps.
//!
//! API responses use `PascalCase` keys, wrap lists in single-key objects
//! (`{"Tags": {"Tag": [...]}}`), and return numbers as strings about as often
//! as not. [`flatten`] walks a [`Schema`] and pulls each attribute out of the
//! response, coercing scalars into the declared type.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::schema::{AttrType, Attributes, Schema, Value};

/// Tag key prefixes reserved by the cloud itself. Such tags are managed by
/// the platform and are never reported back to the caller.
pub const RESERVED_TAG_PREFIXES: [&str; 4] = ["aliyun", "acs:", "http://", "https://"];

/// A key/value tag as the API reports it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct TagPair {
    /// Tag key.
    #[serde(rename = "TagKey", alias = "Key")]
    pub key: String,
    /// Tag value; absent values read as empty.
    #[serde(rename = "TagValue", alias = "Value", default)]
    pub value: String,
}

/// Errors raised while mapping a response.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MapError {
    /// The response (or a nested item) was not a JSON object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
    /// A value could not be coerced into the declared type.
    #[error("cannot read {attribute} as {expected} from {found}")]
    Coerce {
        /// Attribute being mapped.
        attribute: String,
        /// Declared type.
        expected: &'static str,
        /// Offending JSON value, rendered.
        found: String,
    },
}

/// Whether `key` belongs to the cloud's reserved tag namespace.
#[must_use]
pub fn is_reserved_tag(key: &str) -> bool {
    RESERVED_TAG_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Drops reserved tags. Applying it twice gives the same result as once.
#[must_use]
pub fn filter_tags(tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|(key, _)| !is_reserved_tag(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Converts reported tag pairs into a map without reserved tags.
#[must_use]
pub fn tags_to_map(pairs: &[TagPair]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter(|pair| !is_reserved_tag(&pair.key))
        .map(|pair| (pair.key.clone(), pair.value.clone()))
        .collect()
}

/// Converts `snake_case` to the `PascalCase` the API uses.
#[must_use]
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

/// Copies `names` from `config` into `state` for attributes the API never
/// echoes back (passwords, user data).
pub fn carry_over(state: &mut Attributes, config: &Attributes, names: &[&str]) {
    for name in names {
        if let Some(value) = config.get(name) {
            state.insert(*name, value.clone());
        }
    }
}

/// Extracts every attribute `schema` declares from `object`.
///
/// Attributes missing from the response, or `null`, are left out.
///
/// # Errors
///
/// Returns [`MapError::NotAnObject`] when `object` is not a JSON object and
/// [`MapError::Coerce`] when a present value cannot be read as its declared
/// type.
pub fn flatten(schema: &Schema, object: &Json) -> Result<Attributes, MapError> {
    if !object.is_object() {
        return Err(MapError::NotAnObject {
            found: json_type(object),
        });
    }
    let mut attributes = Attributes::new();
    for attr in schema.iter() {
        let path = attr
            .source
            .map_or_else(|| pascal_case(attr.name), str::to_owned);
        let Some(raw) = lookup(object, &path) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }
        attributes.insert(attr.name, convert(attr.name, &attr.kind, raw)?);
    }
    Ok(attributes)
}

fn lookup<'a>(object: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.')
        .try_fold(object, |current, key| current.as_object()?.get(key))
}

/// `{"Tag": [...]}` style wrappers around arrays are unwrapped.
fn unwrap_list(raw: &Json) -> Option<&Vec<Json>> {
    match raw {
        Json::Array(items) => Some(items),
        Json::Object(entries) if entries.len() == 1 => {
            entries.values().next().and_then(Json::as_array)
        }
        _ => None,
    }
}

fn convert(attribute: &str, kind: &AttrType, raw: &Json) -> Result<Value, MapError> {
    let mismatch = |expected: &'static str| MapError::Coerce {
        attribute: attribute.to_owned(),
        expected,
        found: raw.to_string(),
    };
    match kind {
        AttrType::String => scalar_string(raw)
            .map(Value::String)
            .ok_or_else(|| mismatch("string")),
        AttrType::Int => match raw {
            Json::Number(number) => number.as_i64().map(Value::Int),
            Json::String(text) => text.trim().parse::<i64>().ok().map(Value::Int),
            _ => None,
        }
        .ok_or_else(|| mismatch("int")),
        AttrType::Bool => match raw {
            Json::Bool(flag) => Some(Value::Bool(*flag)),
            Json::String(text) if text.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Json::String(text) if text.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        }
        .ok_or_else(|| mismatch("bool")),
        AttrType::List(inner) => {
            let items = unwrap_list(raw).ok_or_else(|| mismatch("list"))?;
            items
                .iter()
                .map(|item| convert(attribute, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        AttrType::Map => {
            let entries = raw.as_object().ok_or_else(|| mismatch("map"))?;
            Ok(Value::Map(
                entries
                    .iter()
                    .filter_map(|(key, value)| {
                        scalar_string(value).map(|text| (key.clone(), Value::String(text)))
                    })
                    .collect(),
            ))
        }
        AttrType::Tags => {
            let tags = if let Some(items) = unwrap_list(raw) {
                let pairs = items
                    .iter()
                    .map(|item| {
                        TagPair::deserialize(item).map_err(|_| MapError::Coerce {
                            attribute: attribute.to_owned(),
                            expected: "tag",
                            found: item.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                tags_to_map(&pairs)
            } else if let Some(entries) = raw.as_object() {
                filter_tags(
                    &entries
                        .iter()
                        .filter_map(|(key, value)| {
                            scalar_string(value).map(|text| (key.clone(), text))
                        })
                        .collect(),
                )
            } else {
                return Err(mismatch("tags"));
            };
            Ok(Value::string_map(tags))
        }
        AttrType::ObjectList(nested) => {
            let items = unwrap_list(raw).ok_or_else(|| mismatch("object list"))?;
            items
                .iter()
                .map(|item| {
                    flatten(nested, item)
                        .map(|attrs| Value::Map(attrs.into_iter().collect()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
    }
}

fn scalar_string(raw: &Json) -> Option<String> {
    match raw {
        Json::String(text) => Some(text.clone()),
        Json::Number(number) => Some(number.to_string()),
        Json::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

const fn json_type(raw: &Json) -> &'static str {
    match raw {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
