//! Per-attribute validators and type checks.

use regex::Regex;

use super::{AttrType, ValidationError, Value};

/// Constraint applied to a configured value after its type has been checked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validator {
    /// String must be one of the listed values.
    OneOf(&'static [&'static str]),
    /// String must match the regular expression.
    Pattern(&'static str),
    /// Integer must lie in `min..=max`.
    IntRange {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// String length (in characters) must lie in `min..=max`.
    Length {
        /// Shortest accepted length.
        min: usize,
        /// Longest accepted length.
        max: usize,
    },
}

impl Validator {
    /// Checks `value` for `attribute`. Lists are checked element by element.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] describing the first element that
    /// violates the constraint.
    pub fn check(&self, attribute: &str, value: &Value) -> Result<(), ValidationError> {
        if let Value::List(items) = value {
            return items.iter().try_for_each(|item| self.check(attribute, item));
        }
        let invalid = |reason: String| ValidationError::Invalid {
            attribute: attribute.to_owned(),
            reason,
        };
        match (self, value) {
            (Self::OneOf(allowed), Value::String(text)) => {
                if allowed.contains(&text.as_str()) {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "{text:?} is not one of {}",
                        allowed.join(", ")
                    )))
                }
            }
            (Self::Pattern(pattern), Value::String(text)) => {
                let regex = Regex::new(pattern)
                    .map_err(|err| invalid(format!("bad pattern {pattern:?}: {err}")))?;
                if regex.is_match(text) {
                    Ok(())
                } else {
                    Err(invalid(format!("{text:?} does not match {pattern}")))
                }
            }
            (Self::IntRange { min, max }, Value::Int(number)) => {
                if (*min..=*max).contains(number) {
                    Ok(())
                } else {
                    Err(invalid(format!("{number} is outside {min}..={max}")))
                }
            }
            (Self::Length { min, max }, Value::String(text)) => {
                let len = text.chars().count();
                if (*min..=*max).contains(&len) {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "length {len} is outside {min}..={max} characters"
                    )))
                }
            }
            (validator, other) => Err(invalid(format!(
                "{validator:?} cannot check a {} value",
                other.type_name()
            ))),
        }
    }
}

/// Whether `value` has the shape `kind` describes. Nested object contents
/// are validated separately against their own schema.
pub(super) fn type_matches(kind: &AttrType, value: &Value) -> bool {
    match (kind, value) {
        (AttrType::String, Value::String(_))
        | (AttrType::Int, Value::Int(_))
        | (AttrType::Bool, Value::Bool(_)) => true,
        (AttrType::List(inner), Value::List(items)) => {
            items.iter().all(|item| type_matches(inner, item))
        }
        (AttrType::Map | AttrType::Tags, Value::Map(entries)) => {
            entries.values().all(|entry| matches!(entry, Value::String(_)))
        }
        (AttrType::ObjectList(_), Value::List(items)) => {
            items.iter().all(|item| matches!(item, Value::Map(_)))
        }
        _ => false,
    }
}
