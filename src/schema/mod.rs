//! Declarative attribute schemas.
//!
//! A [`Schema`] lists every attribute a resource type understands, whether
//! the caller must, may or must not supply it, its type, and the constraints
//! it has to satisfy. [`Schema::validate`] runs before any remote call, so a
//! bad configuration never reaches the control plane.

mod validate;
mod value;

use thiserror::Error;

pub use validate::Validator;
pub use value::{Attributes, Value};

/// Who supplies an attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Presence {
    /// The caller must supply a non-empty value.
    Required,
    /// The caller may supply a value; the resource may also report one.
    Optional,
    /// Only the resource reports a value; supplying one is an error.
    Computed,
}

/// Declared shape of an attribute value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttrType {
    /// String value.
    String,
    /// Integer value.
    Int,
    /// Boolean value.
    Bool,
    /// List whose elements all have the inner type.
    List(Box<AttrType>),
    /// Map of strings.
    Map,
    /// Map of strings whose cloud-reserved keys are filtered on read.
    Tags,
    /// List of nested objects described by their own schema.
    ObjectList(Schema),
}

/// One attribute in a [`Schema`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    /// Attribute name in `snake_case`.
    pub name: &'static str,
    /// Who supplies the value.
    pub presence: Presence,
    /// Declared value type.
    pub kind: AttrType,
    /// Optional constraint on the value.
    pub validator: Option<Validator>,
    /// Attributes that must not be set together with this one.
    pub conflicts_with: &'static [&'static str],
    /// Dotted path in the API response when it differs from the
    /// `PascalCase` form of the name.
    pub source: Option<&'static str>,
    /// Changing the value requires replacing the remote object.
    pub force_new: bool,
    /// Value assumed when the caller leaves the attribute unset.
    pub default: Option<Value>,
}

impl Attribute {
    fn new(name: &'static str, presence: Presence, kind: AttrType) -> Self {
        Self {
            name,
            presence,
            kind,
            validator: None,
            conflicts_with: &[],
            source: None,
            force_new: false,
            default: None,
        }
    }

    /// Declares a required attribute.
    #[must_use]
    pub fn required(name: &'static str, kind: AttrType) -> Self {
        Self::new(name, Presence::Required, kind)
    }

    /// Declares an optional attribute.
    #[must_use]
    pub fn optional(name: &'static str, kind: AttrType) -> Self {
        Self::new(name, Presence::Optional, kind)
    }

    /// Declares a computed attribute.
    #[must_use]
    pub fn computed(name: &'static str, kind: AttrType) -> Self {
        Self::new(name, Presence::Computed, kind)
    }

    /// Attaches a validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Declares mutually exclusive attributes.
    #[must_use]
    pub const fn conflicts_with(mut self, names: &'static [&'static str]) -> Self {
        self.conflicts_with = names;
        self
    }

    /// Reads the value from `path` in API responses.
    #[must_use]
    pub const fn source(mut self, path: &'static str) -> Self {
        self.source = Some(path);
        self
    }

    /// Marks the attribute as requiring replacement when it changes.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Sets the value assumed when the caller leaves it unset.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered attribute declarations for one resource or data source type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    /// Creates a schema from its attributes.
    #[must_use]
    pub const fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Iterates over attributes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Checks a caller-supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: an unknown or computed
    /// attribute supplied, a required attribute missing, a value of the wrong
    /// type, a validator failure, or two conflicting attributes both set.
    pub fn validate(&self, config: &Attributes) -> Result<(), ValidationError> {
        self.validate_at("", config)
    }

    fn validate_at(&self, prefix: &str, config: &Attributes) -> Result<(), ValidationError> {
        for (name, _) in config.iter() {
            match self.get(name) {
                None => {
                    return Err(ValidationError::Unknown {
                        attribute: format!("{prefix}{name}"),
                    });
                }
                Some(attr) if attr.presence == Presence::Computed => {
                    return Err(ValidationError::ComputedSupplied {
                        attribute: format!("{prefix}{name}"),
                    });
                }
                Some(_) => {}
            }
        }

        for attr in &self.attributes {
            let path = format!("{prefix}{}", attr.name);
            if !config.is_set(attr.name) {
                if attr.presence == Presence::Required {
                    return Err(ValidationError::Missing { attribute: path });
                }
                continue;
            }
            let Some(value) = config.get(attr.name) else {
                continue;
            };
            if !validate::type_matches(&attr.kind, value) {
                return Err(ValidationError::TypeMismatch {
                    attribute: path,
                    expected: format!("{:?}", attr.kind),
                    found: value.type_name(),
                });
            }
            if let Some(validator) = &attr.validator {
                validator.check(&path, value)?;
            }
            if let Some(other) = attr
                .conflicts_with
                .iter()
                .find(|other| config.is_set(other))
            {
                return Err(ValidationError::Conflict {
                    attribute: path,
                    other: (*other).to_owned(),
                });
            }
            if let (AttrType::ObjectList(nested), Value::List(items)) = (&attr.kind, value) {
                for (index, item) in items.iter().enumerate() {
                    let Value::Map(entries) = item else {
                        continue;
                    };
                    let nested_config: Attributes = entries
                        .iter()
                        .map(|(key, entry)| (key.clone(), entry.clone()))
                        .collect();
                    nested.validate_at(&format!("{path}.{index}."), &nested_config)?;
                }
            }
        }
        Ok(())
    }

    /// Returns `config` with declared defaults filled in for unset optional
    /// attributes.
    #[must_use]
    pub fn with_defaults(&self, config: &Attributes) -> Attributes {
        let mut merged = config.clone();
        for attr in &self.attributes {
            if config.is_set(attr.name) {
                continue;
            }
            if let Some(default) = &attr.default {
                merged.insert(attr.name, default.clone());
            }
        }
        merged
    }

    /// Names of caller-supplied attributes whose desired value differs from
    /// the prior state. Attributes absent from `desired` are left alone.
    #[must_use]
    pub fn changed(&self, prior: &Attributes, desired: &Attributes) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|attr| attr.presence != Presence::Computed)
            .filter(|attr| {
                desired
                    .get(attr.name)
                    .is_some_and(|value| prior.get(attr.name) != Some(value))
            })
            .map(|attr| attr.name)
            .collect()
    }

    /// Names of changed attributes that force a replacement.
    #[must_use]
    pub fn replacement_required(
        &self,
        prior: &Attributes,
        desired: &Attributes,
    ) -> Vec<&'static str> {
        self.changed(prior, desired)
            .into_iter()
            .filter(|name| self.get(name).is_some_and(|attr| attr.force_new))
            .collect()
    }
}

/// Configuration errors detected before any remote call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// A required attribute is absent or empty.
    #[error("{attribute} is required")]
    Missing {
        /// Attribute path.
        attribute: String,
    },
    /// None of a required group of alternatives is set.
    #[error("one of {} must be set", .attributes.join(", "))]
    MissingOneOf {
        /// Alternatives in precedence order.
        attributes: Vec<String>,
    },
    /// The caller supplied an attribute only the resource may report.
    #[error("{attribute} is computed and cannot be configured")]
    ComputedSupplied {
        /// Attribute path.
        attribute: String,
    },
    /// The caller supplied an attribute the schema does not declare.
    #[error("{attribute} is not a known attribute")]
    Unknown {
        /// Attribute path.
        attribute: String,
    },
    /// Two mutually exclusive attributes are both set.
    #[error("{attribute} conflicts with {other}")]
    Conflict {
        /// Attribute path.
        attribute: String,
        /// Name of the conflicting attribute.
        other: String,
    },
    /// The value has the wrong shape.
    #[error("{attribute} expects {expected}, found {found}")]
    TypeMismatch {
        /// Attribute path.
        attribute: String,
        /// Declared type.
        expected: String,
        /// Type of the supplied value.
        found: &'static str,
    },
    /// The value failed its validator.
    #[error("{attribute} is invalid: {reason}")]
    Invalid {
        /// Attribute path.
        attribute: String,
        /// What was wrong.
        reason: String,
    },
}
