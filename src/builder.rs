//! Request construction: typed configuration in, flat API parameters out.
//!
//! RPC-style cloud APIs take a flat, string-valued parameter map. Lists are
//! spelled either as a JSON array in one parameter or as `Prefix.N` keys, and
//! tags as `Tag.N.Key` / `Tag.N.Value` pairs. [`Params`] hides those
//! conventions behind a few setters so resource code only states which
//! values go where.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::schema::{Attributes, ValidationError};

/// Sorted string parameters for one API call.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Creates an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets a parameter only when `value` is present and non-empty.
    #[must_use]
    pub fn set_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value.map(Into::into) {
            Some(value) if !value.is_empty() => self.set(key, value),
            _ => self,
        }
    }

    /// Sets a boolean as `"true"` or `"false"`.
    #[must_use]
    pub fn set_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, if value { "true" } else { "false" })
    }

    /// Joins `values` with commas; skipped when the list is empty.
    #[must_use]
    pub fn set_joined<S: AsRef<str>>(self, key: impl Into<String>, values: &[S]) -> Self {
        if values.is_empty() {
            return self;
        }
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.set(key, joined)
    }

    /// Encodes `values` as a JSON array string; skipped when the list is
    /// empty.
    #[must_use]
    pub fn set_json_list<S: AsRef<str>>(self, key: impl Into<String>, values: &[S]) -> Self {
        if values.is_empty() {
            return self;
        }
        let array = serde_json::Value::Array(
            values
                .iter()
                .map(|value| serde_json::Value::String(value.as_ref().to_owned()))
                .collect(),
        );
        self.set(key, array.to_string())
    }

    /// Spreads `values` over `Prefix.1`, `Prefix.2`, ...
    #[must_use]
    pub fn set_indexed<S: AsRef<str>>(mut self, prefix: &str, values: &[S]) -> Self {
        for (index, value) in values.iter().enumerate() {
            self.0
                .insert(format!("{prefix}.{}", index + 1), value.as_ref().to_owned());
        }
        self
    }

    /// Spreads a tag map over `Tag.N.Key` / `Tag.N.Value`.
    #[must_use]
    pub fn set_tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        for (index, (key, value)) in tags.iter().enumerate() {
            let position = index + 1;
            self.0.insert(format!("Tag.{position}.Key"), key.clone());
            self.0.insert(format!("Tag.{position}.Value"), value.clone());
        }
        self
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A typed request for one API action.
pub trait ApiRequest {
    /// Action name, for example `RunInstances`.
    fn action(&self) -> &'static str;

    /// Flat parameters for the action, excluding the common signing
    /// parameters the client adds.
    fn params(&self) -> Params;
}

/// Mutually exclusive attributes where the first one set wins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExclusiveGroup {
    names: &'static [&'static str],
    required: bool,
}

impl ExclusiveGroup {
    /// Declares a group; `names` is in precedence order.
    #[must_use]
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self {
            names,
            required: false,
        }
    }

    /// Requires one of the group to be set.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns the name of the attribute that takes effect.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingOneOf`] when the group is required
    /// and none of its attributes is set.
    pub fn resolve(&self, config: &Attributes) -> Result<Option<&'static str>, ValidationError> {
        let set: Vec<&'static str> = self
            .names
            .iter()
            .copied()
            .filter(|name| config.is_set(name))
            .collect();
        match set.as_slice() {
            [] if self.required => Err(ValidationError::MissingOneOf {
                attributes: self.names.iter().map(|name| (*name).to_owned()).collect(),
            }),
            [] => Ok(None),
            [winner] => Ok(Some(*winner)),
            [winner, ignored @ ..] => {
                warn!(
                    chosen = *winner,
                    ignored = ?ignored,
                    "several mutually exclusive attributes are set; using the first"
                );
                Ok(Some(*winner))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;
    use rstest::rstest;

    #[rstest]
    fn setters_follow_rpc_conventions() {
        let tags: BTreeMap<String, String> = [("env", "dev"), ("app", "web")]
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        let params = Params::new()
            .set("RegionId", "cn-hangzhou")
            .set_opt("Description", None::<String>)
            .set_opt("InstanceName", Some(""))
            .set_bool("DryRun", false)
            .set_joined("Status", &["Running", "Stopped"])
            .set_json_list("InstanceIds", &["i-1", "i-2"])
            .set_indexed("SecurityGroupIds", &["sg-1", "sg-2"])
            .set_tags(&tags);

        assert_eq!(params.get("RegionId"), Some("cn-hangzhou"));
        assert_eq!(params.get("Description"), None);
        assert_eq!(params.get("InstanceName"), None);
        assert_eq!(params.get("DryRun"), Some("false"));
        assert_eq!(params.get("Status"), Some("Running,Stopped"));
        assert_eq!(params.get("InstanceIds"), Some(r#"["i-1","i-2"]"#));
        assert_eq!(params.get("SecurityGroupIds.2"), Some("sg-2"));
        assert_eq!(params.get("Tag.1.Key"), Some("app"));
        assert_eq!(params.get("Tag.2.Value"), Some("dev"));
    }

    #[rstest]
    fn empty_lists_add_nothing() {
        let empty: &[&str] = &[];
        let params = Params::new()
            .set_joined("A", empty)
            .set_json_list("B", empty)
            .set_indexed("C", empty);
        assert!(params.is_empty());
    }

    #[rstest]
    #[case(Attributes::new().with("instance_type", "ecs.t5"), Some("instance_type"))]
    #[case(
        Attributes::new().with("instance_types", Value::string_list(["ecs.t6"])),
        Some("instance_types")
    )]
    #[case(
        Attributes::new()
            .with("instance_type", "ecs.t5")
            .with("instance_types", Value::string_list(["ecs.t6"])),
        Some("instance_type")
    )]
    fn exclusive_group_prefers_declaration_order(
        #[case] config: Attributes,
        #[case] expected: Option<&'static str>,
    ) {
        let group = ExclusiveGroup::new(&["instance_type", "instance_types"]).required();
        assert_eq!(group.resolve(&config), Ok(expected));
    }

    #[rstest]
    fn required_group_without_members_fails() {
        let group = ExclusiveGroup::new(&["instance_type", "instance_types"]).required();
        assert_eq!(
            group.resolve(&Attributes::new()),
            Err(ValidationError::MissingOneOf {
                attributes: vec!["instance_type".to_owned(), "instance_types".to_owned()],
            })
        );
        assert_eq!(
            ExclusiveGroup::new(&["a", "b"]).resolve(&Attributes::new()),
            Ok(None)
        );
    }
}
