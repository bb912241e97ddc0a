//! Tag synchronisation through `TagResources` and `UntagResources`.

use std::collections::BTreeMap;

use tracing::debug;

use super::EcsService;
use super::api::{Acknowledged, TagResources, UntagResources};
use crate::client::{CloudApi, classify_throttling};
use crate::error::LifecycleError;
use crate::mapper::is_reserved_tag;

/// Most tags a single tag or untag call accepts.
const TAG_BATCH: usize = 20;

/// Tags to remove and tags to add or overwrite.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagDiff {
    /// Keys present before but no longer desired.
    pub remove: Vec<String>,
    /// New keys and keys whose value changed.
    pub add: BTreeMap<String, String>,
}

impl TagDiff {
    /// Whether nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Computes the changes turning `prior` into `desired`. Reserved keys are
/// never touched.
#[must_use]
pub fn diff_tags(
    prior: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> TagDiff {
    let remove = prior
        .keys()
        .filter(|key| !is_reserved_tag(key) && !desired.contains_key(*key))
        .cloned()
        .collect();
    let add = desired
        .iter()
        .filter(|(key, value)| !is_reserved_tag(key) && prior.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    TagDiff { remove, add }
}

/// Brings the tags on `resource_id` from `prior` to `desired`: removals
/// first, then additions, in batches the API accepts.
///
/// # Errors
///
/// Returns the [`LifecycleError`] of the first tag call that fails.
pub async fn sync_tags<C: CloudApi>(
    service: &EcsService<C>,
    resource_type: &'static str,
    resource_id: &str,
    prior: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> Result<TagDiff, LifecycleError> {
    let diff = diff_tags(prior, desired);
    for keys in diff.remove.chunks(TAG_BATCH) {
        let request = UntagResources {
            resource_type,
            resource_id: resource_id.to_owned(),
            keys: keys.to_vec(),
        };
        let _: Acknowledged = service
            .send(&request, resource_id, classify_throttling)
            .await?;
    }
    let additions: Vec<(String, String)> = diff
        .add
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for batch in additions.chunks(TAG_BATCH) {
        let request = TagResources {
            resource_type,
            resource_id: resource_id.to_owned(),
            tags: batch.iter().cloned().collect(),
        };
        let _: Acknowledged = service
            .send(&request, resource_id, classify_throttling)
            .await?;
    }
    debug!(
        resource_id,
        removed = diff.remove.len(),
        added = diff.add.len(),
        "tags synchronised"
    );
    Ok(diff)
}
