//! Resource and data source abstractions, plus the host-side operations that
//! drive them.
//!
//! A [`Resource`] owns the full create/read/update/delete lifecycle of one
//! remote object type. A [`DataSource`] is a read-only query. [`apply`],
//! [`refresh`] and [`destroy`] play the role of the host runtime: they decide
//! whether a configuration needs a create, an in-place update or a
//! replacement, and keep write-only attributes in the returned state.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LifecycleError;
use crate::schema::{Attributes, Presence, Schema};

/// Future returned by lifecycle operations.
pub type LifecycleFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, LifecycleError>> + Send + 'a>>;

/// Per-operation wait budgets for a resource type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Budget for create, including the wait for the object to settle.
    pub create: Duration,
    /// Budget for update.
    pub update: Duration,
    /// Budget for delete, including the wait for the object to disappear.
    pub delete: Duration,
}

impl Timeouts {
    /// Creates a set of timeouts.
    #[must_use]
    pub const fn new(create: Duration, update: Duration, delete: Duration) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    /// Uses `timeout` for every operation.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self::new(timeout, timeout, timeout)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(5 * 60))
    }
}

/// What a host persists for a managed object between operations.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceState {
    /// Identifier returned by create; the only handle kept between calls.
    pub id: String,
    /// Flattened attributes, configured and computed.
    pub attributes: Attributes,
}

impl ResourceState {
    /// Creates a state record.
    #[must_use]
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Result of a data source read.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataSourceState {
    /// Aggregate identifier derived from the result set.
    pub id: String,
    /// Computed attributes.
    pub attributes: Attributes,
}

/// A remote object type with a full lifecycle.
///
/// Implementations validate configuration before their first remote call,
/// so a rejected configuration never reaches the cloud.
pub trait Resource: Send + Sync {
    /// Type name, for example `ecs_instance`.
    fn type_name(&self) -> &'static str;

    /// Attribute declarations.
    fn schema(&self) -> &Schema;

    /// Wait budgets used by this instance.
    fn timeouts(&self) -> Timeouts;

    /// Creates the object and returns its settled state.
    fn create<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, ResourceState>;

    /// Reads the object; `Ok(None)` means it no longer exists.
    fn read<'a>(&'a self, id: &'a str) -> LifecycleFuture<'a, Option<ResourceState>>;

    /// Applies in-place changes from `config` to the object in `prior`.
    fn update<'a>(
        &'a self,
        prior: &'a ResourceState,
        config: &'a Attributes,
    ) -> LifecycleFuture<'a, ResourceState>;

    /// Deletes the object recorded in `state`. Deleting an object that is
    /// already gone succeeds.
    fn delete<'a>(&'a self, state: &'a ResourceState) -> LifecycleFuture<'a, ()>;

    /// Adopts an existing object by identifier.
    fn import<'a>(&'a self, id: &'a str) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(async move {
            self.read(id)
                .await?
                .ok_or_else(|| LifecycleError::ImportNotFound { id: id.to_owned() })
        })
    }
}

/// A read-only query.
pub trait DataSource: Send + Sync {
    /// Type name, for example `ecs_instances`.
    fn type_name(&self) -> &'static str;

    /// Attribute declarations.
    fn schema(&self) -> &Schema;

    /// Runs the query described by `config`.
    fn read<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, DataSourceState>;
}

/// Aggregate identifier for a data source result: the CRC-32 (IEEE) of every
/// id followed by `-`, rendered in decimal.
#[must_use]
pub fn id_hash<S: AsRef<str>>(ids: &[S]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    for id in ids {
        hasher.update(id.as_ref().as_bytes());
        hasher.update(b"-");
    }
    hasher.finalize().to_string()
}

/// Drives `resource` towards `config`.
///
/// Without a prior state the object is created. Otherwise it is refreshed:
/// a vanished object is recreated, a change to a replacement-only attribute
/// deletes and recreates it, and any other change is applied in place.
///
/// # Errors
///
/// Returns the first [`LifecycleError`] raised by the resource.
pub async fn apply<R: Resource + ?Sized>(
    resource: &R,
    prior: Option<&ResourceState>,
    config: &Attributes,
) -> Result<ResourceState, LifecycleError> {
    let Some(prior) = prior else {
        info!(resource = resource.type_name(), "creating");
        return resource.create(config).await;
    };

    let Some(current) = refresh(resource, prior).await? else {
        info!(
            resource = resource.type_name(),
            id = %prior.id,
            "object vanished; creating a replacement"
        );
        return resource.create(config).await;
    };

    let schema = resource.schema();
    let desired = schema.with_defaults(config);
    let replace = schema.replacement_required(&current.attributes, &desired);
    if !replace.is_empty() {
        info!(
            resource = resource.type_name(),
            id = %current.id,
            attributes = ?replace,
            "replacing"
        );
        resource.delete(&current).await?;
        return resource.create(config).await;
    }

    let changed = schema.changed(&current.attributes, &desired);
    if changed.is_empty() {
        return Ok(current);
    }
    info!(
        resource = resource.type_name(),
        id = %current.id,
        attributes = ?changed,
        "updating in place"
    );
    resource.update(&current, config).await
}

/// Re-reads the object in `prior`. Attributes the API never reports back
/// keep their prior values.
///
/// # Errors
///
/// Returns the [`LifecycleError`] raised by the read.
pub async fn refresh<R: Resource + ?Sized>(
    resource: &R,
    prior: &ResourceState,
) -> Result<Option<ResourceState>, LifecycleError> {
    let Some(mut current) = resource.read(&prior.id).await? else {
        return Ok(None);
    };
    for (name, value) in prior.attributes.iter() {
        let declared = resource
            .schema()
            .get(name)
            .is_some_and(|attr| attr.presence != Presence::Computed);
        if declared && current.attributes.get(name).is_none() {
            current.attributes.insert(name.clone(), value.clone());
        }
    }
    Ok(Some(current))
}

/// Deletes the object in `state`.
///
/// # Errors
///
/// Returns the [`LifecycleError`] raised by the delete.
pub async fn destroy<R: Resource + ?Sized>(
    resource: &R,
    state: &ResourceState,
) -> Result<(), LifecycleError> {
    info!(resource = resource.type_name(), id = %state.id, "destroying");
    resource.delete(state).await
}
