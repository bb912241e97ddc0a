//! Elastic Compute Service resources and data sources.
//!
//! [`EcsService`] wraps a [`CloudApi`] with the pacing from
//! [`ServiceSettings`] and offers the typed calls shared by every ECS
//! resource: retried invocation, single-object describes, and paginated
//! listing.

pub mod api;
mod disk_attachment;
mod instance;
mod instances;
mod security_group_rule;
mod tags;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::builder::ApiRequest;
use crate::client::{Action, ApiError, CloudApi, classify_throttling, decode};
use crate::config::ServiceSettings;
use crate::error::LifecycleError;
use crate::paginate::{ListFilter, Page, PageCursor, Paginator};
use crate::reconcile::StateReconciler;
use crate::retry::{Classification, invoke};

use api::{
    DescribeDisks, DescribeDisksResponse, DescribeInstances, DescribeInstancesResponse, DiskRecord,
    InstanceRecord,
};

pub use disk_attachment::DiskAttachment;
pub use instance::{EcsInstance, INSTANCE_DELETE_RETRY_CODES};
pub use instances::EcsInstances;
pub use security_group_rule::{Direction, IpProtocol, NicType, Policy, SecurityGroupRule};
pub use tags::{TagDiff, diff_tags, sync_tags};

/// Placeholder resource id for calls made before an id exists.
const NO_ID: &str = "-";

/// Typed ECS calls bound to one API client.
#[derive(Clone, Debug)]
pub struct EcsService<C> {
    api: C,
    settings: ServiceSettings,
}

impl<C: CloudApi> EcsService<C> {
    /// Creates a service using `settings` for paging, polling and retries.
    #[must_use]
    pub const fn new(api: C, settings: ServiceSettings) -> Self {
        Self { api, settings }
    }

    /// Underlying API client.
    #[must_use]
    pub const fn api(&self) -> &C {
        &self.api
    }

    /// Pacing in use.
    #[must_use]
    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Region the client is bound to.
    #[must_use]
    pub fn region(&self) -> &str {
        self.api.region()
    }

    /// Paginator using the configured page size and retry policy.
    #[must_use]
    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.settings.page_size, self.settings.retry)
    }

    /// Reconciler polling at the configured interval for at most `timeout`.
    #[must_use]
    pub const fn reconciler(&self, timeout: Duration) -> StateReconciler {
        StateReconciler::new(self.settings.poll_interval, timeout)
    }

    /// Sends `request` under the retry policy and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Remote`] naming the action and
    /// `resource_id` when the call fails for good.
    pub async fn call<R, F>(
        &self,
        request: &R,
        resource_id: &str,
        classify: F,
    ) -> Result<Json, LifecycleError>
    where
        R: ApiRequest + Sync,
        F: Fn(&ApiError) -> Classification,
    {
        let action = Action::ecs(request.action());
        let params = request.params();
        invoke(action.name, &self.settings.retry, classify, || {
            self.api.call(&action, &params)
        })
        .await
        .map_err(|err| LifecycleError::remote(resource_id, err))
    }

    /// Sends `request` and decodes the reply into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Remote`] when the call fails and
    /// [`LifecycleError::Decode`] when the reply has an unexpected shape.
    pub async fn send<T, R, F>(
        &self,
        request: &R,
        resource_id: &str,
        classify: F,
    ) -> Result<T, LifecycleError>
    where
        T: DeserializeOwned,
        R: ApiRequest + Sync,
        F: Fn(&ApiError) -> Classification,
    {
        let body = self.call(request, resource_id, classify).await?;
        Ok(decode(&Action::ecs(request.action()), body)?)
    }

    /// Describes one instance; `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the describe call fails.
    pub async fn describe_instance(&self, id: &str) -> Result<Option<InstanceRecord>, LifecycleError> {
        let reply: Result<DescribeInstancesResponse, _> = self
            .send(&DescribeInstances::by_id(id), id, classify_throttling)
            .await;
        match reply {
            Ok(reply) => Ok(reply
                .instances
                .items
                .into_iter()
                .find(|record| record.instance_id == id)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Lists every instance matching `query` server-side and `filter`
    /// client-side.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Remote`] when a page fetch fails or a page
    /// cannot be decoded.
    pub async fn list_instances(
        &self,
        query: &DescribeInstances,
        filter: &ListFilter,
    ) -> Result<Vec<InstanceRecord>, LifecycleError> {
        let action = Action::ecs("DescribeInstances");
        self.paginator()
            .list_all(
                action.name,
                PageCursor::first_page(),
                filter,
                classify_throttling,
                |cursor, page_size| {
                    let params = query.at(&cursor, page_size).params();
                    async move {
                        let body = self.api.call(&action, &params).await?;
                        let reply: DescribeInstancesResponse =
                            decode(&action, body).map_err(|err| ApiError::Malformed {
                                message: err.to_string(),
                            })?;
                        Ok::<_, ApiError>(Page::new(reply.instances.items))
                    }
                },
            )
            .await
            .map_err(|err| LifecycleError::remote(NO_ID, err))
    }

    /// Describes one disk; `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the describe call fails.
    pub async fn describe_disk(&self, disk_id: &str) -> Result<Option<DiskRecord>, LifecycleError> {
        let request = DescribeDisks {
            disk_ids: vec![disk_id.to_owned()],
            ..DescribeDisks::default()
        };
        let reply: Result<DescribeDisksResponse, _> =
            self.send(&request, disk_id, classify_throttling).await;
        match reply {
            Ok(reply) => Ok(reply
                .disks
                .items
                .into_iter()
                .find(|disk| disk.disk_id == disk_id)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The system disk of `instance_id`, if the instance has one.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the describe call fails.
    pub async fn describe_system_disk(
        &self,
        instance_id: &str,
    ) -> Result<Option<DiskRecord>, LifecycleError> {
        let request = DescribeDisks {
            instance_id: Some(instance_id.to_owned()),
            disk_type: Some("system".to_owned()),
            ..DescribeDisks::default()
        };
        let reply: DescribeDisksResponse =
            self.send(&request, instance_id, classify_throttling).await?;
        Ok(reply.disks.items.into_iter().next())
    }
}
