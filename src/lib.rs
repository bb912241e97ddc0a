//! Converging lifecycle management for Alibaba Cloud objects.
//!
//! Every managed object goes through the same loop: a declarative
//! configuration is validated against a [`Schema`] and turned into request
//! [`Params`]; the call is sent under a bounded [`RetryPolicy`]; list calls
//! are walked by a [`Paginator`]; mutations are followed by a
//! [`StateReconciler`] poll until the control plane settles; and replies are
//! flattened back into [`Attributes`].
//!
//! The [`ecs`] module instantiates the loop for instances, security group
//! rules, disk attachments and the instance listing data source.

pub mod builder;
pub mod client;
pub mod config;
pub mod ecs;
pub mod error;
pub mod export;
pub mod identity;
pub mod lifecycle;
pub mod mapper;
pub mod paginate;
pub mod reconcile;
pub mod retry;
pub mod schema;
pub mod sweeper;
pub mod test_support;

pub use builder::{ApiRequest, ExclusiveGroup, Params};
pub use client::{Action, ApiError, CloudApi, Credentials, RpcClient};
pub use config::{ConfigError, DEFAULT_REGION, ProviderConfig, ServiceSettings};
pub use ecs::{DiskAttachment, EcsInstance, EcsInstances, EcsService, SecurityGroupRule};
pub use error::LifecycleError;
pub use identity::{CompositeId, IdentityError};
pub use lifecycle::{
    DataSource, DataSourceState, Resource, ResourceState, Timeouts, apply, destroy, id_hash,
    refresh,
};
pub use paginate::{ListFilter, Page, PageCursor, Paginator};
pub use reconcile::{Converged, StateReconciler, WaitError, WaitTarget};
pub use retry::{Classification, RetryError, RetryPolicy, invoke};
pub use schema::{AttrType, Attribute, Attributes, Schema, ValidationError, Validator, Value};
pub use sweeper::{SweepConfig, SweepError, SweepSummary, Sweeper};
