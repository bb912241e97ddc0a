//! Leak sweeper for integration tests.
//!
//! Integration runs name every instance they create with a shared prefix
//! (`converge-test-` by default). The sweeper deletes every instance whose
//! name carries that prefix and fails if any remain afterwards.

use thiserror::Error;
use tracing::{info, warn};

use crate::client::CloudApi;
use crate::ecs::api::DescribeInstances;
use crate::ecs::{EcsInstance, EcsService};
use crate::error::LifecycleError;
use crate::lifecycle::{Resource, ResourceState};
use crate::schema::Attributes;
use crate::paginate::ListFilter;

/// Environment variable overriding the name prefix.
pub const SWEEP_PREFIX_ENV: &str = "CONVERGE_SWEEP_PREFIX";

/// Name prefix used by integration runs.
pub const DEFAULT_NAME_PREFIX: &str = "converge-test-";

/// Configuration for a sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepConfig {
    /// Instances whose name starts with this prefix are deleted.
    pub name_prefix: String,
}

impl SweepConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::InvalidConfig`] when the prefix is blank, which
    /// would match every instance in the region.
    pub fn new(name_prefix: impl Into<String>) -> Result<Self, SweepError> {
        let trimmed = name_prefix.into().trim().to_owned();
        if trimmed.is_empty() {
            return Err(SweepError::InvalidConfig {
                field: String::from("name_prefix"),
            });
        }
        Ok(Self {
            name_prefix: trimmed,
        })
    }

    fn filter(&self) -> Result<ListFilter, SweepError> {
        let pattern = format!("^{}", regex::escape(&self.name_prefix));
        Ok(ListFilter::new().name_regex(&pattern)?)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
        }
    }
}

/// Summary of sweeper work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepSummary {
    /// Number of instances deleted during the sweep.
    pub deleted_instances: usize,
}

/// Errors returned by the sweeper.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when instances remain after the sweep.
    #[error("instances remain after sweep: {}", .ids.join(", "))]
    NotClean {
        /// Ids still present.
        ids: Vec<String>,
    },
    /// Raised when listing or deleting fails.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<crate::schema::ValidationError> for SweepError {
    fn from(err: crate::schema::ValidationError) -> Self {
        Self::Lifecycle(err.into())
    }
}

/// Deletes leaked test instances.
#[derive(Clone, Debug)]
pub struct Sweeper<C> {
    config: SweepConfig,
    service: EcsService<C>,
}

impl<C: CloudApi + Clone> Sweeper<C> {
    /// Creates a sweeper over `service`.
    #[must_use]
    pub const fn new(config: SweepConfig, service: EcsService<C>) -> Self {
        Self { config, service }
    }

    /// Deletes every matching instance, then lists again.
    ///
    /// A failed delete is logged and the sweep carries on; whatever it left
    /// behind is reported by the final listing.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::NotClean`] when matching instances remain, and
    /// [`SweepError::Lifecycle`] when listing fails.
    pub async fn sweep(&self) -> Result<SweepSummary, SweepError> {
        let filter = self.config.filter()?;
        let query = DescribeInstances::default();
        let instances = EcsInstance::new(self.service.clone());

        let mut deleted_instances = 0;
        for record in self.service.list_instances(&query, &filter).await? {
            let state = ResourceState::new(
                record.instance_id.as_str(),
                Attributes::new().with("force_delete", true),
            );
            match instances.delete(&state).await {
                Ok(()) => {
                    info!(id = %record.instance_id, name = %record.instance_name, "swept instance");
                    deleted_instances += 1;
                }
                Err(err) => warn!(id = %record.instance_id, error = %err, "failed to sweep instance"),
            }
        }

        let remaining: Vec<String> = self
            .service
            .list_instances(&query, &filter)
            .await?
            .into_iter()
            .map(|record| record.instance_id)
            .collect();
        if !remaining.is_empty() {
            return Err(SweepError::NotClean { ids: remaining });
        }
        Ok(SweepSummary { deleted_instances })
    }
}
