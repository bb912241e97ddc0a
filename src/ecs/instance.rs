//! The `ecs_instance` resource.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, warn};
use uuid::Uuid;

use super::EcsService;
use super::api::{
    Acknowledged, DeleteInstance, InstancePower, InstanceRecord, ModifyInstanceAttribute,
    ModifyInstanceChargeType, ModifyInstanceNetworkSpec, ModifyInstanceSpec,
    ModifyInstanceVpcAttribute, ReplaceSystemDisk, ResizeDisk, RunInstances,
    RunInstancesResponse, SecurityGroupMembership,
};
use super::tags::sync_tags;
use crate::builder::ExclusiveGroup;
use crate::client::{CloudApi, DecodeError, classify_throttling, classify_with};
use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleFuture, Resource, ResourceState, Timeouts};
use crate::mapper::{carry_over, flatten};
use crate::reconcile::{Observed, WaitTarget};
use crate::schema::{AttrType, Attribute, Attributes, Schema, ValidationError, Validator, Value};

/// Transient codes `DeleteInstance` may return while the instance is still
/// settling.
pub const INSTANCE_DELETE_RETRY_CODES: [&str; 4] = [
    "IncorrectInstanceStatus",
    "DependencyViolation.RouteEntry",
    "IncorrectInstanceStatus.Initializing",
    "LastTokenProcessing",
];

const INSTANCE_MODIFY_RETRY_CODES: [&str; 3] = [
    "IncorrectInstanceStatus",
    "OperationConflict",
    "InvalidOperation.Conflict",
];

const POWER_RETRY_CODES: [&str; 1] = ["IncorrectInstanceStatus"];
const VPC_RETRY_CODES: [&str; 1] = ["OperationConflict"];
const NETWORK_SPEC_RETRY_CODES: [&str; 4] = [
    "LastOrderProcessing",
    "LastRequestProcessing",
    "LastTokenProcessing",
    "InternalError",
];

/// Launch errors that mean "try the next instance type".
const NO_STOCK_CODES: [&str; 4] = [
    "OperationDenied.NoStock",
    "InvalidResourceType.NotSupported",
    "Zone.NotOnSale",
    "InvalidInstanceType.ValueNotSupported",
];

const RUNNING_STATUS: &str = "Running";
const STOPPED_STATUS: &str = "Stopped";
const PREPAID: &str = "PrePaid";
const POSTPAID: &str = "PostPaid";

const CREATE_PENDING: &[&str] = &["Pending", "Starting", "Stopped"];
const RUNNING: &[&str] = &[RUNNING_STATUS];
const CREATE_FAIL: &[&str] = &["Stopping"];
const STOP_PENDING: &[&str] = &["Pending", "Running", "Stopping"];
const STOPPED: &[&str] = &[STOPPED_STATUS];
const DELETE_PENDING: &[&str] = &["Pending", "Running", "Stopped", "Stopping"];

const APPLIED_STATUS: &str = "Applied";
const APPLYING_STATUS: &str = "Applying";
const APPLIED: &[&str] = &[APPLIED_STATUS];
const APPLYING: &[&str] = &[APPLYING_STATUS];

/// Attributes the API never reports back.
const WRITE_ONLY: [&str; 8] = [
    "password",
    "user_data",
    "instance_types",
    "system_disk_category",
    "system_disk_size",
    "force_delete",
    "period",
    "period_unit",
];

const INSTANCE_TYPE_GROUP: ExclusiveGroup =
    ExclusiveGroup::new(&["instance_type", "instance_types"]).required();

/// Whether a batch of expected attribute values shows up in a describe.
struct Applied(bool);

impl Observed for Applied {
    fn status(&self) -> &str {
        if self.0 { APPLIED_STATUS } else { APPLYING_STATUS }
    }
}

/// Manages one ECS instance: launch, wait until running, tag, modify in
/// place (stopping it first when the change needs a stopped instance),
/// release.
#[derive(Clone, Debug)]
pub struct EcsInstance<C> {
    service: EcsService<C>,
    schema: Schema,
    timeouts: Timeouts,
}

impl<C: CloudApi> EcsInstance<C> {
    /// Default wait budgets: 10 minutes to create or update, 20 to delete.
    pub const DEFAULT_TIMEOUTS: Timeouts = Timeouts::new(
        Duration::from_secs(10 * 60),
        Duration::from_secs(10 * 60),
        Duration::from_secs(20 * 60),
    );

    /// Creates the resource with its default timeouts.
    #[must_use]
    pub fn new(service: EcsService<C>) -> Self {
        Self {
            service,
            schema: instance_schema(),
            timeouts: Self::DEFAULT_TIMEOUTS,
        }
    }

    /// Replaces the wait budgets.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    async fn create_instance(&self, config: &Attributes) -> Result<ResourceState, LifecycleError> {
        self.schema.validate(config)?;
        let config = self.schema.with_defaults(config);
        let candidates = instance_type_candidates(&config)?;
        let id = self.launch(&config, &candidates).await?;
        info!(id = %id, "instance launched");

        self.finish_create(&id, &config)
            .await
            .map_err(|err| LifecycleError::partial_create(id.as_str(), err))
    }

    async fn launch(
        &self,
        config: &Attributes,
        candidates: &[String],
    ) -> Result<String, LifecycleError> {
        let mut last_error = None;
        for instance_type in candidates {
            let request = run_instances(config, instance_type);
            let reply: Result<RunInstancesResponse, _> =
                self.service.send(&request, "-", classify_throttling).await;
            match reply {
                Ok(reply) => {
                    let id = reply.instance_id_sets.ids.into_iter().next();
                    return id.ok_or_else(|| {
                        LifecycleError::Decode(DecodeError {
                            action: "RunInstances".to_owned(),
                            message: "no instance id returned".to_owned(),
                        })
                    });
                }
                Err(err) if is_no_stock(&err) => {
                    warn!(instance_type = %instance_type, error = %err, "no stock; trying next type");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            LifecycleError::Validation(ValidationError::MissingOneOf {
                attributes: vec!["instance_type".to_owned(), "instance_types".to_owned()],
            })
        }))
    }

    async fn finish_create(
        &self,
        id: &str,
        config: &Attributes,
    ) -> Result<ResourceState, LifecycleError> {
        let timeout = self.timeouts.create;
        self.wait_status(id, RUNNING, CREATE_PENDING, CREATE_FAIL, timeout)
            .await?;
        let tags = config.get_string_map("tags");
        if !tags.is_empty() {
            sync_tags(&self.service, "instance", id, &BTreeMap::new(), &tags).await?;
        }
        if config.get_str("status") == Some(STOPPED_STATUS) {
            self.stop(id, timeout).await?;
        }
        self.settled_state(id, config).await
    }

    async fn wait_status(
        &self,
        id: &str,
        target: &'static [&'static str],
        pending: &'static [&'static str],
        fail: &[&str],
        timeout: Duration,
    ) -> Result<InstanceRecord, LifecycleError> {
        let converged = self
            .service
            .reconciler(timeout)
            .with_pending(pending)
            .wait_for(id, WaitTarget::States(target), fail, || {
                self.service.describe_instance(id)
            })
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        converged
            .into_present()
            .ok_or_else(|| LifecycleError::Vanished { id: id.to_owned() })
    }

    /// Polls until every `(attribute, value)` pair in `expected` reads back.
    async fn wait_applied(
        &self,
        id: &str,
        expected: &[(&'static str, Value)],
        timeout: Duration,
    ) -> Result<(), LifecycleError> {
        self.service
            .reconciler(timeout)
            .with_pending(APPLYING)
            .wait_for(id, WaitTarget::States(APPLIED), &[], move || async move {
                let Some(record) = self.service.describe_instance(id).await? else {
                    return Ok(None);
                };
                let current = self.attributes_of(&record)?;
                let applied = expected
                    .iter()
                    .all(|(name, value)| current.get(name) == Some(value));
                Ok::<_, LifecycleError>(Some(Applied(applied)))
            })
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        Ok(())
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), LifecycleError> {
        let request = InstancePower::Stop {
            instance_id: id.to_owned(),
            force: false,
        };
        let _: Acknowledged = self
            .service
            .send(&request, id, classify_with(&POWER_RETRY_CODES))
            .await?;
        self.wait_status(id, STOPPED, STOP_PENDING, &[], timeout)
            .await?;
        info!(id, "instance stopped");
        Ok(())
    }

    async fn start(&self, id: &str, timeout: Duration) -> Result<(), LifecycleError> {
        let request = InstancePower::Start {
            instance_id: id.to_owned(),
        };
        let _: Acknowledged = self
            .service
            .send(&request, id, classify_with(&POWER_RETRY_CODES))
            .await?;
        self.wait_status(id, RUNNING, CREATE_PENDING, CREATE_FAIL, timeout)
            .await?;
        info!(id, "instance started");
        Ok(())
    }

    async fn settled_state(
        &self,
        id: &str,
        config: &Attributes,
    ) -> Result<ResourceState, LifecycleError> {
        let mut state = self
            .read_instance(id)
            .await?
            .ok_or_else(|| LifecycleError::Vanished { id: id.to_owned() })?;
        carry_over(&mut state.attributes, config, &WRITE_ONLY);
        Ok(state)
    }

    async fn read_instance(&self, id: &str) -> Result<Option<ResourceState>, LifecycleError> {
        let Some(record) = self.service.describe_instance(id).await? else {
            return Ok(None);
        };
        Ok(Some(ResourceState::new(id, self.attributes_of(&record)?)))
    }

    fn attributes_of(&self, record: &InstanceRecord) -> Result<Attributes, LifecycleError> {
        let mut attributes = flatten(&self.schema, &record.raw).map_err(|err| DecodeError {
            action: "DescribeInstances".to_owned(),
            message: err.to_string(),
        })?;
        if let Some(ip) = record.private_ip() {
            attributes.insert("private_ip", ip);
        }
        if let Some(ip) = record.public_ip() {
            attributes.insert("public_ip", ip);
        }
        Ok(attributes)
    }

    async fn update_instance(
        &self,
        prior: &ResourceState,
        config: &Attributes,
    ) -> Result<ResourceState, LifecycleError> {
        self.schema.validate(config)?;
        let config = self.schema.with_defaults(config);
        let id = prior.id.as_str();
        let changed: BTreeSet<&str> = self
            .schema
            .changed(&prior.attributes, &config)
            .into_iter()
            .collect();
        let classify = classify_with(&INSTANCE_MODIFY_RETRY_CODES);
        let timeout = self.timeouts.update;

        let mut modify = ModifyInstanceAttribute {
            instance_id: id.to_owned(),
            ..ModifyInstanceAttribute::default()
        };
        let pick = |name: &str| {
            if changed.contains(name) {
                config.get_str(name).map(str::to_owned)
            } else {
                None
            }
        };
        modify.instance_name = pick("instance_name");
        modify.description = pick("description");
        modify.host_name = pick("host_name");
        modify.password = pick("password");
        modify.user_data = pick("user_data").as_deref().map(encode_user_data);
        if changed.contains("deletion_protection") {
            modify.deletion_protection = config.get_bool("deletion_protection");
        }
        let restart = modify.needs_restart();
        if !modify.is_empty() {
            let _: Acknowledged = self.service.send(&modify, id, classify).await?;
        }

        if changed.contains("security_groups") {
            let before: BTreeSet<String> =
                prior.attributes.get_string_list("security_groups").into_iter().collect();
            let after: BTreeSet<String> =
                config.get_string_list("security_groups").into_iter().collect();
            for group in after.difference(&before) {
                let join = SecurityGroupMembership::Join {
                    instance_id: id.to_owned(),
                    security_group_id: group.clone(),
                };
                let _: Acknowledged = self.service.send(&join, id, classify).await?;
            }
            for group in before.difference(&after) {
                let leave = SecurityGroupMembership::Leave {
                    instance_id: id.to_owned(),
                    security_group_id: group.clone(),
                };
                let _: Acknowledged = self.service.send(&leave, id, classify).await?;
            }
        }

        if changed.contains("tags") {
            sync_tags(
                &self.service,
                "instance",
                id,
                &prior.attributes.get_string_map("tags"),
                &config.get_string_map("tags"),
            )
            .await?;
        }

        let status = prior.attributes.get_str("status").unwrap_or_default();
        if changed.contains("system_disk_size") && !changed.contains("image_id") {
            self.resize_system_disk(id, &config, status == RUNNING_STATUS)
                .await?;
        }

        let stopped_work = ["image_id", "vswitch_id", "private_ip", "instance_type"]
            .iter()
            .any(|name| changed.contains(name));
        let target = config.get_str("status").unwrap_or(RUNNING_STATUS);
        if stopped_work || restart || changed.contains("status") {
            let needs_stop =
                status == RUNNING_STATUS && (target == STOPPED_STATUS || stopped_work || restart);
            if needs_stop {
                self.stop(id, timeout).await?;
            }
            self.apply_while_stopped(prior, &config, &changed).await?;
            if target == RUNNING_STATUS && (needs_stop || status == STOPPED_STATUS) {
                self.start(id, timeout).await?;
            }
        }

        if changed.contains("internet_charge_type")
            || changed.contains("internet_max_bandwidth_out")
        {
            self.modify_network_spec(id, &config).await?;
        }

        if changed.contains("instance_charge_type") {
            let charge_type = config.get_str("instance_charge_type").unwrap_or(POSTPAID);
            self.modify_charge_type(id, charge_type, &config, timeout)
                .await?;
        }

        self.settled_state(id, &config).await
    }

    /// Image, network placement and type changes; the instance is stopped.
    async fn apply_while_stopped(
        &self,
        prior: &ResourceState,
        config: &Attributes,
        changed: &BTreeSet<&str>,
    ) -> Result<(), LifecycleError> {
        let id = prior.id.as_str();
        let timeout = self.timeouts.update;

        if changed.contains("image_id") {
            let image_id = config.get_str("image_id").unwrap_or_default();
            let request = ReplaceSystemDisk {
                instance_id: id.to_owned(),
                image_id: image_id.to_owned(),
                system_disk_size: config.get_int("system_disk_size"),
                client_token: Uuid::new_v4().to_string(),
            };
            let _: Acknowledged = self
                .service
                .send(&request, id, classify_with(&POWER_RETRY_CODES))
                .await?;
            self.wait_applied(id, &[("image_id", Value::from(image_id))], timeout)
                .await?;
        }

        if changed.contains("vswitch_id") || changed.contains("private_ip") {
            let vswitch_id = config.get_str("vswitch_id").unwrap_or_default();
            let private_ip = config.get_str("private_ip");
            let request = ModifyInstanceVpcAttribute {
                instance_id: id.to_owned(),
                vswitch_id: vswitch_id.to_owned(),
                private_ip_address: private_ip.map(str::to_owned),
            };
            let _: Acknowledged = self
                .service
                .send(&request, id, classify_with(&VPC_RETRY_CODES))
                .await?;
            let mut expected = vec![("vswitch_id", Value::from(vswitch_id))];
            if let Some(ip) = private_ip {
                expected.push(("private_ip", Value::from(ip)));
            }
            self.wait_applied(id, &expected, timeout).await?;
        }

        if changed.contains("instance_type") {
            let instance_type = config.get_str("instance_type").unwrap_or_default();
            let request = ModifyInstanceSpec {
                instance_id: id.to_owned(),
                instance_type: instance_type.to_owned(),
                prepaid: prior.attributes.get_str("instance_charge_type") == Some(PREPAID),
                client_token: Uuid::new_v4().to_string(),
            };
            let _: Acknowledged = self
                .service
                .send(&request, id, classify_with(&POWER_RETRY_CODES))
                .await?;
            self.wait_applied(
                id,
                &[("instance_type", Value::from(instance_type))],
                timeout,
            )
            .await?;
        }
        Ok(())
    }

    async fn resize_system_disk(
        &self,
        id: &str,
        config: &Attributes,
        online: bool,
    ) -> Result<(), LifecycleError> {
        let Some(new_size) = config.get_int("system_disk_size") else {
            return Ok(());
        };
        let disk = self
            .service
            .describe_system_disk(id)
            .await?
            .ok_or_else(|| LifecycleError::Vanished {
                id: format!("{id} system disk"),
            })?;
        let request = ResizeDisk {
            disk_id: disk.disk_id,
            new_size,
            online,
        };
        let _: Acknowledged = self
            .service
            .send(&request, id, classify_with(&POWER_RETRY_CODES))
            .await?;
        info!(id, new_size, "system disk resized");
        Ok(())
    }

    async fn modify_network_spec(&self, id: &str, config: &Attributes) -> Result<(), LifecycleError> {
        let charge_type = config.get_str("internet_charge_type");
        let bandwidth = config.get_int("internet_max_bandwidth_out");
        let request = ModifyInstanceNetworkSpec {
            instance_id: id.to_owned(),
            network_charge_type: charge_type.map(str::to_owned),
            internet_max_bandwidth_out: bandwidth,
            client_token: Uuid::new_v4().to_string(),
        };
        let _: Acknowledged = self
            .service
            .send(&request, id, classify_with(&NETWORK_SPEC_RETRY_CODES))
            .await?;
        let mut expected = Vec::new();
        if let Some(charge_type) = charge_type {
            expected.push(("internet_charge_type", Value::from(charge_type)));
        }
        if let Some(bandwidth) = bandwidth {
            expected.push(("internet_max_bandwidth_out", Value::Int(bandwidth)));
        }
        self.wait_applied(id, &expected, self.timeouts.update).await
    }

    async fn modify_charge_type(
        &self,
        id: &str,
        charge_type: &str,
        config: &Attributes,
        timeout: Duration,
    ) -> Result<(), LifecycleError> {
        let prepaid = charge_type == PREPAID;
        let request = ModifyInstanceChargeType {
            instance_id: id.to_owned(),
            instance_charge_type: charge_type.to_owned(),
            period: config.get_int("period").filter(|_| prepaid),
            period_unit: config
                .get_str("period_unit")
                .filter(|_| prepaid)
                .map(str::to_owned),
            client_token: Uuid::new_v4().to_string(),
        };
        let _: Acknowledged = self
            .service
            .send(&request, id, classify_throttling)
            .await?;
        self.wait_applied(
            id,
            &[("instance_charge_type", Value::from(charge_type))],
            timeout,
        )
        .await
    }

    async fn delete_instance(&self, state: &ResourceState) -> Result<(), LifecycleError> {
        let id = state.id.as_str();
        let Some(record) = self.service.describe_instance(id).await? else {
            info!(id, "instance already gone");
            return Ok(());
        };
        let current = self.attributes_of(&record)?;
        if current.get_str("instance_charge_type") == Some(PREPAID) {
            if !state.attributes.get_bool("force_delete").unwrap_or(false) {
                return Err(ValidationError::Invalid {
                    attribute: "force_delete".to_owned(),
                    reason: format!(
                        "{id} is a PrePaid instance; switch it to PostPaid or set force_delete"
                    ),
                }
                .into());
            }
            self.modify_charge_type(id, POSTPAID, &Attributes::new(), self.timeouts.delete)
                .await?;
            info!(id, "subscription converted before release");
        }

        let request = DeleteInstance {
            instance_id: id.to_owned(),
        };
        let reply: Result<Acknowledged, _> = self
            .service
            .send(&request, id, classify_with(&INSTANCE_DELETE_RETRY_CODES))
            .await;
        match reply {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        self.service
            .reconciler(self.timeouts.delete)
            .with_pending(DELETE_PENDING)
            .wait_for(id, WaitTarget::Gone, &[], || {
                self.service.describe_instance(id)
            })
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        info!(id, "instance released");
        Ok(())
    }
}

impl<C: CloudApi> Resource for EcsInstance<C> {
    fn type_name(&self) -> &'static str {
        "ecs_instance"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn create<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(self.create_instance(config))
    }

    fn read<'a>(&'a self, id: &'a str) -> LifecycleFuture<'a, Option<ResourceState>> {
        Box::pin(self.read_instance(id))
    }

    fn update<'a>(
        &'a self,
        prior: &'a ResourceState,
        config: &'a Attributes,
    ) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(self.update_instance(prior, config))
    }

    fn delete<'a>(&'a self, state: &'a ResourceState) -> LifecycleFuture<'a, ()> {
        Box::pin(self.delete_instance(state))
    }
}

fn instance_type_candidates(config: &Attributes) -> Result<Vec<String>, LifecycleError> {
    let candidates = match INSTANCE_TYPE_GROUP.resolve(config)? {
        Some("instance_type") => config
            .get_str("instance_type")
            .map(|value| vec![value.to_owned()])
            .unwrap_or_default(),
        Some(_) => config.get_string_list("instance_types"),
        None => Vec::new(),
    };
    Ok(candidates)
}

fn is_no_stock(err: &LifecycleError) -> bool {
    err.api_code()
        .is_some_and(|code| NO_STOCK_CODES.contains(&code))
}

fn run_instances(config: &Attributes, instance_type: &str) -> RunInstances {
    let text = |name: &str| config.get_str(name).map(str::to_owned);
    let prepaid = config.get_str("instance_charge_type") == Some(PREPAID);
    RunInstances {
        image_id: config.get_str("image_id").unwrap_or_default().to_owned(),
        instance_type: instance_type.to_owned(),
        security_group_ids: config.get_string_list("security_groups"),
        zone_id: text("availability_zone"),
        vswitch_id: text("vswitch_id"),
        instance_name: text("instance_name"),
        description: text("description"),
        host_name: text("host_name"),
        password: text("password"),
        internet_charge_type: text("internet_charge_type"),
        internet_max_bandwidth_out: config.get_int("internet_max_bandwidth_out"),
        system_disk_category: text("system_disk_category"),
        system_disk_size: config.get_int("system_disk_size"),
        instance_charge_type: text("instance_charge_type"),
        period: config.get_int("period").filter(|_| prepaid),
        period_unit: text("period_unit").filter(|_| prepaid),
        private_ip_address: text("private_ip"),
        deletion_protection: config.get_bool("deletion_protection").unwrap_or(false),
        user_data: config.get_str("user_data").map(encode_user_data),
        client_token: Uuid::new_v4().to_string(),
    }
}

/// User data must reach the API base64-encoded; already-encoded input is
/// passed through.
fn encode_user_data(raw: &str) -> String {
    if STANDARD.decode(raw).is_ok() {
        raw.to_owned()
    } else {
        STANDARD.encode(raw)
    }
}

fn instance_schema() -> Schema {
    Schema::new(vec![
        Attribute::optional("availability_zone", AttrType::String)
            .source("ZoneId")
            .force_new(),
        Attribute::required("image_id", AttrType::String),
        Attribute::optional("instance_type", AttrType::String),
        Attribute::optional("instance_types", AttrType::List(Box::new(AttrType::String))),
        Attribute::required(
            "security_groups",
            AttrType::List(Box::new(AttrType::String)),
        )
        .source("SecurityGroupIds"),
        Attribute::optional("vswitch_id", AttrType::String).source("VpcAttributes.VSwitchId"),
        Attribute::optional("private_ip", AttrType::String),
        Attribute::optional("instance_name", AttrType::String)
            .validator(Validator::Length { min: 2, max: 128 }),
        Attribute::optional("description", AttrType::String)
            .validator(Validator::Length { min: 2, max: 256 }),
        Attribute::optional("host_name", AttrType::String),
        Attribute::optional("password", AttrType::String)
            .validator(Validator::Length { min: 8, max: 30 }),
        Attribute::optional("internet_charge_type", AttrType::String)
            .validator(Validator::OneOf(&["PayByTraffic", "PayByBandwidth"]))
            .default_value("PayByTraffic"),
        Attribute::optional("internet_max_bandwidth_out", AttrType::Int)
            .validator(Validator::IntRange { min: 0, max: 100 }),
        Attribute::optional("system_disk_category", AttrType::String)
            .validator(Validator::OneOf(&[
                "cloud",
                "cloud_efficiency",
                "cloud_ssd",
                "cloud_essd",
            ]))
            .default_value("cloud_efficiency")
            .force_new(),
        Attribute::optional("system_disk_size", AttrType::Int)
            .validator(Validator::IntRange { min: 20, max: 500 })
            .default_value(Value::Int(40)),
        Attribute::optional("instance_charge_type", AttrType::String)
            .validator(Validator::OneOf(&[PREPAID, POSTPAID]))
            .default_value(POSTPAID),
        Attribute::optional("period", AttrType::Int)
            .validator(Validator::IntRange { min: 1, max: 60 })
            .default_value(Value::Int(1)),
        Attribute::optional("period_unit", AttrType::String)
            .validator(Validator::OneOf(&["Week", "Month"]))
            .default_value("Month"),
        Attribute::optional("user_data", AttrType::String),
        Attribute::optional("status", AttrType::String)
            .validator(Validator::OneOf(&[RUNNING_STATUS, STOPPED_STATUS]))
            .default_value(RUNNING_STATUS),
        Attribute::optional("deletion_protection", AttrType::Bool)
            .default_value(Value::Bool(false)),
        Attribute::optional("force_delete", AttrType::Bool).default_value(Value::Bool(false)),
        Attribute::optional("tags", AttrType::Tags),
        Attribute::computed("public_ip", AttrType::String),
        Attribute::computed("cpu", AttrType::Int),
        Attribute::computed("memory", AttrType::Int),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::schema::ValidationError;
    use crate::test_support::{ScriptedApi, instance_json, instances_page, with_fields};
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn api() -> ScriptedApi {
        ScriptedApi::new()
    }

    fn resource(api: &ScriptedApi) -> EcsInstance<ScriptedApi> {
        let settings = ServiceSettings {
            poll_interval: Duration::from_secs(5),
            ..ServiceSettings::default()
        };
        EcsInstance::new(EcsService::new(api.clone(), settings))
    }

    fn config() -> Attributes {
        Attributes::new()
            .with("image_id", "ubuntu_22_04_x64")
            .with("instance_type", "ecs.g6.large")
            .with("security_groups", Value::string_list(["sg-1"]))
            .with("instance_name", "web-1")
            .with("password", "Sup3rSecret!")
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn missing_image_fails_without_any_call(api: ScriptedApi) {
        let mut config = config();
        config.remove("image_id");
        let err = resource(&api)
            .create(&config)
            .await
            .expect_err("image_id is required");
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::Missing { .. })
        ));
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn missing_instance_type_group_fails_without_any_call(api: ScriptedApi) {
        let mut config = config();
        config.remove("instance_type");
        let err = resource(&api)
            .create(&config)
            .await
            .expect_err("an instance type is required");
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::MissingOneOf { .. })
        ));
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn create_waits_for_running_and_keeps_the_password(api: ScriptedApi) {
        api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-1"]}}));
        api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Pending")]));
        api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Starting")]));
        api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Running")]));
        api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Running")]));

        let state = resource(&api)
            .create(&config())
            .await
            .unwrap_or_else(|err| panic!("{err}"));

        assert_eq!(state.id, "i-1");
        assert_eq!(state.attributes.get_str("status"), Some("Running"));
        assert_eq!(state.attributes.get_str("password"), Some("Sup3rSecret!"));
        assert_eq!(state.attributes.get_str("private_ip"), Some("172.16.0.10"));
        let calls = api.invocations();
        let run = calls.first().unwrap_or_else(|| panic!("RunInstances sent"));
        assert_eq!(run.action, "RunInstances");
        assert_eq!(run.params.get("InstanceType"), Some("ecs.g6.large"));
        assert_eq!(run.params.get("SecurityGroupIds.1"), Some("sg-1"));
        assert_eq!(run.params.get("SystemDisk.Category"), Some("cloud_efficiency"));
        assert_eq!(calls.len(), 5);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn create_falls_back_to_the_next_instance_type(api: ScriptedApi) {
        api.push_err(crate::client::ApiError::service(
            "OperationDenied.NoStock",
            "sold out",
        ));
        api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-2"]}}));
        api.push_ok(instances_page(&[instance_json("i-2", "web-1", "Running")]));
        api.push_ok(instances_page(&[instance_json("i-2", "web-1", "Running")]));

        let mut config = config();
        config.remove("instance_type");
        config.insert(
            "instance_types",
            Value::string_list(["ecs.g6.large", "ecs.g5.large"]),
        );
        let state = resource(&api)
            .create(&config)
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.id, "i-2");
        let types: Vec<_> = api
            .invocations()
            .iter()
            .filter(|call| call.action == "RunInstances")
            .map(|call| call.params.get("InstanceType").map(str::to_owned))
            .collect();
        assert_eq!(
            types,
            [Some("ecs.g6.large".to_owned()), Some("ecs.g5.large".to_owned())]
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn failed_tagging_reports_a_partial_create(api: ScriptedApi) {
        api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-3"]}}));
        api.push_ok(instances_page(&[instance_json("i-3", "web-1", "Running")]));
        api.push_err(crate::client::ApiError::service(
            "InvalidTagKey.Malformed",
            "bad key",
        ));
        let config = config().with("tags", Value::string_map([("bad key", "1")]));
        let err = resource(&api)
            .create(&config)
            .await
            .expect_err("tagging fails");
        match err {
            LifecycleError::PartialCreate { id, .. } => assert_eq!(id, "i-3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn delete_of_a_missing_instance_sends_nothing_else(api: ScriptedApi) {
        api.push_ok(instances_page(&[]));
        resource(&api)
            .delete(&ResourceState::new("i-gone", Attributes::new()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        let actions: Vec<_> = api.invocations().into_iter().map(|call| call.action).collect();
        assert_eq!(actions, ["DescribeInstances"]);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn delete_retries_busy_instances_then_waits_for_absence(api: ScriptedApi) {
        api.push_ok(instances_page(&[instance_json("i-4", "web", "Running")]));
        api.push_err(crate::client::ApiError::service(
            "IncorrectInstanceStatus.Initializing",
            "busy",
        ));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(instances_page(&[instance_json("i-4", "web", "Stopping")]));
        api.push_ok(instances_page(&[]));
        resource(&api)
            .delete(&ResourceState::new("i-4", Attributes::new()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        let actions: Vec<_> = api.invocations().into_iter().map(|call| call.action).collect();
        assert_eq!(
            actions,
            [
                "DescribeInstances",
                "DeleteInstance",
                "DeleteInstance",
                "DescribeInstances",
                "DescribeInstances"
            ]
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn update_renames_and_retags(api: ScriptedApi) {
        let prior = ResourceState::new(
            "i-5",
            instance_schema().with_defaults(
                &Attributes::new()
                    .with("image_id", "ubuntu_22_04_x64")
                    .with("instance_type", "ecs.g6.large")
                    .with("security_groups", Value::string_list(["sg-1"]))
                    .with("instance_name", "old-name")
                    .with("tags", Value::string_map([("env", "dev")])),
            ),
        );
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(json!({"RequestId": "r-2"}));
        api.push_ok(instances_page(&[instance_json("i-5", "web-1", "Running")]));

        let mut config = config().with("tags", Value::string_map([("env", "prod")]));
        config.remove("password");
        let state = resource(&api)
            .update(&prior, &config)
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.attributes.get_str("instance_name"), Some("web-1"));
        let calls = api.invocations();
        let actions: Vec<_> = calls.iter().map(|call| call.action.as_str()).collect();
        assert_eq!(
            actions,
            ["ModifyInstanceAttribute", "TagResources", "DescribeInstances"]
        );
        assert_eq!(
            calls.first().and_then(|call| call.params.get("InstanceName")),
            Some("web-1")
        );
        assert_eq!(calls.first().and_then(|call| call.params.get("Password")), None);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn create_stops_the_instance_when_asked(api: ScriptedApi) {
        api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-6"]}}));
        api.push_ok(instances_page(&[instance_json("i-6", "web-1", "Running")]));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(instances_page(&[instance_json("i-6", "web-1", "Stopped")]));
        api.push_ok(instances_page(&[instance_json("i-6", "web-1", "Stopped")]));

        let state = resource(&api)
            .create(&config().with("status", "Stopped"))
            .await
            .unwrap_or_else(|err| panic!("{err}"));

        assert_eq!(state.attributes.get_str("status"), Some("Stopped"));
        let calls = api.invocations();
        let stop = calls
            .iter()
            .find(|call| call.action == "StopInstance")
            .unwrap_or_else(|| panic!("StopInstance sent"));
        assert_eq!(stop.params.get("ForceStop"), Some("false"));
        assert_eq!(calls.len(), 5);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn unknown_status_targets_are_rejected(api: ScriptedApi) {
        let err = resource(&api)
            .create(&config().with("status", "Paused"))
            .await
            .expect_err("only Running and Stopped are targets");
        assert!(err.is_configuration());
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn bandwidth_changes_apply_without_a_restart(api: ScriptedApi) {
        let prior = ResourceState::new(
            "i-7",
            instance_schema()
                .with_defaults(&config().with("internet_max_bandwidth_out", Value::Int(0))),
        );
        api.push_ok(json!({"RequestId": "r-1"}));
        let before = instance_json("i-7", "web-1", "Running");
        let after = with_fields(before.clone(), json!({"InternetMaxBandwidthOut": 10}));
        api.push_ok(instances_page(&[before]));
        api.push_ok(instances_page(std::slice::from_ref(&after)));
        api.push_ok(instances_page(&[after]));

        let config = config().with("internet_max_bandwidth_out", Value::Int(10));
        let state = resource(&api)
            .update(&prior, &config)
            .await
            .unwrap_or_else(|err| panic!("{err}"));

        assert_eq!(state.attributes.get_int("internet_max_bandwidth_out"), Some(10));
        let calls = api.invocations();
        let actions: Vec<_> = calls.iter().map(|call| call.action.as_str()).collect();
        assert_eq!(
            actions,
            [
                "ModifyInstanceNetworkSpec",
                "DescribeInstances",
                "DescribeInstances",
                "DescribeInstances"
            ]
        );
        assert_eq!(
            calls
                .first()
                .and_then(|call| call.params.get("InternetMaxBandwidthOut")),
            Some("10")
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn forced_delete_converts_a_subscription_first(api: ScriptedApi) {
        let prepaid = with_fields(
            instance_json("i-8", "web", "Running"),
            json!({"InstanceChargeType": "PrePaid"}),
        );
        api.push_ok(instances_page(&[prepaid]));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(instances_page(&[instance_json("i-8", "web", "Running")]));
        api.push_ok(json!({"RequestId": "r-2"}));
        api.push_ok(instances_page(&[]));

        let state = ResourceState::new("i-8", Attributes::new().with("force_delete", true));
        resource(&api)
            .delete(&state)
            .await
            .unwrap_or_else(|err| panic!("{err}"));

        let calls = api.invocations();
        let actions: Vec<_> = calls.iter().map(|call| call.action.as_str()).collect();
        assert_eq!(
            actions,
            [
                "DescribeInstances",
                "ModifyInstanceChargeType",
                "DescribeInstances",
                "DeleteInstance",
                "DescribeInstances"
            ]
        );
        let convert = calls
            .get(1)
            .unwrap_or_else(|| panic!("charge type change sent"));
        assert_eq!(convert.params.get("InstanceChargeType"), Some("PostPaid"));
        assert_eq!(convert.params.get("InstanceIds"), Some(r#"["i-8"]"#));
        assert_eq!(convert.params.get("Period"), None);
    }

    #[rstest]
    #[case("plain text", "cGxhaW4gdGV4dA==")]
    #[case("cGxhaW4gdGV4dA==", "cGxhaW4gdGV4dA==")]
    fn user_data_is_encoded_once(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(encode_user_data(raw), expected);
    }
}
