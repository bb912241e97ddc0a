//! The `ecs_disk_attachment` resource: one data disk attached to one
//! instance, addressed as `disk_id:instance_id`.

use tracing::{info, warn};

use super::EcsService;
use super::api::{Acknowledged, AttachDisk, DetachDisk, DiskRecord};
use crate::client::{CloudApi, classify_with};
use crate::error::LifecycleError;
use crate::identity::CompositeId;
use crate::lifecycle::{LifecycleFuture, Resource, ResourceState, Timeouts};
use crate::reconcile::WaitTarget;
use crate::schema::{AttrType, Attribute, Attributes, Schema};

const ATTACH_RETRY_CODES: [&str; 4] = [
    "IncorrectDiskStatus",
    "IncorrectInstanceStatus",
    "OperationConflict",
    "InternalError",
];
const IN_USE: &[&str] = &["In_use"];
const ATTACH_PENDING: &[&str] = &["Available", "Attaching"];
const DETACH_PENDING: &[&str] = &["In_use", "Detaching"];

/// Attaches an existing disk to an existing instance.
#[derive(Clone, Debug)]
pub struct DiskAttachment<C> {
    service: EcsService<C>,
    schema: Schema,
    timeouts: Timeouts,
}

impl<C: CloudApi> DiskAttachment<C> {
    /// Creates the resource with five-minute timeouts.
    #[must_use]
    pub fn new(service: EcsService<C>) -> Self {
        Self {
            service,
            schema: attachment_schema(),
            timeouts: Timeouts::default(),
        }
    }

    /// Replaces the wait budgets.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The disk as seen by this attachment: present only while it is in use
    /// by `instance_id`.
    async fn attached_disk(
        &self,
        disk_id: &str,
        instance_id: &str,
    ) -> Result<Option<DiskRecord>, LifecycleError> {
        Ok(self
            .service
            .describe_disk(disk_id)
            .await?
            .filter(|disk| disk.instance_id == instance_id && disk.status != "Available"))
    }

    async fn create_attachment(&self, config: &Attributes) -> Result<ResourceState, LifecycleError> {
        self.schema.validate(config)?;
        let disk_id = config.get_str("disk_id").unwrap_or_default();
        let instance_id = config.get_str("instance_id").unwrap_or_default();
        let id = CompositeId::new([disk_id, instance_id])?.to_string();

        if self.service.describe_disk(disk_id).await?.is_none() {
            return Err(LifecycleError::Vanished {
                id: disk_id.to_owned(),
            });
        }
        let request = AttachDisk {
            disk_id: disk_id.to_owned(),
            instance_id: instance_id.to_owned(),
            delete_with_instance: config.get_bool("delete_with_instance"),
        };
        let _: Acknowledged = self
            .service
            .send(&request, &id, classify_with(&ATTACH_RETRY_CODES))
            .await?;
        info!(disk_id, instance_id, "disk attach requested");

        self.finish_attach(&id, disk_id)
            .await
            .map_err(|err| LifecycleError::partial_create(id.as_str(), err))
    }

    async fn finish_attach(&self, id: &str, disk_id: &str) -> Result<ResourceState, LifecycleError> {
        self.service
            .reconciler(self.timeouts.create)
            .with_pending(ATTACH_PENDING)
            .wait_for(id, WaitTarget::States(IN_USE), &[], || {
                self.service.describe_disk(disk_id)
            })
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        self.read_attachment(id)
            .await?
            .ok_or_else(|| LifecycleError::Vanished { id: id.to_owned() })
    }

    async fn read_attachment(&self, id: &str) -> Result<Option<ResourceState>, LifecycleError> {
        let parsed = CompositeId::parse(id, 2)?;
        let disk_id = parsed.part(0)?;
        let instance_id = parsed.part(1)?;
        let Some(disk) = self.service.describe_disk(disk_id).await? else {
            return Ok(None);
        };
        if disk.instance_id != instance_id || !IN_USE.contains(&disk.status.as_str()) {
            info!(
                id,
                attached_to = %disk.instance_id,
                status = %disk.status,
                "disk is not attached here"
            );
            return Ok(None);
        }
        let mut attributes = Attributes::new()
            .with("disk_id", disk.disk_id.as_str())
            .with("instance_id", disk.instance_id.as_str())
            .with("delete_with_instance", disk.delete_with_instance);
        if !disk.device.is_empty() {
            attributes.insert("device", disk.device.as_str());
        }
        Ok(Some(ResourceState::new(id, attributes)))
    }

    async fn delete_attachment(&self, id: &str) -> Result<(), LifecycleError> {
        let parsed = CompositeId::parse(id, 2)?;
        let disk_id = parsed.part(0)?;
        let instance_id = parsed.part(1)?;
        if self.attached_disk(disk_id, instance_id).await?.is_none() {
            info!(id, "disk already detached");
            return Ok(());
        }
        let request = DetachDisk {
            disk_id: disk_id.to_owned(),
            instance_id: instance_id.to_owned(),
        };
        let reply: Result<Acknowledged, _> = self
            .service
            .send(&request, id, classify_with(&ATTACH_RETRY_CODES))
            .await;
        match reply {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                warn!(id, "disk or instance vanished while detaching");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.service
            .reconciler(self.timeouts.delete)
            .with_pending(DETACH_PENDING)
            .wait_for(id, WaitTarget::Gone, &[], || {
                self.attached_disk(disk_id, instance_id)
            })
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        Ok(())
    }
}

impl<C: CloudApi> Resource for DiskAttachment<C> {
    fn type_name(&self) -> &'static str {
        "ecs_disk_attachment"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn create<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(self.create_attachment(config))
    }

    fn read<'a>(&'a self, id: &'a str) -> LifecycleFuture<'a, Option<ResourceState>> {
        Box::pin(self.read_attachment(id))
    }

    // Every attribute forces replacement, so there is nothing to change in
    // place.
    fn update<'a>(
        &'a self,
        prior: &'a ResourceState,
        _config: &'a Attributes,
    ) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(async move {
            self.read_attachment(&prior.id)
                .await?
                .ok_or_else(|| LifecycleError::Vanished {
                    id: prior.id.clone(),
                })
        })
    }

    fn delete<'a>(&'a self, state: &'a ResourceState) -> LifecycleFuture<'a, ()> {
        Box::pin(self.delete_attachment(&state.id))
    }
}

fn attachment_schema() -> Schema {
    Schema::new(vec![
        Attribute::required("disk_id", AttrType::String).force_new(),
        Attribute::required("instance_id", AttrType::String).force_new(),
        Attribute::optional("delete_with_instance", AttrType::Bool).force_new(),
        Attribute::computed("device", AttrType::String),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::config::ServiceSettings;
    use crate::test_support::ScriptedApi;
    use rstest::{fixture, rstest};
    use serde_json::{Value as Json, json};

    #[fixture]
    fn api() -> ScriptedApi {
        ScriptedApi::new()
    }

    fn resource(api: &ScriptedApi) -> DiskAttachment<ScriptedApi> {
        DiskAttachment::new(EcsService::new(api.clone(), ServiceSettings::default()))
    }

    fn disks(instance_id: &str, status: &str) -> Json {
        json!({"Disks": {"Disk": [{
            "DiskId": "d-1",
            "InstanceId": instance_id,
            "Status": status,
            "Device": if status == "In_use" { "/dev/xvdb" } else { "" },
            "DeleteWithInstance": false
        }]}})
    }

    fn config() -> Attributes {
        Attributes::new()
            .with("disk_id", "d-1")
            .with("instance_id", "i-1")
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn attach_waits_until_the_disk_is_in_use(api: ScriptedApi) {
        api.push_ok(disks("", "Available"));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(disks("i-1", "Attaching"));
        api.push_ok(disks("i-1", "In_use"));
        api.push_ok(disks("i-1", "In_use"));
        let state = resource(&api)
            .create(&config())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.id, "d-1:i-1");
        assert_eq!(state.attributes.get_str("device"), Some("/dev/xvdb"));
        let actions: Vec<_> = api.invocations().into_iter().map(|call| call.action).collect();
        assert_eq!(
            actions,
            ["DescribeDisks", "AttachDisk", "DescribeDisks", "DescribeDisks", "DescribeDisks"]
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn attach_retries_busy_instances(api: ScriptedApi) {
        api.push_ok(disks("", "Available"));
        api.push_err(ApiError::service("IncorrectInstanceStatus", "starting"));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(disks("i-1", "In_use"));
        api.push_ok(disks("i-1", "In_use"));
        resource(&api)
            .create(&config())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(api.invocations().len(), 5);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn missing_disk_is_reported_before_attaching(api: ScriptedApi) {
        api.push_ok(json!({"Disks": {"Disk": []}}));
        let err = resource(&api)
            .create(&config())
            .await
            .expect_err("disk is missing");
        assert!(err.is_not_found());
        assert_eq!(api.invocations().len(), 1);
    }

    #[rstest]
    #[case(disks("i-2", "In_use"))]
    #[case(disks("i-1", "Available"))]
    #[case(json!({"Disks": {"Disk": []}}))]
    #[tokio::test(start_paused = true)]
    async fn read_reports_absent_attachments(#[case] reply: Json) {
        let api = ScriptedApi::new();
        api.push_ok(reply);
        let found = resource(&api)
            .read("d-1:i-1")
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert!(found.is_none());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn detach_waits_until_the_disk_is_released(api: ScriptedApi) {
        api.push_ok(disks("i-1", "In_use"));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(disks("i-1", "Detaching"));
        api.push_ok(disks("", "Available"));
        resource(&api)
            .delete(&ResourceState::new("d-1:i-1", Attributes::new()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        let calls = api.invocations();
        let detach = calls.get(1).unwrap_or_else(|| panic!("detach sent"));
        assert_eq!(detach.action, "DetachDisk");
        assert_eq!(detach.params.get("InstanceId"), Some("i-1"));
        assert_eq!(calls.len(), 4);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn detaching_a_detached_disk_sends_nothing_else(api: ScriptedApi) {
        api.push_ok(disks("", "Available"));
        resource(&api)
            .delete(&ResourceState::new("d-1:i-1", Attributes::new()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(api.invocations().len(), 1);
    }
}
