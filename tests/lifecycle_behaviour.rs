//! End-to-end convergence scenarios driven through `apply`, `refresh` and
//! `destroy` against a scripted API.

use std::time::Duration;

use converge::test_support::{ScriptedApi, instance_json, instances_page, with_fields};
use converge::{
    Attributes, EcsInstance, EcsService, LifecycleError, Resource, ResourceState,
    SecurityGroupRule, ServiceSettings, Value, apply, destroy, refresh,
};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn api() -> ScriptedApi {
    ScriptedApi::new()
}

fn service(api: &ScriptedApi) -> EcsService<ScriptedApi> {
    EcsService::new(
        api.clone(),
        ServiceSettings {
            poll_interval: Duration::from_secs(2),
            ..ServiceSettings::default()
        },
    )
}

fn instance(api: &ScriptedApi) -> EcsInstance<ScriptedApi> {
    EcsInstance::new(service(api))
}

fn web_config() -> Attributes {
    Attributes::new()
        .with("image_id", "ubuntu_22_04_x64")
        .with("instance_type", "ecs.g6.large")
        .with("security_groups", Value::string_list(["sg-1"]))
        .with("vswitch_id", "vsw-1")
        .with("instance_name", "web-1")
}

fn recorded(resource: &EcsInstance<ScriptedApi>, id: &str) -> ResourceState {
    ResourceState::new(id, resource.schema().with_defaults(&web_config()))
}

fn actions(api: &ScriptedApi) -> Vec<String> {
    api.invocations().into_iter().map(|call| call.action).collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn converged_instance_is_left_alone(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Running")]));

    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &web_config())
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-1");
    assert_eq!(
        state.attributes.get_str("system_disk_category"),
        Some("cloud_efficiency"),
        "write-only attributes survive the refresh"
    );
    assert_eq!(actions(&api), ["DescribeInstances"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn renaming_updates_in_place(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(instances_page(&[instance_json("i-1", "web-1", "Running")]));
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(instances_page(&[instance_json("i-1", "web-2", "Running")]));

    let config = web_config().with("instance_name", "web-2");
    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &config)
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-1");
    assert_eq!(state.attributes.get_str("instance_name"), Some("web-2"));
    assert_eq!(
        actions(&api),
        [
            "DescribeInstances",
            "ModifyInstanceAttribute",
            "DescribeInstances"
        ]
    );
}

fn described(id: &str, status: &str, fields: serde_json::Value) -> serde_json::Value {
    instances_page(&[with_fields(instance_json(id, "web-1", status), fields)])
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn changing_the_type_restarts_the_instance_in_place(api: ScriptedApi) {
    let resource = instance(&api);
    let bigger = json!({"InstanceType": "ecs.g6.xlarge"});
    // refresh
    api.push_ok(described("i-1", "Running", json!({})));
    // stop
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(described("i-1", "Stopping", json!({})));
    api.push_ok(described("i-1", "Stopped", json!({})));
    // new type
    api.push_ok(json!({"RequestId": "r-2"}));
    api.push_ok(described("i-1", "Stopped", bigger.clone()));
    // start
    api.push_ok(json!({"RequestId": "r-3"}));
    api.push_ok(described("i-1", "Running", bigger.clone()));
    // settle
    api.push_ok(described("i-1", "Running", bigger));

    let config = web_config().with("instance_type", "ecs.g6.xlarge");
    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &config)
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-1");
    assert_eq!(state.attributes.get_str("instance_type"), Some("ecs.g6.xlarge"));
    assert_eq!(state.attributes.get_str("status"), Some("Running"));
    let sent: Vec<_> = actions(&api)
        .into_iter()
        .filter(|action| action != "DescribeInstances")
        .collect();
    assert_eq!(sent, ["StopInstance", "ModifyInstanceSpec", "StartInstance"]);
    assert!(!actions(&api).iter().any(|action| action == "DeleteInstance"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stopping_waits_until_the_instance_is_stopped(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(described("i-1", "Running", json!({})));
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(described("i-1", "Running", json!({})));
    api.push_ok(described("i-1", "Stopping", json!({})));
    api.push_ok(described("i-1", "Stopped", json!({})));
    api.push_ok(described("i-1", "Stopped", json!({})));

    let config = web_config().with("status", "Stopped");
    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &config)
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.attributes.get_str("status"), Some("Stopped"));
    assert_eq!(
        actions(&api),
        [
            "DescribeInstances",
            "StopInstance",
            "DescribeInstances",
            "DescribeInstances",
            "DescribeInstances",
            "DescribeInstances"
        ]
    );
    assert_eq!(api.pending(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn changing_the_image_replaces_the_system_disk(api: ScriptedApi) {
    let resource = instance(&api);
    let centos = json!({"ImageId": "centos_7_9_x64"});
    api.push_ok(described("i-1", "Running", json!({})));
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(described("i-1", "Stopped", json!({})));
    api.push_ok(json!({"RequestId": "r-2"}));
    api.push_ok(described("i-1", "Stopped", centos.clone()));
    api.push_ok(json!({"RequestId": "r-3"}));
    api.push_ok(described("i-1", "Running", centos.clone()));
    api.push_ok(described("i-1", "Running", centos));

    let config = web_config().with("image_id", "centos_7_9_x64");
    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &config)
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-1");
    assert_eq!(state.attributes.get_str("image_id"), Some("centos_7_9_x64"));
    let replace = api
        .invocations()
        .into_iter()
        .find(|call| call.action == "ReplaceSystemDisk")
        .unwrap_or_else(|| panic!("ReplaceSystemDisk sent"));
    assert_eq!(replace.params.get("ImageId"), Some("centos_7_9_x64"));
    assert!(
        !actions(&api)
            .iter()
            .any(|action| action == "DeleteInstance" || action == "RunInstances")
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn moving_zones_replaces_the_instance(api: ScriptedApi) {
    let resource = instance(&api);
    // refresh
    api.push_ok(described("i-1", "Running", json!({})));
    // delete
    api.push_ok(described("i-1", "Running", json!({})));
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(instances_page(&[]));
    // create
    api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-2"]}}));
    api.push_ok(described("i-2", "Running", json!({"ZoneId": "cn-hangzhou-j"})));
    api.push_ok(described("i-2", "Running", json!({"ZoneId": "cn-hangzhou-j"})));

    let config = web_config().with("availability_zone", "cn-hangzhou-j");
    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &config)
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-2");
    assert_eq!(
        actions(&api),
        [
            "DescribeInstances",
            "DescribeInstances",
            "DeleteInstance",
            "DescribeInstances",
            "RunInstances",
            "DescribeInstances",
            "DescribeInstances"
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn vanished_instance_is_recreated(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(instances_page(&[]));
    api.push_ok(json!({"InstanceIdSets": {"InstanceIdSet": ["i-9"]}}));
    api.push_ok(instances_page(&[instance_json("i-9", "web-1", "Running")]));
    api.push_ok(instances_page(&[instance_json("i-9", "web-1", "Running")]));

    let state = apply(&resource, Some(&recorded(&resource, "i-1")), &web_config())
        .await
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, "i-9");
    assert_eq!(
        actions(&api),
        [
            "DescribeInstances",
            "RunInstances",
            "DescribeInstances",
            "DescribeInstances"
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn refresh_reports_vanished_objects(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(instances_page(&[]));
    let current = refresh(&resource, &recorded(&resource, "i-1"))
        .await
        .unwrap_or_else(|err| panic!("{err}"));
    assert!(current.is_none());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn importing_a_missing_instance_fails(api: ScriptedApi) {
    api.push_ok(instances_page(&[]));
    let err = instance(&api)
        .import("i-gone")
        .await
        .expect_err("nothing to import");
    assert!(matches!(err, LifecycleError::ImportNotFound { ref id } if id == "i-gone"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn destroying_an_absent_instance_succeeds(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(instances_page(&[]));
    destroy(&resource, &recorded(&resource, "i-1"))
        .await
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(actions(&api), ["DescribeInstances"]);
    assert_eq!(api.pending(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn subscription_instances_are_kept_without_force_delete(api: ScriptedApi) {
    let resource = instance(&api);
    api.push_ok(described("i-1", "Running", json!({"InstanceChargeType": "PrePaid"})));
    let err = destroy(&resource, &recorded(&resource, "i-1"))
        .await
        .expect_err("PrePaid instances need force_delete");
    assert!(err.is_configuration());
    assert_eq!(actions(&api), ["DescribeInstances"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rule_description_changes_update_in_place(api: ScriptedApi) {
    let rule = SecurityGroupRule::new(service(&api));
    let permission = |description: &str| {
        json!({
            "SecurityGroupId": "sg-1",
            "Permissions": {"Permission": [{
                "Direction": "ingress",
                "IpProtocol": "TCP",
                "PortRange": "22/22",
                "NicType": "intranet",
                "Policy": "Accept",
                "Priority": 1,
                "SourceCidrIp": "10.0.0.0/8",
                "Description": description
            }]}
        })
    };
    api.push_ok(permission(""));
    api.push_ok(json!({"RequestId": "r-1"}));
    api.push_ok(permission("ssh from the office"));

    let id = "sg-1:ingress:tcp:22/22:intranet:10.0.0.0/8:accept:1";
    let config = Attributes::new()
        .with("security_group_id", "sg-1")
        .with("type", "ingress")
        .with("ip_protocol", "tcp")
        .with("port_range", "22/22")
        .with("cidr_ip", "10.0.0.0/8");
    let prior = ResourceState::new(id, rule.schema().with_defaults(&config));

    let state = apply(
        &rule,
        Some(&prior),
        &config.with("description", "ssh from the office"),
    )
    .await
    .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(state.id, id);
    assert_eq!(
        state.attributes.get_str("description"),
        Some("ssh from the office")
    );
    assert_eq!(
        actions(&api),
        [
            "DescribeSecurityGroupAttribute",
            "ModifySecurityGroupRule",
            "DescribeSecurityGroupAttribute"
        ]
    );
}
