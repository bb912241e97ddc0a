//! Typed ECS requests and responses.
//!
//! Records keep the raw JSON object they were decoded from so the response
//! mapper can flatten attributes the typed head does not name.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::builder::{ApiRequest, Params};
use crate::paginate::{Listable, PageCursor};
use crate::reconcile::Observed;

/// `DescribeInstances`, filtered server-side where the API allows it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DescribeInstances {
    /// Restricts the result to these ids (at most 100 per call).
    pub instance_ids: Vec<String>,
    /// Exact instance name; wildcards are applied client-side instead.
    pub instance_name: Option<String>,
    /// Instance status.
    pub status: Option<String>,
    /// VPC id.
    pub vpc_id: Option<String>,
    /// `VSwitch` id.
    pub vswitch_id: Option<String>,
    /// Zone id.
    pub zone_id: Option<String>,
    /// Image id.
    pub image_id: Option<String>,
    /// Security group id.
    pub security_group_id: Option<String>,
    /// Resource group id.
    pub resource_group_id: Option<String>,
    /// Tags every returned instance must carry.
    pub tags: BTreeMap<String, String>,
    /// Page to fetch, starting at 1.
    pub page_number: u32,
    /// Page size.
    pub page_size: u32,
}

impl DescribeInstances {
    /// Looks up a single instance.
    #[must_use]
    pub fn by_id(id: &str) -> Self {
        Self {
            instance_ids: vec![id.to_owned()],
            page_number: 1,
            page_size: 1,
            ..Self::default()
        }
    }

    /// Copy of the query positioned at `cursor`.
    #[must_use]
    pub fn at(&self, cursor: &PageCursor, page_size: u32) -> Self {
        let page_number = match cursor {
            PageCursor::Number(number) => *number,
            PageCursor::Token(_) => 1,
        };
        Self {
            page_number,
            page_size,
            ..self.clone()
        }
    }
}

impl ApiRequest for DescribeInstances {
    fn action(&self) -> &'static str {
        "DescribeInstances"
    }

    fn params(&self) -> Params {
        let params = if self.instance_ids.is_empty() {
            Params::new()
        } else {
            Params::new().set_json_list("InstanceIds", self.instance_ids.as_slice())
        };
        params
            .set_opt("InstanceName", self.instance_name.as_deref())
            .set_opt("Status", self.status.as_deref())
            .set_opt("VpcId", self.vpc_id.as_deref())
            .set_opt("VSwitchId", self.vswitch_id.as_deref())
            .set_opt("ZoneId", self.zone_id.as_deref())
            .set_opt("ImageId", self.image_id.as_deref())
            .set_opt("SecurityGroupId", self.security_group_id.as_deref())
            .set_opt("ResourceGroupId", self.resource_group_id.as_deref())
            .set_tags(&self.tags)
            .set("PageNumber", self.page_number.max(1).to_string())
            .set("PageSize", self.page_size.max(1).to_string())
    }
}

/// `DescribeInstances` reply.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesResponse {
    /// Instances on this page.
    #[serde(default)]
    pub instances: InstanceSet,
    /// Total number of matches across all pages.
    #[serde(default)]
    pub total_count: u32,
}

/// `{"Instance": [...]}` wrapper.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InstanceSet {
    /// Instances.
    #[serde(rename = "Instance", default)]
    pub items: Vec<InstanceRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceHead {
    instance_id: String,
    #[serde(default)]
    instance_name: String,
    #[serde(default)]
    status: String,
}

/// One instance as `DescribeInstances` reports it.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(try_from = "Json")]
pub struct InstanceRecord {
    /// Instance id.
    pub instance_id: String,
    /// Instance name.
    pub instance_name: String,
    /// Lifecycle status, for example `Running`.
    pub status: String,
    /// Full response object.
    pub raw: Json,
}

impl TryFrom<Json> for InstanceRecord {
    type Error = serde_json::Error;

    fn try_from(raw: Json) -> Result<Self, Self::Error> {
        let head = InstanceHead::deserialize(&raw)?;
        Ok(Self {
            instance_id: head.instance_id,
            instance_name: head.instance_name,
            status: head.status,
            raw,
        })
    }
}

impl InstanceRecord {
    /// First address in a `{"IpAddress": [...]}` list at `pointer`.
    #[must_use]
    pub fn first_ip(&self, pointer: &str) -> Option<&str> {
        self.raw
            .pointer(pointer)
            .and_then(Json::as_array)
            .and_then(|addresses| addresses.first())
            .and_then(Json::as_str)
            .filter(|address| !address.is_empty())
    }

    /// Private address: the VPC address, or the classic inner address.
    #[must_use]
    pub fn private_ip(&self) -> Option<&str> {
        self.first_ip("/VpcAttributes/PrivateIpAddress/IpAddress")
            .or_else(|| self.first_ip("/InnerIpAddress/IpAddress"))
    }

    /// Public address: the allocated public IP, or a bound elastic IP.
    #[must_use]
    pub fn public_ip(&self) -> Option<&str> {
        self.first_ip("/PublicIpAddress/IpAddress").or_else(|| {
            self.raw
                .pointer("/EipAddress/IpAddress")
                .and_then(Json::as_str)
                .filter(|address| !address.is_empty())
        })
    }
}

impl Observed for InstanceRecord {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Listable for InstanceRecord {
    fn id(&self) -> &str {
        &self.instance_id
    }

    fn name(&self) -> Option<&str> {
        Some(&self.instance_name)
    }

    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }
}

/// `RunInstances` reply.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunInstancesResponse {
    /// Ids of the instances launched.
    pub instance_id_sets: InstanceIdSet,
}

/// `{"InstanceIdSet": [...]}` wrapper.
#[derive(Clone, Debug, Deserialize)]
pub struct InstanceIdSet {
    /// Instance ids.
    #[serde(rename = "InstanceIdSet", default)]
    pub ids: Vec<String>,
}

/// `DescribeDisks` for a set of disk ids.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DescribeDisks {
    /// Disk ids to look up.
    pub disk_ids: Vec<String>,
    /// Restricts the result to disks attached to this instance.
    pub instance_id: Option<String>,
    /// `system` or `data`.
    pub disk_type: Option<String>,
}

impl ApiRequest for DescribeDisks {
    fn action(&self) -> &'static str {
        "DescribeDisks"
    }

    fn params(&self) -> Params {
        Params::new()
            .set_json_list("DiskIds", self.disk_ids.as_slice())
            .set_opt("InstanceId", self.instance_id.as_deref())
            .set_opt("DiskType", self.disk_type.as_deref())
    }
}

/// `DescribeDisks` reply.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeDisksResponse {
    /// Disks found.
    #[serde(default)]
    pub disks: DiskSet,
}

/// `{"Disk": [...]}` wrapper.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DiskSet {
    /// Disks.
    #[serde(rename = "Disk", default)]
    pub items: Vec<DiskRecord>,
}

/// One disk.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DiskRecord {
    /// Disk id.
    pub disk_id: String,
    /// Instance the disk is attached to; empty when detached.
    #[serde(default)]
    pub instance_id: String,
    /// Disk status, for example `In_use` or `Available`.
    #[serde(default)]
    pub status: String,
    /// Device name on the instance, for example `/dev/xvdb`.
    #[serde(default)]
    pub device: String,
    /// Whether the disk is released with its instance.
    #[serde(default)]
    pub delete_with_instance: bool,
}

impl Observed for DiskRecord {
    fn status(&self) -> &str {
        &self.status
    }
}

/// `DescribeSecurityGroupAttribute`: the rules of one group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescribeSecurityGroupAttribute {
    /// Group id.
    pub security_group_id: String,
    /// `ingress`, `egress` or `all`.
    pub direction: &'static str,
    /// `internet` or `intranet`.
    pub nic_type: &'static str,
}

impl ApiRequest for DescribeSecurityGroupAttribute {
    fn action(&self) -> &'static str {
        "DescribeSecurityGroupAttribute"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("SecurityGroupId", self.security_group_id.as_str())
            .set("Direction", self.direction)
            .set("NicType", self.nic_type)
    }
}

/// `DescribeSecurityGroupAttribute` reply.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeSecurityGroupAttributeResponse {
    /// Group id.
    #[serde(default)]
    pub security_group_id: String,
    /// Rules.
    #[serde(default)]
    pub permissions: PermissionSet,
}

/// `{"Permission": [...]}` wrapper.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PermissionSet {
    /// Rules.
    #[serde(rename = "Permission", default)]
    pub items: Vec<PermissionRecord>,
}

/// One security group rule. Priorities arrive as numbers or strings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PermissionRecord {
    /// `ingress` or `egress`.
    pub direction: String,
    /// Protocol, upper-case (`TCP`).
    pub ip_protocol: String,
    /// `from/to` port range.
    pub port_range: String,
    /// `internet` or `intranet`.
    pub nic_type: String,
    /// `Accept` or `Drop`.
    pub policy: String,
    /// Priority, 1 to 100.
    #[serde(deserialize_with = "number_or_string")]
    pub priority: String,
    /// Ingress source CIDR.
    pub source_cidr_ip: String,
    /// Egress destination CIDR.
    pub dest_cidr_ip: String,
    /// Ingress source group.
    pub source_group_id: String,
    /// Egress destination group.
    pub dest_group_id: String,
    /// Owner account of the source group.
    pub source_group_owner_account: String,
    /// Owner account of the destination group.
    pub dest_group_owner_account: String,
    /// Free-form description.
    pub description: String,
}

impl Observed for PermissionRecord {
    fn status(&self) -> &str {
        "Available"
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Json::deserialize(deserializer)? {
        Json::Number(number) => Ok(number.to_string()),
        Json::String(text) => Ok(text),
        Json::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a number or string, found {other}"
        ))),
    }
}

/// Reply of actions that only acknowledge the request.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Acknowledged {
    /// Request id for support cases.
    #[serde(default)]
    pub request_id: String,
}

/// `RunInstances` for a single instance.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct RunInstances {
    /// Image id.
    pub image_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Security groups to join.
    pub security_group_ids: Vec<String>,
    /// Zone id.
    pub zone_id: Option<String>,
    /// `VSwitch` id; the instance is placed in its VPC.
    pub vswitch_id: Option<String>,
    /// Instance name.
    pub instance_name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Host name.
    pub host_name: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// `PayByTraffic` or `PayByBandwidth`.
    pub internet_charge_type: Option<String>,
    /// Public bandwidth cap in Mbit/s.
    pub internet_max_bandwidth_out: Option<i64>,
    /// System disk category.
    pub system_disk_category: Option<String>,
    /// System disk size in GiB.
    pub system_disk_size: Option<i64>,
    /// `PrePaid` or `PostPaid`.
    pub instance_charge_type: Option<String>,
    /// Subscription length for `PrePaid` instances.
    pub period: Option<i64>,
    /// `Week` or `Month`.
    pub period_unit: Option<String>,
    /// Fixed private address inside the `VSwitch`.
    pub private_ip_address: Option<String>,
    /// Refuse release through the API while set.
    pub deletion_protection: bool,
    /// Base64-encoded user data.
    pub user_data: Option<String>,
    /// Idempotency token shared by every retry of one launch.
    pub client_token: String,
}

impl fmt::Debug for RunInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunInstances")
            .field("image_id", &self.image_id)
            .field("instance_type", &self.instance_type)
            .field("zone_id", &self.zone_id)
            .field("vswitch_id", &self.vswitch_id)
            .field("instance_name", &self.instance_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_token", &self.client_token)
            .finish_non_exhaustive()
    }
}

impl ApiRequest for RunInstances {
    fn action(&self) -> &'static str {
        "RunInstances"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("ImageId", self.image_id.as_str())
            .set("InstanceType", self.instance_type.as_str())
            .set_indexed("SecurityGroupIds", self.security_group_ids.as_slice())
            .set_opt("ZoneId", self.zone_id.as_deref())
            .set_opt("VSwitchId", self.vswitch_id.as_deref())
            .set_opt("InstanceName", self.instance_name.as_deref())
            .set_opt("Description", self.description.as_deref())
            .set_opt("HostName", self.host_name.as_deref())
            .set_opt("Password", self.password.as_deref())
            .set_opt("InternetChargeType", self.internet_charge_type.as_deref())
            .set_opt(
                "InternetMaxBandwidthOut",
                self.internet_max_bandwidth_out.map(|value| value.to_string()),
            )
            .set_opt("SystemDisk.Category", self.system_disk_category.as_deref())
            .set_opt(
                "SystemDisk.Size",
                self.system_disk_size.map(|value| value.to_string()),
            )
            .set_opt("InstanceChargeType", self.instance_charge_type.as_deref())
            .set_opt("Period", self.period.map(|value| value.to_string()))
            .set_opt("PeriodUnit", self.period_unit.as_deref())
            .set_opt("PrivateIpAddress", self.private_ip_address.as_deref())
            .set_bool("DeletionProtection", self.deletion_protection)
            .set_opt("UserData", self.user_data.as_deref())
            .set("ClientToken", self.client_token.as_str())
            .set("Amount", "1")
    }
}

/// `DeleteInstance`, releasing a running instance without stopping it first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteInstance {
    /// Instance id.
    pub instance_id: String,
}

impl ApiRequest for DeleteInstance {
    fn action(&self) -> &'static str {
        "DeleteInstance"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set_bool("Force", true)
    }
}

/// `ModifyInstanceAttribute`; unset fields are left unchanged.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ModifyInstanceAttribute {
    /// Instance id.
    pub instance_id: String,
    /// New name.
    pub instance_name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New host name.
    pub host_name: Option<String>,
    /// New password.
    pub password: Option<String>,
    /// New base64-encoded user data; applied on the next boot.
    pub user_data: Option<String>,
    /// New release protection flag.
    pub deletion_protection: Option<bool>,
}

impl fmt::Debug for ModifyInstanceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifyInstanceAttribute")
            .field("instance_id", &self.instance_id)
            .field("instance_name", &self.instance_name)
            .field("description", &self.description)
            .field("host_name", &self.host_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("deletion_protection", &self.deletion_protection)
            .finish_non_exhaustive()
    }
}

impl ModifyInstanceAttribute {
    /// Whether any attribute would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instance_name.is_none()
            && self.description.is_none()
            && self.host_name.is_none()
            && self.password.is_none()
            && self.user_data.is_none()
            && self.deletion_protection.is_none()
    }

    /// Whether the change only takes effect after a restart.
    #[must_use]
    pub const fn needs_restart(&self) -> bool {
        self.host_name.is_some() || self.password.is_some() || self.user_data.is_some()
    }
}

impl ApiRequest for ModifyInstanceAttribute {
    fn action(&self) -> &'static str {
        "ModifyInstanceAttribute"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set_opt("InstanceName", self.instance_name.as_deref())
            .set_opt("Description", self.description.as_deref())
            .set_opt("HostName", self.host_name.as_deref())
            .set_opt("Password", self.password.as_deref())
            .set_opt("UserData", self.user_data.as_deref())
            .set_opt(
                "DeletionProtection",
                self.deletion_protection.map(|flag| flag.to_string()),
            )
    }
}

/// Starts or stops an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstancePower {
    /// `StartInstance`.
    Start {
        /// Instance id.
        instance_id: String,
    },
    /// `StopInstance`.
    Stop {
        /// Instance id.
        instance_id: String,
        /// Cut power instead of shutting the guest down.
        force: bool,
    },
}

impl ApiRequest for InstancePower {
    fn action(&self) -> &'static str {
        match self {
            Self::Start { .. } => "StartInstance",
            Self::Stop { .. } => "StopInstance",
        }
    }

    fn params(&self) -> Params {
        match self {
            Self::Start { instance_id } => Params::new().set("InstanceId", instance_id.as_str()),
            Self::Stop { instance_id, force } => Params::new()
                .set("InstanceId", instance_id.as_str())
                .set_bool("ForceStop", *force),
        }
    }
}

/// `ReplaceSystemDisk`: re-images a stopped instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplaceSystemDisk {
    /// Instance id.
    pub instance_id: String,
    /// New image.
    pub image_id: String,
    /// Size of the new system disk in GiB.
    pub system_disk_size: Option<i64>,
    /// Idempotency token.
    pub client_token: String,
}

impl ApiRequest for ReplaceSystemDisk {
    fn action(&self) -> &'static str {
        "ReplaceSystemDisk"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set("ImageId", self.image_id.as_str())
            .set_opt(
                "SystemDisk.Size",
                self.system_disk_size.map(|value| value.to_string()),
            )
            .set("ClientToken", self.client_token.as_str())
    }
}

/// `ModifyInstanceVpcAttribute`: moves a stopped instance to another
/// `VSwitch` or address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModifyInstanceVpcAttribute {
    /// Instance id.
    pub instance_id: String,
    /// Target `VSwitch`.
    pub vswitch_id: String,
    /// Target private address.
    pub private_ip_address: Option<String>,
}

impl ApiRequest for ModifyInstanceVpcAttribute {
    fn action(&self) -> &'static str {
        "ModifyInstanceVpcAttribute"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set("VSwitchId", self.vswitch_id.as_str())
            .set_opt("PrivateIpAddress", self.private_ip_address.as_deref())
    }
}

/// Changes the type of a stopped instance. Subscription instances go
/// through `ModifyPrepayInstanceSpec`, the rest through `ModifyInstanceSpec`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModifyInstanceSpec {
    /// Instance id.
    pub instance_id: String,
    /// New instance type.
    pub instance_type: String,
    /// Whether the instance is billed `PrePaid`.
    pub prepaid: bool,
    /// Idempotency token.
    pub client_token: String,
}

impl ApiRequest for ModifyInstanceSpec {
    fn action(&self) -> &'static str {
        if self.prepaid {
            "ModifyPrepayInstanceSpec"
        } else {
            "ModifyInstanceSpec"
        }
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set("InstanceType", self.instance_type.as_str())
            .set("ClientToken", self.client_token.as_str())
    }
}

/// `ModifyInstanceNetworkSpec`: public bandwidth and its billing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModifyInstanceNetworkSpec {
    /// Instance id.
    pub instance_id: String,
    /// `PayByTraffic` or `PayByBandwidth`.
    pub network_charge_type: Option<String>,
    /// Public bandwidth cap in Mbit/s.
    pub internet_max_bandwidth_out: Option<i64>,
    /// Idempotency token.
    pub client_token: String,
}

impl ApiRequest for ModifyInstanceNetworkSpec {
    fn action(&self) -> &'static str {
        "ModifyInstanceNetworkSpec"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("InstanceId", self.instance_id.as_str())
            .set_opt("NetworkChargeType", self.network_charge_type.as_deref())
            .set_opt(
                "InternetMaxBandwidthOut",
                self.internet_max_bandwidth_out.map(|value| value.to_string()),
            )
            .set("ClientToken", self.client_token.as_str())
    }
}

/// `ModifyInstanceChargeType` for one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModifyInstanceChargeType {
    /// Instance id.
    pub instance_id: String,
    /// `PrePaid` or `PostPaid`.
    pub instance_charge_type: String,
    /// Subscription length when switching to `PrePaid`.
    pub period: Option<i64>,
    /// `Week` or `Month`.
    pub period_unit: Option<String>,
    /// Idempotency token.
    pub client_token: String,
}

impl ApiRequest for ModifyInstanceChargeType {
    fn action(&self) -> &'static str {
        "ModifyInstanceChargeType"
    }

    fn params(&self) -> Params {
        Params::new()
            .set_json_list("InstanceIds", &[self.instance_id.as_str()])
            .set("InstanceChargeType", self.instance_charge_type.as_str())
            .set_bool("AutoPay", true)
            .set_opt("Period", self.period.map(|value| value.to_string()))
            .set_opt("PeriodUnit", self.period_unit.as_deref())
            .set("ClientToken", self.client_token.as_str())
    }
}

/// `ResizeDisk`: grows a disk in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResizeDisk {
    /// Disk id.
    pub disk_id: String,
    /// New size in GiB.
    pub new_size: i64,
    /// Resize while the instance runs; otherwise the resize applies offline.
    pub online: bool,
}

impl ApiRequest for ResizeDisk {
    fn action(&self) -> &'static str {
        "ResizeDisk"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("DiskId", self.disk_id.as_str())
            .set("NewSize", self.new_size.to_string())
            .set("Type", if self.online { "online" } else { "offline" })
    }
}

/// Moves an instance into or out of a security group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SecurityGroupMembership {
    /// `JoinSecurityGroup`.
    Join {
        /// Instance id.
        instance_id: String,
        /// Group id.
        security_group_id: String,
    },
    /// `LeaveSecurityGroup`.
    Leave {
        /// Instance id.
        instance_id: String,
        /// Group id.
        security_group_id: String,
    },
}

impl ApiRequest for SecurityGroupMembership {
    fn action(&self) -> &'static str {
        match self {
            Self::Join { .. } => "JoinSecurityGroup",
            Self::Leave { .. } => "LeaveSecurityGroup",
        }
    }

    fn params(&self) -> Params {
        let (Self::Join {
            instance_id,
            security_group_id,
        }
        | Self::Leave {
            instance_id,
            security_group_id,
        }) = self;
        Params::new()
            .set("InstanceId", instance_id.as_str())
            .set("SecurityGroupId", security_group_id.as_str())
    }
}

/// `TagResources` for one resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagResources {
    /// Resource type, for example `instance`.
    pub resource_type: &'static str,
    /// Resource id.
    pub resource_id: String,
    /// Tags to add or overwrite.
    pub tags: BTreeMap<String, String>,
}

impl ApiRequest for TagResources {
    fn action(&self) -> &'static str {
        "TagResources"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("ResourceType", self.resource_type)
            .set("ResourceId.1", self.resource_id.as_str())
            .set_tags(&self.tags)
    }
}

/// `UntagResources` for one resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UntagResources {
    /// Resource type, for example `instance`.
    pub resource_type: &'static str,
    /// Resource id.
    pub resource_id: String,
    /// Tag keys to remove.
    pub keys: Vec<String>,
}

impl ApiRequest for UntagResources {
    fn action(&self) -> &'static str {
        "UntagResources"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("ResourceType", self.resource_type)
            .set("ResourceId.1", self.resource_id.as_str())
            .set_indexed("TagKey", self.keys.as_slice())
    }
}

/// `AttachDisk`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttachDisk {
    /// Disk id.
    pub disk_id: String,
    /// Instance id.
    pub instance_id: String,
    /// Release the disk together with the instance.
    pub delete_with_instance: Option<bool>,
}

impl ApiRequest for AttachDisk {
    fn action(&self) -> &'static str {
        "AttachDisk"
    }

    fn params(&self) -> Params {
        let params = Params::new()
            .set("DiskId", self.disk_id.as_str())
            .set("InstanceId", self.instance_id.as_str());
        match self.delete_with_instance {
            Some(value) => params.set_bool("DeleteWithInstance", value),
            None => params,
        }
    }
}

/// `DetachDisk`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetachDisk {
    /// Disk id.
    pub disk_id: String,
    /// Instance id.
    pub instance_id: String,
}

impl ApiRequest for DetachDisk {
    fn action(&self) -> &'static str {
        "DetachDisk"
    }

    fn params(&self) -> Params {
        Params::new()
            .set("DiskId", self.disk_id.as_str())
            .set("InstanceId", self.instance_id.as_str())
    }
}
