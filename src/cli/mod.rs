//! Command-line interface definitions for the `converge` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `converge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "converge",
    about = "Drive Alibaba Cloud ECS objects to their configured state",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// List instances matching the given filters.
    #[command(name = "instances", about = "List instances matching the given filters")]
    Instances(InstancesCommand),
    /// Show the state of one instance.
    #[command(name = "show", about = "Show the state of one instance")]
    Show(IdArg),
    /// Create an instance and wait until it is running.
    #[command(name = "create", about = "Create an instance and wait until it is running")]
    Create(CreateCommand),
    /// Delete an instance and wait until it is gone.
    #[command(name = "destroy", about = "Delete an instance and wait until it is gone")]
    Destroy(DestroyCommand),
    /// Manage security group rules.
    #[command(subcommand, name = "rule", about = "Manage security group rules")]
    Rule(RuleCommand),
    /// Attach and detach data disks.
    #[command(subcommand, name = "disk", about = "Attach and detach data disks")]
    Disk(DiskCommand),
}

/// A single object identifier.
#[derive(Debug, Args)]
pub(crate) struct IdArg {
    /// Identifier of the object.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}

/// Arguments for `converge destroy`.
#[derive(Debug, Args)]
pub(crate) struct DestroyCommand {
    /// Identifier of the instance.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
    /// Release a subscription (`PrePaid`) instance by switching it to
    /// pay-as-you-go first.
    #[arg(long)]
    pub(crate) force: bool,
}

/// Arguments for `converge instances`.
#[derive(Debug, Args)]
pub(crate) struct InstancesCommand {
    /// Only instances with these ids (repeatable).
    #[arg(long = "id", value_name = "ID")]
    pub(crate) ids: Vec<String>,
    /// Only instances whose name matches this regular expression.
    #[arg(long, value_name = "REGEX")]
    pub(crate) name_regex: Option<String>,
    /// Only instances in this status, for example `Running`.
    #[arg(long, value_name = "STATUS")]
    pub(crate) status: Option<String>,
    /// Only instances in this VPC.
    #[arg(long, value_name = "VPC_ID")]
    pub(crate) vpc_id: Option<String>,
    /// Only instances in this `VSwitch`.
    #[arg(long, value_name = "VSWITCH_ID")]
    pub(crate) vswitch_id: Option<String>,
    /// Only instances in this zone.
    #[arg(long, value_name = "ZONE")]
    pub(crate) availability_zone: Option<String>,
    /// Only instances carrying this tag (`key=value`, repeatable).
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub(crate) tags: Vec<(String, String)>,
    /// Also write the result list as JSON to this file.
    #[arg(long, value_name = "PATH")]
    pub(crate) output_file: Option<String>,
}

/// Arguments for `converge create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Image to boot from.
    #[arg(long, value_name = "IMAGE_ID")]
    pub(crate) image_id: String,
    /// Instance type to launch. Repeat to give fallbacks tried in order when
    /// a type is out of stock.
    #[arg(long = "instance-type", value_name = "TYPE", required = true)]
    pub(crate) instance_types: Vec<String>,
    /// Security group to join (repeatable).
    #[arg(long = "security-group", value_name = "SG_ID", required = true)]
    pub(crate) security_groups: Vec<String>,
    /// `VSwitch` to place the instance in.
    #[arg(long, value_name = "VSWITCH_ID")]
    pub(crate) vswitch_id: Option<String>,
    /// Zone to place the instance in.
    #[arg(long, value_name = "ZONE")]
    pub(crate) availability_zone: Option<String>,
    /// Instance name.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Instance description.
    #[arg(long, value_name = "TEXT")]
    pub(crate) description: Option<String>,
    /// Host name inside the guest.
    #[arg(long, value_name = "HOST")]
    pub(crate) host_name: Option<String>,
    /// Root password, read from the environment so it stays out of shell
    /// history.
    #[arg(long, env = "CONVERGE_INSTANCE_PASSWORD", hide_env_values = true)]
    pub(crate) password: Option<String>,
    /// Outbound public bandwidth in Mbit/s; 0 allocates no public address.
    #[arg(long, value_name = "MBPS")]
    pub(crate) internet_max_bandwidth_out: Option<i64>,
    /// System disk category, for example `cloud_essd`.
    #[arg(long, value_name = "CATEGORY")]
    pub(crate) system_disk_category: Option<String>,
    /// System disk size in GiB.
    #[arg(long, value_name = "GIB")]
    pub(crate) system_disk_size: Option<i64>,
    /// User data passed to the guest on first boot.
    #[arg(long, value_name = "USER_DATA")]
    pub(crate) user_data: Option<String>,
    /// Leave the instance stopped once it has booted.
    #[arg(long)]
    pub(crate) stopped: bool,
    /// Refuse release through the API until the flag is cleared.
    #[arg(long)]
    pub(crate) deletion_protection: bool,
    /// Tag to apply (`key=value`, repeatable).
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub(crate) tags: Vec<(String, String)>,
}

/// `converge rule` subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum RuleCommand {
    /// Authorise a rule and wait until it is visible.
    #[command(name = "create")]
    Create(RuleCreateCommand),
    /// Revoke a rule by its composite id.
    #[command(name = "destroy")]
    Destroy(IdArg),
}

/// Arguments for `converge rule create`.
#[derive(Debug, Args)]
pub(crate) struct RuleCreateCommand {
    /// Security group the rule belongs to.
    #[arg(long, value_name = "SG_ID")]
    pub(crate) security_group_id: String,
    /// `ingress` or `egress`.
    #[arg(long = "type", value_name = "DIRECTION")]
    pub(crate) direction: String,
    /// `tcp`, `udp`, `icmp`, `gre` or `all`.
    #[arg(long, value_name = "PROTOCOL")]
    pub(crate) ip_protocol: String,
    /// Port range as `from/to`; `-1/-1` means every port.
    #[arg(long, value_name = "FROM/TO")]
    pub(crate) port_range: Option<String>,
    /// Peer CIDR block.
    #[arg(long, value_name = "CIDR", conflicts_with = "source_security_group_id")]
    pub(crate) cidr_ip: Option<String>,
    /// Peer security group.
    #[arg(long, value_name = "SG_ID")]
    pub(crate) source_security_group_id: Option<String>,
    /// `accept` or `drop`.
    #[arg(long, value_name = "POLICY")]
    pub(crate) policy: Option<String>,
    /// Priority from 1 (highest) to 100.
    #[arg(long, value_name = "PRIORITY")]
    pub(crate) priority: Option<i64>,
    /// `intranet` or `internet`.
    #[arg(long, value_name = "NIC_TYPE")]
    pub(crate) nic_type: Option<String>,
    /// Rule description.
    #[arg(long, value_name = "TEXT")]
    pub(crate) description: Option<String>,
}

/// `converge disk` subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum DiskCommand {
    /// Attach a disk and wait until it is in use.
    #[command(name = "attach")]
    Attach(DiskAttachCommand),
    /// Detach a disk by its `disk_id:instance_id` id.
    #[command(name = "detach")]
    Detach(IdArg),
}

/// Arguments for `converge disk attach`.
#[derive(Debug, Args)]
pub(crate) struct DiskAttachCommand {
    /// Disk to attach.
    #[arg(long, value_name = "DISK_ID")]
    pub(crate) disk_id: String,
    /// Instance to attach it to.
    #[arg(long, value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
    /// Release the disk together with the instance.
    #[arg(long)]
    pub(crate) delete_with_instance: bool,
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(String::from("tag key must not be empty"));
    }
    Ok((key.trim().to_owned(), value.to_owned()))
}
