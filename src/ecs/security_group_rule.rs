//! The `ecs_security_group_rule` resource.
//!
//! A rule has no id of its own. It is addressed by the eight values that
//! define it, joined into one [`CompositeId`]:
//! `group:direction:protocol:ports:nic_type:peer:policy:priority`, where
//! `peer` is the CIDR block or the peer security group.

use std::time::Duration;

use tracing::info;

use super::EcsService;
use super::api::{
    Acknowledged, DescribeSecurityGroupAttribute, DescribeSecurityGroupAttributeResponse,
    PermissionRecord,
};
use crate::builder::{ApiRequest, ExclusiveGroup, Params};
use crate::client::{CloudApi, classify_with};
use crate::error::LifecycleError;
use crate::identity::CompositeId;
use crate::lifecycle::{LifecycleFuture, Resource, ResourceState, Timeouts};
use crate::reconcile::WaitTarget;
use crate::schema::{AttrType, Attribute, Attributes, Schema, ValidationError, Validator, Value};

const RULE_RETRY_CODES: [&str; 2] = ["OperationConflict", "InvalidSecurityGroup.Busy"];
const PRESENT: &[&str] = &["Available"];
const ID_PARTS: usize = 8;
const ANY_PORT: &str = "-1/-1";

const PEER_GROUP: ExclusiveGroup =
    ExclusiveGroup::new(&["cidr_ip", "source_security_group_id"]).required();

fn parse_variant<T: Copy>(
    attribute: &str,
    raw: &str,
    variants: &[(&'static str, T)],
) -> Result<T, ValidationError> {
    variants
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, variant)| *variant)
        .ok_or_else(|| ValidationError::Invalid {
            attribute: attribute.to_owned(),
            reason: format!(
                "{raw:?} is not one of {}",
                variants
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
}

/// Traffic direction of a rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Inbound traffic.
    Ingress,
    /// Outbound traffic.
    Egress,
}

impl Direction {
    const VARIANTS: [(&'static str, Self); 2] = [("ingress", Self::Ingress), ("egress", Self::Egress)];

    /// Configuration and API spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        }
    }

    /// Parses the `type` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] for anything but `ingress` or
    /// `egress`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_variant("type", raw, &Self::VARIANTS)
    }
}

/// What happens to matching traffic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Policy {
    /// Let it through.
    Accept,
    /// Drop it.
    Drop,
}

impl Policy {
    const VARIANTS: [(&'static str, Self); 2] = [("accept", Self::Accept), ("drop", Self::Drop)];

    /// Configuration spelling; the API answers `Accept` / `Drop`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Drop => "drop",
        }
    }

    /// Parses either spelling.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] for an unknown policy.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_variant("policy", raw, &Self::VARIANTS)
    }
}

/// Network interface class a rule applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NicType {
    /// Public network interface (classic network only).
    Internet,
    /// Private network interface.
    Intranet,
}

impl NicType {
    const VARIANTS: [(&'static str, Self); 2] =
        [("internet", Self::Internet), ("intranet", Self::Intranet)];

    /// Configuration and API spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internet => "internet",
            Self::Intranet => "intranet",
        }
    }

    /// Parses the `nic_type` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] for an unknown NIC type.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_variant("nic_type", raw, &Self::VARIANTS)
    }
}

/// Transport protocol of a rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpProtocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP.
    Icmp,
    /// GRE.
    Gre,
    /// Every protocol.
    All,
}

impl IpProtocol {
    const VARIANTS: [(&'static str, Self); 5] = [
        ("tcp", Self::Tcp),
        ("udp", Self::Udp),
        ("icmp", Self::Icmp),
        ("gre", Self::Gre),
        ("all", Self::All),
    ];

    /// Configuration spelling; the API answers in upper case.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Gre => "gre",
            Self::All => "all",
        }
    }

    /// Whether the protocol carries ports, so `-1/-1` is not a valid range.
    #[must_use]
    pub const fn has_ports(self) -> bool {
        match self {
            Self::Tcp | Self::Udp => true,
            Self::Icmp | Self::Gre | Self::All => false,
        }
    }

    /// Parses either spelling.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] for an unknown protocol.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_variant("ip_protocol", raw, &Self::VARIANTS)
    }
}

/// The other end of a rule.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Peer {
    Cidr(String),
    Group { id: String, owner: Option<String> },
}

impl Peer {
    fn from_id_part(part: &str) -> Self {
        if part.starts_with("sg-") {
            Self::Group {
                id: part.to_owned(),
                owner: None,
            }
        } else {
            Self::Cidr(part.to_owned())
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Cidr(cidr) => cidr,
            Self::Group { id, .. } => id,
        }
    }
}

/// Everything that identifies one rule.
#[derive(Clone, Debug, Eq, PartialEq)]
struct RuleSpec {
    security_group_id: String,
    direction: Direction,
    ip_protocol: IpProtocol,
    port_range: String,
    nic_type: NicType,
    peer: Peer,
    policy: Policy,
    priority: i64,
}

impl RuleSpec {
    fn from_config(config: &Attributes) -> Result<Self, LifecycleError> {
        let text = |name: &str| config.get_str(name).unwrap_or_default();
        let ip_protocol = IpProtocol::parse(text("ip_protocol"))?;
        let port_range = config.get_str("port_range").unwrap_or(ANY_PORT).to_owned();
        if ip_protocol.has_ports() && port_range == ANY_PORT {
            return Err(ValidationError::Invalid {
                attribute: "port_range".to_owned(),
                reason: format!(
                    "{} rules need a port range within 1/65535",
                    ip_protocol.as_str()
                ),
            }
            .into());
        }
        let nic_type = NicType::parse(config.get_str("nic_type").unwrap_or("intranet"))?;
        let peer = match PEER_GROUP.resolve(config)? {
            Some("cidr_ip") => Peer::Cidr(text("cidr_ip").to_owned()),
            _ => Peer::Group {
                id: text("source_security_group_id").to_owned(),
                owner: config
                    .get_str("source_group_owner_account")
                    .map(str::to_owned),
            },
        };
        if matches!(peer, Peer::Group { .. }) && nic_type == NicType::Internet {
            return Err(ValidationError::Invalid {
                attribute: "nic_type".to_owned(),
                reason: "rules naming a peer security group must use intranet".to_owned(),
            }
            .into());
        }
        Ok(Self {
            security_group_id: text("security_group_id").to_owned(),
            direction: Direction::parse(text("type"))?,
            ip_protocol,
            port_range,
            nic_type,
            peer,
            policy: Policy::parse(config.get_str("policy").unwrap_or("accept"))?,
            priority: config.get_int("priority").unwrap_or(1),
        })
    }

    fn parse_id(raw: &str) -> Result<Self, LifecycleError> {
        let id = CompositeId::parse(raw, ID_PARTS)?;
        let priority = id.part(7)?;
        Ok(Self {
            security_group_id: id.part(0)?.to_owned(),
            direction: Direction::parse(id.part(1)?)?,
            ip_protocol: IpProtocol::parse(id.part(2)?)?,
            port_range: id.part(3)?.to_owned(),
            nic_type: NicType::parse(id.part(4)?)?,
            peer: Peer::from_id_part(id.part(5)?),
            policy: Policy::parse(id.part(6)?)?,
            priority: priority.parse().map_err(|_| ValidationError::Invalid {
                attribute: "priority".to_owned(),
                reason: format!("{priority:?} in id {raw:?} is not a number"),
            })?,
        })
    }

    fn id(&self) -> Result<CompositeId, LifecycleError> {
        Ok(CompositeId::new([
            self.security_group_id.clone(),
            self.direction.as_str().to_owned(),
            self.ip_protocol.as_str().to_owned(),
            self.port_range.clone(),
            self.nic_type.as_str().to_owned(),
            self.peer.as_str().to_owned(),
            self.policy.as_str().to_owned(),
            self.priority.to_string(),
        ])?)
    }

    fn matches(&self, record: &PermissionRecord) -> bool {
        let peer_matches = match (&self.peer, self.direction) {
            (Peer::Cidr(cidr), Direction::Ingress) => record.source_cidr_ip == *cidr,
            (Peer::Cidr(cidr), Direction::Egress) => record.dest_cidr_ip == *cidr,
            (Peer::Group { id, .. }, Direction::Ingress) => record.source_group_id == *id,
            (Peer::Group { id, .. }, Direction::Egress) => record.dest_group_id == *id,
        };
        peer_matches
            && record.ip_protocol.eq_ignore_ascii_case(self.ip_protocol.as_str())
            && record.port_range == self.port_range
            && record.policy.eq_ignore_ascii_case(self.policy.as_str())
            && record.priority == self.priority.to_string()
            && (record.nic_type.is_empty()
                || record.nic_type.eq_ignore_ascii_case(self.nic_type.as_str()))
    }

    fn attributes(&self, record: &PermissionRecord) -> Attributes {
        let mut attributes = Attributes::new()
            .with("security_group_id", self.security_group_id.as_str())
            .with("type", self.direction.as_str())
            .with("ip_protocol", self.ip_protocol.as_str())
            .with("port_range", self.port_range.as_str())
            .with("nic_type", self.nic_type.as_str())
            .with("policy", self.policy.as_str())
            .with("priority", Value::Int(self.priority));
        match &self.peer {
            Peer::Cidr(cidr) => attributes.insert("cidr_ip", cidr.as_str()),
            Peer::Group { id, .. } => attributes.insert("source_security_group_id", id.as_str()),
        }
        let owner = match self.direction {
            Direction::Ingress => &record.source_group_owner_account,
            Direction::Egress => &record.dest_group_owner_account,
        };
        if !owner.is_empty() {
            attributes.insert("source_group_owner_account", owner.as_str());
        }
        if !record.description.is_empty() {
            attributes.insert("description", record.description.as_str());
        }
        attributes
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RuleVerb {
    Authorize,
    Revoke,
    ModifyDescription,
}

/// Authorize, revoke or re-describe one rule.
#[derive(Clone, Debug)]
struct RuleRequest<'a> {
    verb: RuleVerb,
    spec: &'a RuleSpec,
    description: Option<&'a str>,
}

impl ApiRequest for RuleRequest<'_> {
    fn action(&self) -> &'static str {
        match (self.verb, self.spec.direction) {
            (RuleVerb::Authorize, Direction::Ingress) => "AuthorizeSecurityGroup",
            (RuleVerb::Authorize, Direction::Egress) => "AuthorizeSecurityGroupEgress",
            (RuleVerb::Revoke, Direction::Ingress) => "RevokeSecurityGroup",
            (RuleVerb::Revoke, Direction::Egress) => "RevokeSecurityGroupEgress",
            (RuleVerb::ModifyDescription, Direction::Ingress) => "ModifySecurityGroupRule",
            (RuleVerb::ModifyDescription, Direction::Egress) => "ModifySecurityGroupEgressRule",
        }
    }

    fn params(&self) -> Params {
        let spec = self.spec;
        let params = Params::new()
            .set("SecurityGroupId", spec.security_group_id.as_str())
            .set("IpProtocol", spec.ip_protocol.as_str())
            .set("PortRange", spec.port_range.as_str())
            .set("NicType", spec.nic_type.as_str())
            .set("Policy", spec.policy.as_str())
            .set("Priority", spec.priority.to_string());
        let params = if self.verb == RuleVerb::ModifyDescription {
            // An empty description clears the one on record.
            params.set("Description", self.description.unwrap_or_default())
        } else {
            params.set_opt("Description", self.description)
        };
        match (&spec.peer, spec.direction) {
            (Peer::Cidr(cidr), Direction::Ingress) => params.set("SourceCidrIp", cidr.as_str()),
            (Peer::Cidr(cidr), Direction::Egress) => params.set("DestCidrIp", cidr.as_str()),
            (Peer::Group { id, owner }, Direction::Ingress) => params
                .set("SourceGroupId", id.as_str())
                .set_opt("SourceGroupOwnerAccount", owner.as_deref()),
            (Peer::Group { id, owner }, Direction::Egress) => params
                .set("DestGroupId", id.as_str())
                .set_opt("DestGroupOwnerAccount", owner.as_deref()),
        }
    }
}

/// Manages one ingress or egress rule of a security group.
#[derive(Clone, Debug)]
pub struct SecurityGroupRule<C> {
    service: EcsService<C>,
    schema: Schema,
    timeouts: Timeouts,
}

impl<C: CloudApi> SecurityGroupRule<C> {
    /// Creates the resource with five-minute timeouts.
    #[must_use]
    pub fn new(service: EcsService<C>) -> Self {
        Self {
            service,
            schema: rule_schema(),
            timeouts: Timeouts::default(),
        }
    }

    /// Replaces the wait budgets.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    async fn find_rule(&self, spec: &RuleSpec) -> Result<Option<PermissionRecord>, LifecycleError> {
        let request = DescribeSecurityGroupAttribute {
            security_group_id: spec.security_group_id.clone(),
            direction: spec.direction.as_str(),
            nic_type: spec.nic_type.as_str(),
        };
        let reply: Result<DescribeSecurityGroupAttributeResponse, _> = self
            .service
            .send(&request, &spec.security_group_id, classify_with(&RULE_RETRY_CODES))
            .await;
        match reply {
            Ok(reply) => Ok(reply
                .permissions
                .items
                .into_iter()
                .find(|record| spec.matches(record))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn wait_for_rule(
        &self,
        id: &str,
        spec: &RuleSpec,
        target: WaitTarget,
        timeout: Duration,
    ) -> Result<Option<PermissionRecord>, LifecycleError> {
        let converged = self
            .service
            .reconciler(timeout)
            .wait_for(id, target, &[], || self.find_rule(spec))
            .await
            .map_err(|err| LifecycleError::wait(id, err))?;
        Ok(converged.into_present())
    }

    async fn create_rule(&self, config: &Attributes) -> Result<ResourceState, LifecycleError> {
        self.schema.validate(config)?;
        let config = self.schema.with_defaults(config);
        let spec = RuleSpec::from_config(&config)?;
        let id = spec.id()?.to_string();
        let request = RuleRequest {
            verb: RuleVerb::Authorize,
            spec: &spec,
            description: config.get_str("description"),
        };
        let _: Acknowledged = self
            .service
            .send(&request, &id, classify_with(&RULE_RETRY_CODES))
            .await?;
        info!(id = %id, "security group rule authorised");

        let record = self
            .wait_for_rule(&id, &spec, WaitTarget::States(PRESENT), self.timeouts.create)
            .await
            .and_then(|found| found.ok_or_else(|| LifecycleError::Vanished { id: id.clone() }))
            .map_err(|err| LifecycleError::partial_create(id.as_str(), err))?;
        Ok(ResourceState::new(id, spec.attributes(&record)))
    }

    async fn read_rule(&self, id: &str) -> Result<Option<ResourceState>, LifecycleError> {
        let spec = RuleSpec::parse_id(id)?;
        Ok(self
            .find_rule(&spec)
            .await?
            .map(|record| ResourceState::new(id, spec.attributes(&record))))
    }

    async fn update_rule(
        &self,
        prior: &ResourceState,
        config: &Attributes,
    ) -> Result<ResourceState, LifecycleError> {
        self.schema.validate(config)?;
        let spec = RuleSpec::parse_id(&prior.id)?;
        let description = config.get_str("description").unwrap_or_default();
        if prior.attributes.get_str("description").unwrap_or_default() != description {
            let request = RuleRequest {
                verb: RuleVerb::ModifyDescription,
                spec: &spec,
                description: Some(description),
            };
            let _: Acknowledged = self
                .service
                .send(&request, &prior.id, classify_with(&RULE_RETRY_CODES))
                .await?;
        }
        self.read_rule(&prior.id)
            .await?
            .ok_or_else(|| LifecycleError::Vanished {
                id: prior.id.clone(),
            })
    }

    async fn delete_rule(&self, id: &str) -> Result<(), LifecycleError> {
        let spec = RuleSpec::parse_id(id)?;
        if self.find_rule(&spec).await?.is_none() {
            info!(id, "security group rule already gone");
            return Ok(());
        }
        let request = RuleRequest {
            verb: RuleVerb::Revoke,
            spec: &spec,
            description: None,
        };
        let reply: Result<Acknowledged, _> = self
            .service
            .send(&request, id, classify_with(&RULE_RETRY_CODES))
            .await;
        match reply {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        self.wait_for_rule(id, &spec, WaitTarget::Gone, self.timeouts.delete)
            .await?;
        Ok(())
    }
}

impl<C: CloudApi> Resource for SecurityGroupRule<C> {
    fn type_name(&self) -> &'static str {
        "ecs_security_group_rule"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn create<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(self.create_rule(config))
    }

    fn read<'a>(&'a self, id: &'a str) -> LifecycleFuture<'a, Option<ResourceState>> {
        Box::pin(self.read_rule(id))
    }

    fn update<'a>(
        &'a self,
        prior: &'a ResourceState,
        config: &'a Attributes,
    ) -> LifecycleFuture<'a, ResourceState> {
        Box::pin(self.update_rule(prior, config))
    }

    fn delete<'a>(&'a self, state: &'a ResourceState) -> LifecycleFuture<'a, ()> {
        Box::pin(self.delete_rule(&state.id))
    }
}

fn rule_schema() -> Schema {
    Schema::new(vec![
        Attribute::required("type", AttrType::String)
            .validator(Validator::OneOf(&["ingress", "egress"]))
            .force_new(),
        Attribute::required("ip_protocol", AttrType::String)
            .validator(Validator::OneOf(&["tcp", "udp", "icmp", "gre", "all"]))
            .force_new(),
        Attribute::optional("nic_type", AttrType::String)
            .validator(Validator::OneOf(&["internet", "intranet"]))
            .default_value("intranet")
            .force_new(),
        Attribute::optional("policy", AttrType::String)
            .validator(Validator::OneOf(&["accept", "drop"]))
            .default_value("accept")
            .force_new(),
        Attribute::optional("port_range", AttrType::String)
            .validator(Validator::Pattern(r"^-?\d+/-?\d+$"))
            .default_value(ANY_PORT)
            .force_new(),
        Attribute::optional("priority", AttrType::Int)
            .validator(Validator::IntRange { min: 1, max: 100 })
            .default_value(Value::Int(1))
            .force_new(),
        Attribute::required("security_group_id", AttrType::String).force_new(),
        Attribute::optional("cidr_ip", AttrType::String)
            .conflicts_with(&["source_security_group_id"])
            .force_new(),
        Attribute::optional("source_security_group_id", AttrType::String)
            .conflicts_with(&["cidr_ip"])
            .force_new(),
        Attribute::optional("source_group_owner_account", AttrType::String).force_new(),
        Attribute::optional("description", AttrType::String)
            .validator(Validator::Length { min: 1, max: 512 }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::test_support::ScriptedApi;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn api() -> ScriptedApi {
        ScriptedApi::new()
    }

    fn resource(api: &ScriptedApi) -> SecurityGroupRule<ScriptedApi> {
        SecurityGroupRule::new(EcsService::new(api.clone(), ServiceSettings::default()))
    }

    fn ssh_rule() -> Attributes {
        Attributes::new()
            .with("type", "ingress")
            .with("ip_protocol", "tcp")
            .with("port_range", "22/22")
            .with("security_group_id", "sg-1")
            .with("cidr_ip", "10.0.0.0/8")
    }

    fn permissions(rules: &[serde_json::Value]) -> serde_json::Value {
        json!({"SecurityGroupId": "sg-1", "Permissions": {"Permission": rules}})
    }

    fn ssh_permission() -> serde_json::Value {
        json!({
            "Direction": "ingress",
            "IpProtocol": "TCP",
            "PortRange": "22/22",
            "NicType": "intranet",
            "Policy": "Accept",
            "Priority": 1,
            "SourceCidrIp": "10.0.0.0/8",
            "Description": ""
        })
    }

    #[rstest]
    #[case("tcp", IpProtocol::Tcp)]
    #[case("TCP", IpProtocol::Tcp)]
    #[case("All", IpProtocol::All)]
    fn protocols_parse_in_either_case(#[case] raw: &str, #[case] expected: IpProtocol) {
        assert_eq!(IpProtocol::parse(raw), Ok(expected));
    }

    #[rstest]
    fn unknown_policy_is_rejected() {
        let err = Policy::parse("reject").expect_err("not a policy");
        assert!(err.to_string().contains("accept, drop"));
    }

    #[rstest]
    fn rule_ids_round_trip() {
        let spec = RuleSpec::from_config(&rule_schema().with_defaults(&ssh_rule()))
            .unwrap_or_else(|err| panic!("{err}"));
        let id = spec.id().unwrap_or_else(|err| panic!("{err}")).to_string();
        assert_eq!(id, "sg-1:ingress:tcp:22/22:intranet:10.0.0.0/8:accept:1");
        let parsed = RuleSpec::parse_id(&id).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(parsed, spec);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn tcp_without_ports_fails_before_any_call(api: ScriptedApi) {
        let mut config = ssh_rule();
        config.remove("port_range");
        let err = resource(&api)
            .create(&config)
            .await
            .expect_err("tcp needs ports");
        assert!(err.is_configuration());
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn both_peers_conflict(api: ScriptedApi) {
        let config = ssh_rule().with("source_security_group_id", "sg-2");
        let err = resource(&api)
            .create(&config)
            .await
            .expect_err("peers conflict");
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::Conflict { .. })
        ));
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn create_authorises_and_waits_until_visible(api: ScriptedApi) {
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(permissions(&[]));
        api.push_ok(permissions(&[ssh_permission()]));
        let state = resource(&api)
            .create(&ssh_rule())
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.id, "sg-1:ingress:tcp:22/22:intranet:10.0.0.0/8:accept:1");
        assert_eq!(state.attributes.get_str("cidr_ip"), Some("10.0.0.0/8"));
        assert_eq!(state.attributes.get_int("priority"), Some(1));
        let calls = api.invocations();
        let authorize = calls.first().unwrap_or_else(|| panic!("authorize sent"));
        assert_eq!(authorize.action, "AuthorizeSecurityGroup");
        assert_eq!(authorize.params.get("SourceCidrIp"), Some("10.0.0.0/8"));
        assert_eq!(calls.len(), 3);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn egress_rules_use_egress_actions(api: ScriptedApi) {
        let id = "sg-1:egress:all:-1/-1:intranet:sg-9:drop:5";
        api.push_ok(permissions(&[json!({
            "Direction": "egress",
            "IpProtocol": "ALL",
            "PortRange": "-1/-1",
            "Policy": "Drop",
            "Priority": "5",
            "DestGroupId": "sg-9"
        })]));
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(permissions(&[]));
        resource(&api)
            .delete(&ResourceState::new(id, Attributes::new()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        let calls = api.invocations();
        let revoke = calls.get(1).unwrap_or_else(|| panic!("revoke sent"));
        assert_eq!(revoke.action, "RevokeSecurityGroupEgress");
        assert_eq!(revoke.params.get("DestGroupId"), Some("sg-9"));
        assert_eq!(revoke.params.get("Policy"), Some("drop"));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn only_the_description_is_updated_in_place(api: ScriptedApi) {
        let prior = ResourceState::new(
            "sg-1:ingress:tcp:22/22:intranet:10.0.0.0/8:accept:1",
            ssh_rule(),
        );
        api.push_ok(json!({"RequestId": "r-1"}));
        let mut described = ssh_permission();
        described["Description"] = json!("ssh from office");
        api.push_ok(permissions(&[described]));
        let state = resource(&api)
            .update(&prior, &ssh_rule().with("description", "ssh from office"))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.attributes.get_str("description"), Some("ssh from office"));
        let calls = api.invocations();
        assert_eq!(
            calls.first().map(|call| call.action.as_str()),
            Some("ModifySecurityGroupRule")
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn an_empty_description_clears_the_recorded_one(api: ScriptedApi) {
        let prior = ResourceState::new(
            "sg-1:ingress:tcp:22/22:intranet:10.0.0.0/8:accept:1",
            ssh_rule().with("description", "ssh from office"),
        );
        api.push_ok(json!({"RequestId": "r-1"}));
        api.push_ok(permissions(&[ssh_permission()]));
        let state = resource(&api)
            .update(&prior, &ssh_rule().with("description", ""))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert!(state.attributes.get("description").is_none());
        let calls = api.invocations();
        let modify = calls
            .first()
            .unwrap_or_else(|| panic!("ModifySecurityGroupRule sent"));
        assert_eq!(modify.action, "ModifySecurityGroupRule");
        assert_eq!(modify.params.get("Description"), Some(""));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn malformed_ids_are_rejected_without_calls(api: ScriptedApi) {
        let err = resource(&api)
            .read("sg-1:ingress:tcp")
            .await
            .expect_err("too few parts");
        assert!(matches!(err, LifecycleError::Identity(_)));
        assert!(api.invocations().is_empty());
    }
}
