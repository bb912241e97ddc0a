//! The `ecs_instances` data source.

use tracing::info;

use super::EcsService;
use super::api::{DescribeInstances, InstanceRecord};
use crate::client::{CloudApi, DecodeError};
use crate::error::LifecycleError;
use crate::export;
use crate::lifecycle::{DataSource, DataSourceState, LifecycleFuture, id_hash};
use crate::mapper::flatten;
use crate::paginate::ListFilter;
use crate::schema::{AttrType, Attribute, Attributes, Schema, Validator, Value};

/// Most ids `DescribeInstances` accepts in one call. Longer id lists are
/// applied client-side only.
const SERVER_SIDE_ID_LIMIT: usize = 100;

const STATUSES: &[&str] = &["Pending", "Starting", "Running", "Stopping", "Stopped"];

/// Lists instances matching server-side and client-side filters.
#[derive(Clone, Debug)]
pub struct EcsInstances<C> {
    service: EcsService<C>,
    schema: Schema,
    item_schema: Schema,
}

impl<C: CloudApi> EcsInstances<C> {
    /// Creates the data source.
    #[must_use]
    pub fn new(service: EcsService<C>) -> Self {
        let item_schema = item_schema();
        Self {
            service,
            schema: query_schema(item_schema.clone()),
            item_schema,
        }
    }

    fn query(config: &Attributes, ids: &[String]) -> DescribeInstances {
        let owned = |name: &str| config.get_str(name).map(str::to_owned);
        DescribeInstances {
            instance_ids: if ids.len() <= SERVER_SIDE_ID_LIMIT {
                ids.to_vec()
            } else {
                Vec::new()
            },
            status: owned("status"),
            vpc_id: owned("vpc_id"),
            vswitch_id: owned("vswitch_id"),
            zone_id: owned("availability_zone"),
            image_id: owned("image_id"),
            tags: config.get_string_map("tags"),
            ..DescribeInstances::default()
        }
    }

    fn filter(config: &Attributes, ids: &[String]) -> Result<ListFilter, LifecycleError> {
        let mut filter = ListFilter::new();
        if let Some(pattern) = config.get_str("name_regex") {
            filter = filter.name_regex(pattern)?;
        }
        if !ids.is_empty() {
            filter = filter.ids(ids.iter().cloned());
        }
        if let Some(status) = config.get_str("status") {
            filter = filter.status(status);
        }
        Ok(filter)
    }

    fn describe(&self, record: &InstanceRecord) -> Result<Value, LifecycleError> {
        let mut item = flatten(&self.item_schema, &record.raw).map_err(|err| DecodeError {
            action: "DescribeInstances".to_owned(),
            message: err.to_string(),
        })?;
        if let Some(ip) = record.private_ip() {
            item.insert("private_ip", ip);
        }
        if let Some(ip) = record.public_ip() {
            item.insert("public_ip", ip);
        }
        Ok(Value::Map(item.into_iter().collect()))
    }

    async fn read_instances(&self, config: &Attributes) -> Result<DataSourceState, LifecycleError> {
        self.schema.validate(config)?;
        let ids = config.get_string_list("ids");
        let filter = Self::filter(config, &ids)?;
        let records = self
            .service
            .list_instances(&Self::query(config, &ids), &filter)
            .await?;

        let found_ids: Vec<&str> = records.iter().map(|record| record.instance_id.as_str()).collect();
        let names: Vec<&str> = records
            .iter()
            .map(|record| record.instance_name.as_str())
            .collect();
        let instances = records
            .iter()
            .map(|record| self.describe(record))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = records.len(), "instances listed");

        if let Some(path) = config.get_str("output_file") {
            let written = export::write_json(path, &instances)?;
            info!(path = %written, "instances exported");
        }

        let mut attributes = config.clone();
        attributes.insert("ids", Value::string_list(found_ids.iter().copied()));
        attributes.insert("names", Value::string_list(names));
        attributes.insert("instances", Value::List(instances));
        Ok(DataSourceState {
            id: id_hash(found_ids.as_slice()),
            attributes,
        })
    }
}

impl<C: CloudApi> DataSource for EcsInstances<C> {
    fn type_name(&self) -> &'static str {
        "ecs_instances"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn read<'a>(&'a self, config: &'a Attributes) -> LifecycleFuture<'a, DataSourceState> {
        Box::pin(self.read_instances(config))
    }
}

fn item_schema() -> Schema {
    Schema::new(vec![
        Attribute::computed("id", AttrType::String).source("InstanceId"),
        Attribute::computed("name", AttrType::String).source("InstanceName"),
        Attribute::computed("status", AttrType::String),
        Attribute::computed("instance_type", AttrType::String),
        Attribute::computed("availability_zone", AttrType::String).source("ZoneId"),
        Attribute::computed("image_id", AttrType::String),
        Attribute::computed("description", AttrType::String),
        Attribute::computed("private_ip", AttrType::String),
        Attribute::computed("public_ip", AttrType::String),
        Attribute::computed("vpc_id", AttrType::String).source("VpcAttributes.VpcId"),
        Attribute::computed("vswitch_id", AttrType::String).source("VpcAttributes.VSwitchId"),
        Attribute::computed("security_groups", AttrType::List(Box::new(AttrType::String)))
            .source("SecurityGroupIds"),
        Attribute::computed("instance_charge_type", AttrType::String),
        Attribute::computed("cpu", AttrType::Int),
        Attribute::computed("memory", AttrType::Int),
        Attribute::computed("creation_time", AttrType::String),
        Attribute::computed("tags", AttrType::Tags),
    ])
}

// `ids` is both an input filter and, in the returned state, the list of ids
// found; the state is never validated against this schema.
fn query_schema(item_schema: Schema) -> Schema {
    Schema::new(vec![
        Attribute::optional("ids", AttrType::List(Box::new(AttrType::String))),
        Attribute::optional("name_regex", AttrType::String),
        Attribute::optional("status", AttrType::String).validator(Validator::OneOf(STATUSES)),
        Attribute::optional("vpc_id", AttrType::String),
        Attribute::optional("vswitch_id", AttrType::String),
        Attribute::optional("availability_zone", AttrType::String),
        Attribute::optional("image_id", AttrType::String),
        Attribute::optional("tags", AttrType::Tags),
        Attribute::optional("output_file", AttrType::String),
        Attribute::computed("names", AttrType::List(Box::new(AttrType::String))),
        Attribute::computed("instances", AttrType::ObjectList(item_schema)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::schema::ValidationError;
    use crate::test_support::{ScriptedApi, instance_json, instances_page};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn api() -> ScriptedApi {
        ScriptedApi::new()
    }

    fn source(api: &ScriptedApi) -> EcsInstances<ScriptedApi> {
        EcsInstances::new(EcsService::new(
            api.clone(),
            ServiceSettings {
                page_size: 2,
                ..ServiceSettings::default()
            },
        ))
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn filters_by_name_and_hashes_the_ids(api: ScriptedApi) {
        api.push_ok(instances_page(&[
            instance_json("i-1", "web-1", "Running"),
            instance_json("i-2", "db-1", "Running"),
        ]));
        api.push_ok(instances_page(&[]));
        let config = Attributes::new().with("name_regex", "^web-");
        let state = source(&api)
            .read(&config)
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.id, id_hash(&["i-1"]));
        assert_eq!(state.attributes.get_string_list("ids"), ["i-1"]);
        assert_eq!(state.attributes.get_string_list("names"), ["web-1"]);
        let Some(Value::List(instances)) = state.attributes.get("instances") else {
            panic!("instances should be a list");
        };
        let Some(Value::Map(first)) = instances.first() else {
            panic!("one instance expected");
        };
        assert_eq!(first.get("private_ip"), Some(&Value::from("172.16.0.10")));
        assert_eq!(first.get("availability_zone"), Some(&Value::from("cn-hangzhou-i")));
        assert_eq!(api.invocations().len(), 2);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn server_side_filters_are_sent(api: ScriptedApi) {
        api.push_ok(instances_page(&[]));
        let config = Attributes::new()
            .with("ids", Value::string_list(["i-1", "i-2"]))
            .with("vpc_id", "vpc-1")
            .with("status", "Running")
            .with("tags", Value::string_map([("env", "ci")]));
        let state = source(&api)
            .read(&config)
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(state.id, "0");
        let calls = api.invocations();
        let call = calls.first().unwrap_or_else(|| panic!("one call"));
        assert_eq!(call.params.get("InstanceIds"), Some("[\"i-1\",\"i-2\"]"));
        assert_eq!(call.params.get("VpcId"), Some("vpc-1"));
        assert_eq!(call.params.get("Status"), Some("Running"));
        assert_eq!(call.params.get("Tag.1.Key"), Some("env"));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn invalid_status_is_rejected_before_listing(api: ScriptedApi) {
        let config = Attributes::new().with("status", "Exploded");
        let err = source(&api).read(&config).await.expect_err("bad status");
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::Invalid { .. })
        ));
        assert!(api.invocations().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn results_are_exported_when_asked(api: ScriptedApi) {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = tmp.path().join("instances.json");
        let path_text = path.to_string_lossy().into_owned();
        api.push_ok(instances_page(&[instance_json("i-9", "web", "Stopped")]));
        source(&api)
            .read(&Attributes::new().with("output_file", path_text.as_str()))
            .await
            .unwrap_or_else(|err| panic!("{err}"));
        let written = std::fs::read_to_string(&path).unwrap_or_else(|err| panic!("read: {err}"));
        assert!(written.contains("\"id\": \"i-9\""));
        assert!(written.contains("\"status\": \"Stopped\""));
    }
}
