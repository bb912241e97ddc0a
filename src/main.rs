//! Binary entry point for the converge CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use serde_json::{Value as Json, json};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use converge::{
    Attributes, CloudApi, ConfigError, DataSource, DiskAttachment, EcsInstance, EcsInstances,
    EcsService, LifecycleError, ProviderConfig, Resource, ResourceState, SecurityGroupRule,
    Timeouts, Value, apply,
};

use cli::{
    Cli, CreateCommand, DiskAttachCommand, DiskCommand, InstancesCommand, RuleCommand,
    RuleCreateCommand,
};


/// Attributes never echoed back to the terminal.
const SECRET_ATTRIBUTES: &[&str] = &["password"];

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to render output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("converge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ProviderConfig::load_without_cli_args()?;
    let service = EcsService::new(Arc::new(config.client()?), config.settings());
    let output = dispatch(cli, &service, &config).await?;
    write_output(io::stdout(), &output)
}

async fn dispatch<C: CloudApi + Clone>(
    cli: Cli,
    service: &EcsService<C>,
    config: &ProviderConfig,
) -> Result<Json, CliError> {
    let instance = || {
        EcsInstance::new(service.clone())
            .with_timeouts(config.timeouts(EcsInstance::<C>::DEFAULT_TIMEOUTS))
    };
    match cli {
        Cli::Instances(command) => {
            let state = EcsInstances::new(service.clone())
                .read(&instances_query(command))
                .await?;
            to_json(&state)
        }
        Cli::Show(arg) => {
            let state = instance().import(&arg.id).await?;
            Ok(redact(state.id, state.attributes))
        }
        Cli::Create(command) => {
            let state = apply(&instance(), None, &create_config(command)).await?;
            Ok(redact(state.id, state.attributes))
        }
        Cli::Destroy(command) => {
            let state = ResourceState::new(
                command.id.as_str(),
                Attributes::new().with("force_delete", command.force),
            );
            instance().delete(&state).await?;
            Ok(deleted(&command.id))
        }
        Cli::Rule(RuleCommand::Create(command)) => {
            let rule = SecurityGroupRule::new(service.clone())
                .with_timeouts(config.timeouts(Timeouts::default()));
            let state = apply(&rule, None, &rule_config(command)).await?;
            to_json(&state)
        }
        Cli::Rule(RuleCommand::Destroy(arg)) => {
            SecurityGroupRule::new(service.clone())
                .with_timeouts(config.timeouts(Timeouts::default()))
                .delete(&ResourceState::new(arg.id.as_str(), Attributes::new()))
                .await?;
            Ok(deleted(&arg.id))
        }
        Cli::Disk(DiskCommand::Attach(command)) => {
            let attachment = DiskAttachment::new(service.clone())
                .with_timeouts(config.timeouts(Timeouts::default()));
            let state = apply(&attachment, None, &attach_config(command)).await?;
            to_json(&state)
        }
        Cli::Disk(DiskCommand::Detach(arg)) => {
            DiskAttachment::new(service.clone())
                .with_timeouts(config.timeouts(Timeouts::default()))
                .delete(&ResourceState::new(arg.id.as_str(), Attributes::new()))
                .await?;
            Ok(deleted(&arg.id))
        }
    }
}

fn set_opt(attributes: &mut Attributes, name: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        attributes.insert(name, value);
    }
}

fn instances_query(command: InstancesCommand) -> Attributes {
    let mut query = Attributes::new();
    if !command.ids.is_empty() {
        query.insert("ids", Value::string_list(command.ids));
    }
    if !command.tags.is_empty() {
        query.insert("tags", Value::string_map(command.tags));
    }
    set_opt(&mut query, "name_regex", command.name_regex);
    set_opt(&mut query, "status", command.status);
    set_opt(&mut query, "vpc_id", command.vpc_id);
    set_opt(&mut query, "vswitch_id", command.vswitch_id);
    set_opt(&mut query, "availability_zone", command.availability_zone);
    set_opt(&mut query, "output_file", command.output_file);
    query
}

fn create_config(command: CreateCommand) -> Attributes {
    let mut config = Attributes::new()
        .with("image_id", command.image_id)
        .with("security_groups", Value::string_list(command.security_groups));
    let mut types = command.instance_types;
    if types.len() == 1 {
        set_opt(&mut config, "instance_type", types.pop());
    } else {
        config.insert("instance_types", Value::string_list(types));
    }
    if !command.tags.is_empty() {
        config.insert("tags", Value::string_map(command.tags));
    }
    set_opt(&mut config, "vswitch_id", command.vswitch_id);
    set_opt(&mut config, "availability_zone", command.availability_zone);
    set_opt(&mut config, "instance_name", command.name);
    set_opt(&mut config, "description", command.description);
    set_opt(&mut config, "host_name", command.host_name);
    set_opt(&mut config, "password", command.password);
    set_opt(
        &mut config,
        "internet_max_bandwidth_out",
        command.internet_max_bandwidth_out,
    );
    set_opt(&mut config, "system_disk_category", command.system_disk_category);
    set_opt(&mut config, "system_disk_size", command.system_disk_size);
    set_opt(&mut config, "user_data", command.user_data);
    if command.stopped {
        config.insert("status", "Stopped");
    }
    if command.deletion_protection {
        config.insert("deletion_protection", true);
    }
    config
}

fn rule_config(command: RuleCreateCommand) -> Attributes {
    let mut config = Attributes::new()
        .with("security_group_id", command.security_group_id)
        .with("type", command.direction)
        .with("ip_protocol", command.ip_protocol);
    set_opt(&mut config, "port_range", command.port_range);
    set_opt(&mut config, "cidr_ip", command.cidr_ip);
    set_opt(
        &mut config,
        "source_security_group_id",
        command.source_security_group_id,
    );
    set_opt(&mut config, "policy", command.policy);
    set_opt(&mut config, "priority", command.priority);
    set_opt(&mut config, "nic_type", command.nic_type);
    set_opt(&mut config, "description", command.description);
    config
}

fn attach_config(command: DiskAttachCommand) -> Attributes {
    Attributes::new()
        .with("disk_id", command.disk_id)
        .with("instance_id", command.instance_id)
        .with("delete_with_instance", command.delete_with_instance)
}

fn redact(id: String, mut attributes: Attributes) -> Json {
    for name in SECRET_ATTRIBUTES {
        attributes.remove(name);
    }
    json!({"id": id, "attributes": attributes})
}

fn deleted(id: &str) -> Json {
    json!({"id": id, "deleted": true})
}

fn to_json<T: Serialize>(value: &T) -> Result<Json, CliError> {
    serde_json::to_value(value).map_err(|err| CliError::Output(err.to_string()))
}

fn write_output(mut target: impl Write, output: &Json) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(output).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(target, "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
