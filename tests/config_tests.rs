//! Unit tests for provider configuration loading and validation.

use std::time::Duration;

use converge::test_support::EnvGuard;
use converge::{ConfigError, ProviderConfig, Timeouts};
use rstest::{fixture, rstest};

#[fixture]
fn valid_config() -> ProviderConfig {
    ProviderConfig {
        access_key: String::from("LTAI5tEXAMPLE"),
        secret_key: String::from("EXAMPLESECRET"),
        region: String::from("cn-hangzhou"),
        endpoint: None,
        page_size: 50,
        poll_interval_secs: 5,
        create_timeout_secs: None,
        update_timeout_secs: None,
        delete_timeout_secs: None,
        retry_max_secs: 600,
        http_timeout_secs: 30,
    }
}

#[rstest]
fn valid_configuration_passes(valid_config: ProviderConfig) {
    assert_eq!(valid_config.validate(), Ok(()));
}

/// Every required field produces an error naming its environment variable,
/// its TOML key and the configuration file.
#[rstest]
#[case::access_key(|cfg: &mut ProviderConfig| cfg.access_key.clear(), "ALICLOUD_ACCESS_KEY", "access_key")]
#[case::secret_key(|cfg: &mut ProviderConfig| cfg.secret_key = String::from("  "), "ALICLOUD_SECRET_KEY", "secret_key")]
#[case::region(|cfg: &mut ProviderConfig| cfg.region.clear(), "ALICLOUD_REGION", "region")]
fn missing_fields_produce_actionable_errors(
    mut valid_config: ProviderConfig,
    #[case] mutate: fn(&mut ProviderConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let error = valid_config.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
    assert!(
        message.contains("converge.toml"),
        "error should mention config file: {message}"
    );
}

#[rstest]
#[case::page_size(|cfg: &mut ProviderConfig| cfg.page_size = 0, "ALICLOUD_PAGE_SIZE")]
#[case::poll_interval(|cfg: &mut ProviderConfig| cfg.poll_interval_secs = 0, "ALICLOUD_POLL_INTERVAL_SECS")]
#[case::http_timeout(|cfg: &mut ProviderConfig| cfg.http_timeout_secs = 0, "ALICLOUD_HTTP_TIMEOUT_SECS")]
fn zero_pacing_values_are_rejected(
    mut valid_config: ProviderConfig,
    #[case] mutate: fn(&mut ProviderConfig),
    #[case] env_var: &str,
) {
    mutate(&mut valid_config);
    let error = valid_config.validate().expect_err("validation should fail");
    assert!(
        matches!(error, ConfigError::Invalid(ref message) if message.contains(env_var)),
        "unexpected error: {error}"
    );
}

#[rstest]
fn settings_follow_the_configuration(mut valid_config: ProviderConfig) {
    valid_config.page_size = 10;
    valid_config.poll_interval_secs = 2;
    let settings = valid_config.settings();
    assert_eq!(settings.page_size, 10);
    assert_eq!(settings.poll_interval, Duration::from_secs(2));
}

#[rstest]
fn timeout_overrides_replace_only_what_is_set(mut valid_config: ProviderConfig) {
    valid_config.delete_timeout_secs = Some(90);
    let defaults = Timeouts::new(
        Duration::from_secs(600),
        Duration::from_secs(600),
        Duration::from_secs(1200),
    );
    let timeouts = valid_config.timeouts(defaults);
    assert_eq!(timeouts.create, Duration::from_secs(600));
    assert_eq!(timeouts.delete, Duration::from_secs(90));
}

#[rstest]
fn client_construction_validates_first(mut valid_config: ProviderConfig) {
    valid_config.access_key.clear();
    let Err(error) = valid_config.client() else {
        panic!("client should not build without credentials");
    };
    assert!(matches!(error, ConfigError::MissingField(_)));
}

#[tokio::test]
async fn environment_values_override_defaults() {
    let _guard = EnvGuard::set_vars(&[
        ("ALICLOUD_ACCESS_KEY", "LTAI5tFROMENV"),
        ("ALICLOUD_SECRET_KEY", "secret-from-env"),
        ("ALICLOUD_REGION", "cn-shanghai"),
        ("ALICLOUD_PAGE_SIZE", "20"),
    ])
    .await;

    let config = ProviderConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load from the environment: {err}"));

    assert_eq!(config.access_key, "LTAI5tFROMENV");
    assert_eq!(config.region, "cn-shanghai");
    assert_eq!(config.page_size, 20);
    assert_eq!(config.poll_interval_secs, 5, "unset values keep their defaults");
    assert_eq!(config.validate(), Ok(()));
}
