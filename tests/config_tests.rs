//! Configuration loading tests
//!
//! TOML files written to temp directories, environment supplied through
//! `apply_env_from` so tests never touch the process environment.

use motor_sentinel::config::{defaults, AppConfig, ConfigError};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let file = write_config(
        r#"
[broker]
host = "broker.plant.local"

[smoothing]
window_size = 10
"#,
    );

    let config = AppConfig::load(Some(file.path())).unwrap();
    config.validate().unwrap();

    assert_eq!(config.broker.host, "broker.plant.local");
    assert_eq!(config.broker.port, defaults::BROKER_PORT);
    assert_eq!(config.broker.topic, defaults::FEED_TOPIC);
    assert_eq!(config.smoothing.window_size, 10);
    assert_eq!(config.alert.threshold, defaults::ALERT_THRESHOLD);
    assert_eq!(config.scoring.model_path, PathBuf::from(defaults::MODEL_PATH));
}

#[test]
fn example_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("motor_sentinel.example.toml");
    let config = AppConfig::load_from_file(&path).unwrap();
    config.validate().unwrap();

    let defaults = AppConfig::default();
    assert_eq!(config.broker.host, defaults.broker.host);
    assert_eq!(config.broker.keep_alive_secs, defaults.broker.keep_alive_secs);
    assert_eq!(config.storage.data_dir, defaults.storage.data_dir);
    assert_eq!(config.smoothing.window_size, defaults.smoothing.window_size);
    assert_eq!(config.alert.api_base, defaults.alert.api_base);
    assert!(config.alert.chat_id.is_none());
    assert!(config.server.addr.is_none());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let err = AppConfig::load(Some(Path::new("/nonexistent/motor_sentinel.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_, _)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[broker\nhost = ");
    let err = AppConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_, _)));
}

#[test]
fn wrong_value_type_is_a_parse_error() {
    let file = write_config("[broker]\nport = \"eighteen\"\n");
    let err = AppConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_, _)));
}

#[test]
fn out_of_range_values_fail_validation() {
    let cases = [
        ("[alert]\nthreshold = 1.5\n", "alert.threshold"),
        ("[smoothing]\nwindow_size = 0\n", "smoothing.window_size"),
        ("[broker]\nport = 0\n", "broker.port"),
        ("[broker]\ntopic = \"motor/+/data\"\n", "broker.topic"),
        ("[broker]\nkeep_alive_secs = 1\n", "broker.keep_alive_secs"),
        ("[server]\naddr = \"localhost\"\n", "server.addr"),
    ];

    for (contents, expected_field) in cases {
        let file = write_config(contents);
        let config = AppConfig::load_from_file(file.path()).unwrap();
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("{contents:?}: expected invalid {expected_field}, got {other:?}"),
        }
    }
}

#[test]
fn environment_overrides_file_values() {
    let file = write_config(
        r#"
[broker]
host = "from-file"
port = 1884

[alert]
chat_id = "file-chat"
"#,
    );

    let mut config = AppConfig::load_from_file(file.path()).unwrap();
    config
        .apply_env_from(env(&[
            ("MQTT_BROKER", "from-env"),
            ("TELEGRAM_BOT_TOKEN", "42:token"),
            ("MODEL_PATH", "/opt/models/motor.json"),
            ("MOTOR_SENTINEL_SERVER_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
    config.validate().unwrap();

    assert_eq!(config.broker.host, "from-env");
    // Not overridden
    assert_eq!(config.broker.port, 1884);
    assert_eq!(config.alert.credentials(), Some(("42:token", "file-chat")));
    assert_eq!(config.scoring.model_path, PathBuf::from("/opt/models/motor.json"));
    assert_eq!(config.server.addr.as_deref(), Some("127.0.0.1:9000"));
}

#[test]
fn bot_token_is_never_serialized() {
    let mut config = AppConfig::default();
    config.alert.bot_token = Some("42:secret".to_string());
    let rendered = toml::to_string(&config).unwrap();
    assert!(!rendered.contains("42:secret"));
}
