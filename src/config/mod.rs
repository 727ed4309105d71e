//! Configuration Module
//!
//! Operator-tunable settings loaded from TOML, with environment overrides.
//!
//! ## Loading Order
//!
//! 1. Built-in defaults ([`defaults`])
//! 2. TOML file: `--config` / `MOTOR_SENTINEL_CONFIG`, else `./motor_sentinel.toml`
//! 3. Environment: `MQTT_BROKER`, `MQTT_PORT`, `MODEL_PATH`, `DATA_DIR`,
//!    `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `MOTOR_SENTINEL_SERVER_ADDR`
//! 4. Command-line flags (applied by the binary)
//!
//! The resolved [`AppConfig`] is validated once and then handed to each
//! component by value; there is no global accessor.

mod app_config;
pub mod defaults;

pub use app_config::*;
