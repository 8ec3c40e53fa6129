use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandResult;
use stockroom_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["STOCKROOM_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["STOCKROOM_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["STOCKROOM_DATABASE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["STOCKROOM_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["STOCKROOM_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", &["STOCKROOM_SERVER_HEALTH_CHECK_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["STOCKROOM_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    lines.push(render_line(
        "auth.session_ttl_hours",
        &config.auth.session_ttl_hours.to_string(),
        source("auth.session_ttl_hours", &["STOCKROOM_AUTH_SESSION_TTL_HOURS"]),
    ));
    lines.push(render_line(
        "auth.bcrypt_cost",
        &config.auth.bcrypt_cost.to_string(),
        source("auth.bcrypt_cost", &["STOCKROOM_AUTH_BCRYPT_COST"]),
    ));

    lines.push(render_line(
        "inventory.default_low_stock_threshold",
        &config.inventory.default_low_stock_threshold.to_string(),
        source(
            "inventory.default_low_stock_threshold",
            &["STOCKROOM_INVENTORY_LOW_STOCK_THRESHOLD"],
        ),
    ));

    lines.push(render_line(
        "events.channel_capacity",
        &config.events.channel_capacity.to_string(),
        source("events.channel_capacity", &["STOCKROOM_EVENTS_CHANNEL_CAPACITY"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["STOCKROOM_LOGGING_LEVEL", "STOCKROOM_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["STOCKROOM_LOGGING_FORMAT", "STOCKROOM_LOG_FORMAT"]),
    ));

    CommandResult::raw(0, lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("stockroom.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/stockroom.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
