use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use stockroom_cli::commands::{config, create_admin, doctor, migrate, seed};

#[test]
fn migrate_reports_the_schema_version_with_valid_env() {
    with_env(&[("STOCKROOM_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("schema at version"), "message: {message}");
    });
}

#[test]
fn migrate_rejects_a_non_sqlite_database_url() {
    with_env(&[("STOCKROOM_DATABASE_URL", "postgres://stockroom")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_and_verifies_the_demo_dataset() {
    with_env(
        &[("STOCKROOM_DATABASE_URL", "sqlite::memory:"), ("STOCKROOM_AUTH_BCRYPT_COST", "4")],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");

            let message = payload["message"].as_str().unwrap_or("");
            assert!(message.contains("2 accounts, 4 units"), "message: {message}");
            assert!(message.contains("  - Admin <admin@stockroom.local> (ADMIN)"));
            assert!(message.contains("  - User <user@stockroom.local> (USER)"));
        },
    );
}

#[test]
fn seed_is_idempotent_on_a_persistent_database() {
    let (path, url) = temp_db_url("seed");
    with_env(
        &[("STOCKROOM_DATABASE_URL", url.as_str()), ("STOCKROOM_AUTH_BCRYPT_COST", "4")],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "first seed run: {}", first.output);

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "second seed run: {}", second.output);

            assert_eq!(
                parse_payload(&first.output)["message"],
                parse_payload(&second.output)["message"]
            );
        },
    );
    remove_db_files(&path);
}

#[test]
fn create_admin_bootstraps_once_and_conflicts_after() {
    let (path, url) = temp_db_url("create-admin");
    with_env(
        &[("STOCKROOM_DATABASE_URL", url.as_str()), ("STOCKROOM_AUTH_BCRYPT_COST", "4")],
        || {
            let first = create_admin::run("Ops@Example.com", "Ops", "super-secret");
            assert_eq!(first.exit_code, 0, "expected create-admin success: {}", first.output);

            let first_payload = parse_payload(&first.output);
            assert_eq!(first_payload["command"], "create-admin");
            assert_eq!(first_payload["status"], "ok");

            let message = first_payload["message"].as_str().unwrap_or("");
            assert!(message.contains("`ops@example.com`"), "normalized email in: {message}");

            let second = create_admin::run("ops@example.com", "Ops Again", "other-secret");
            assert_eq!(second.exit_code, 6, "expected conflict exit code: {}", second.output);

            let second_payload = parse_payload(&second.output);
            assert_eq!(second_payload["status"], "error");
            assert_eq!(second_payload["error_class"], "account_conflict");
        },
    );
    remove_db_files(&path);
}

#[test]
fn doctor_passes_once_migrations_are_applied() {
    let (path, url) = temp_db_url("doctor");
    with_env(&[("STOCKROOM_DATABASE_URL", url.as_str())], || {
        let migrated = migrate::run();
        assert_eq!(migrated.exit_code, 0, "migrate should succeed: {}", migrated.output);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "doctor should pass: {}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["command"], "doctor");
        assert_eq!(report["overall_status"], "pass");

        let checks = report["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });
    remove_db_files(&path);
}

#[test]
fn doctor_flags_pending_migrations() {
    with_env(&[("STOCKROOM_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 6, "expected failing doctor report: {}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");

        let checks = report["checks"].as_array().expect("checks array");
        let migration_check = checks
            .iter()
            .find(|check| check["name"] == "migration_status")
            .expect("migration_status check");
        assert_eq!(migration_check["status"], "fail");

        let details = migration_check["details"].as_str().unwrap_or("");
        assert!(details.contains("run `stockroom migrate`"), "details: {details}");
    });
}

#[test]
fn config_attributes_env_overrides_and_defaults() {
    with_env(
        &[("STOCKROOM_DATABASE_URL", "sqlite::memory:"), ("STOCKROOM_LOG_LEVEL", "debug")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            assert!(result.output.starts_with("effective config"));
            assert!(result
                .output
                .contains("- database.url = sqlite::memory: (source: env (STOCKROOM_DATABASE_URL))"));
            assert!(result
                .output
                .contains("- logging.level = debug (source: env (STOCKROOM_LOG_LEVEL))"));
            assert!(result.output.contains("- server.port = 8080 (source: default)"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn temp_db_url(tag: &str) -> (PathBuf, String) {
    let mut path = env::temp_dir();
    path.push(format!("stockroom-cli-{tag}-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let url = format!("sqlite://{}?mode=rwc", path.display());
    (path, url)
}

fn remove_db_files(path: &Path) {
    let _ = std::fs::remove_file(path);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_os_string();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(sidecar));
    }
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STOCKROOM_DATABASE_URL",
        "STOCKROOM_DATABASE_MAX_CONNECTIONS",
        "STOCKROOM_DATABASE_TIMEOUT_SECS",
        "STOCKROOM_SERVER_BIND_ADDRESS",
        "STOCKROOM_SERVER_PORT",
        "STOCKROOM_SERVER_HEALTH_CHECK_PORT",
        "STOCKROOM_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "STOCKROOM_AUTH_SESSION_TTL_HOURS",
        "STOCKROOM_AUTH_BCRYPT_COST",
        "STOCKROOM_INVENTORY_LOW_STOCK_THRESHOLD",
        "STOCKROOM_EVENTS_CHANNEL_CAPACITY",
        "STOCKROOM_LOGGING_LEVEL",
        "STOCKROOM_LOGGING_FORMAT",
        "STOCKROOM_LOG_LEVEL",
        "STOCKROOM_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
