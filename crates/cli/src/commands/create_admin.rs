use chrono::Utc;

use crate::commands::CommandResult;
use stockroom_core::config::{AppConfig, LoadOptions};
use stockroom_core::domain::user::{Role, User, UserId};
use stockroom_db::repositories::{SqlUserRepository, UserRepository};
use stockroom_db::{connect_with_settings, migrations};

pub fn run(email: &str, name: &str, password: &str) -> CommandResult {
    // Same normalization the login endpoint applies, so the address created
    // here is the address that signs in.
    let email = email.trim().to_ascii_lowercase();
    let name = name.trim().to_string();

    if !email.contains('@') {
        return CommandResult::failure(
            "create-admin",
            "invalid_argument",
            format!("`{email}` does not look like an email address"),
            2,
        );
    }
    if name.is_empty() {
        return CommandResult::failure(
            "create-admin",
            "invalid_argument",
            "name must not be empty",
            2,
        );
    }
    if password.is_empty() {
        return CommandResult::failure(
            "create-admin",
            "invalid_argument",
            "password must not be empty",
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "create-admin",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let password_hash = match bcrypt::hash(password, config.auth.bcrypt_cost) {
        Ok(hash) => hash,
        Err(error) => {
            return CommandResult::failure(
                "create-admin",
                "password_hashing",
                format!("failed to hash the password: {error}"),
                3,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "create-admin",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let users = SqlUserRepository::new(pool.clone());
        let existing = users
            .find_by_email(&email)
            .await
            .map_err(|error| ("account_lookup", error.to_string(), 5u8))?;

        let run_result: Result<UserId, (&'static str, String, u8)> = if existing.is_some() {
            Err(("account_conflict", format!("an account already uses `{email}`"), 6u8))
        } else {
            let now = Utc::now();
            let account = User {
                id: UserId::generate(),
                name: name.clone(),
                email: email.clone(),
                password_hash,
                role: Role::Admin,
                created_at: now,
                updated_at: now,
            };
            let account_id = account.id.clone();
            users
                .save(account)
                .await
                .map(|()| account_id)
                .map_err(|error| ("account_write", error.to_string(), 5u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(account_id) => CommandResult::success(
            "create-admin",
            format!("created administrator `{email}` ({account_id})"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("create-admin", error_class, message, exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::run;
    use serde_json::Value;

    fn payload(output: &str) -> Value {
        serde_json::from_str(output).expect("command output should be valid JSON")
    }

    #[test]
    fn malformed_email_is_rejected_before_touching_config() {
        let result = run("not-an-address", "Ops", "secret");
        assert_eq!(result.exit_code, 2);

        let payload = payload(&result.output);
        assert_eq!(payload["command"], "create-admin");
        assert_eq!(payload["error_class"], "invalid_argument");
    }

    #[test]
    fn blank_name_and_blank_password_are_rejected() {
        let no_name = run("ops@example.com", "   ", "secret");
        assert_eq!(no_name.exit_code, 2);
        assert_eq!(payload(&no_name.output)["error_class"], "invalid_argument");

        let no_password = run("ops@example.com", "Ops", "");
        assert_eq!(no_password.exit_code, 2);
        assert_eq!(payload(&no_password.output)["error_class"], "invalid_argument");
    }
}
