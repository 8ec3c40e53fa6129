use crate::commands::CommandResult;
use stockroom_core::config::{AppConfig, LoadOptions};
use stockroom_db::{
    connect_with_settings, migrations, DemoDataset, SeedPasswordHashes, SeedResult,
};

// Demo credentials are intentionally well-known; the dataset exists for
// local walkthroughs, not for anything internet-facing.
const DEMO_ADMIN_PASSWORD: &str = "admin123";
const DEMO_USER_PASSWORD: &str = "user123";

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let hashes = match hash_demo_passwords(config.auth.bcrypt_cost) {
        Ok(hashes) => hashes,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "password_hashing",
                format!("failed to hash demo passwords: {error}"),
                3,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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

        let loaded = DemoDataset::load(&pool, &hashes)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedResult, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(loaded)
            } else {
                Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(loaded) => CommandResult::success("seed", render_summary(&loaded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn hash_demo_passwords(cost: u32) -> Result<SeedPasswordHashes, bcrypt::BcryptError> {
    Ok(SeedPasswordHashes {
        admin: bcrypt::hash(DEMO_ADMIN_PASSWORD, cost)?,
        user: bcrypt::hash(DEMO_USER_PASSWORD, cost)?,
    })
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed.is_empty() {
        "some demo records failed to load".to_string()
    } else {
        format!("verification failed for: {}", failed.join(", "))
    }
}

fn render_summary(loaded: &SeedResult) -> String {
    let account_lines = loaded
        .users_seeded
        .iter()
        .map(|account| format!("  - {} <{}> ({})", account.name, account.email, account.role))
        .collect::<Vec<_>>();

    format!(
        "demo dataset loaded and verified: {} accounts, {} units\n{}",
        loaded.users_seeded.len(),
        loaded.units_seeded,
        account_lines.join("\n")
    )
}
