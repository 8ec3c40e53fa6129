pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stockroom",
    about = "Stockroom operator CLI",
    long_about = "Operate Stockroom database migrations, demo data, account bootstrap, \
                  config inspection, and readiness diagnostics.",
    after_help = "Examples:\n  stockroom migrate\n  stockroom seed\n  stockroom create-admin --email ops@example.com --name Ops --password <secret>\n  stockroom doctor --json\n  stockroom config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify every expected record")]
    Seed,
    #[command(about = "Create an administrator account with a freshly hashed password")]
    CreateAdmin {
        #[arg(long, help = "Email address the administrator signs in with")]
        email: String,
        #[arg(long, help = "Display name shown in audit entries and notifications")]
        name: String,
        #[arg(long, help = "Initial password (hashed with bcrypt before storage)")]
        password: String,
    },
    #[command(about = "Validate config, database connectivity, and migration status")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::CreateAdmin { email, name, password } => {
            commands::create_admin::run(&email, &name, &password)
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
