//! Administrative entry point for the points platform.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use points_common::Config;
use points_core::{RegisterUserInput, UserService};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Campus points administration.
#[derive(Parser)]
#[command(name = "points-admin")]
#[command(about = "Administer the campus points database", long_about = None)]
struct Cli {
    /// Path to a configuration file (defaults to `config/` and `POINTS__*`)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create a verified superuser
    CreateSuperuser {
        /// 7-8 lowercase letters and digits
        #[arg(long)]
        utorid: String,

        #[arg(long)]
        name: String,

        /// Must be a `@mail.utoronto.ca` address
        #[arg(long, env = "POINTS_SUPERUSER_EMAIL")]
        email: String,
    },
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "points=debug,sea_orm=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let db = points_db::init(&config).await?;
    info!("Connected to database");

    match cli.command {
        Commands::Migrate => {
            points_db::migrate(&db).await?;
            info!("Migrations applied");
        }
        Commands::CreateSuperuser {
            utorid,
            name,
            email,
        } => {
            points_db::migrate(&db).await?;
            let users = UserService::new(Arc::new(db), &config.registration);
            let created = users
                .bootstrap_superuser(RegisterUserInput {
                    utorid,
                    name,
                    email,
                })
                .await?;
            info!(user_id = created.id, utorid = %created.utorid, "Superuser ready");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_superuser() {
        let cli = Cli::try_parse_from([
            "points-admin",
            "create-superuser",
            "--utorid",
            "admin001",
            "--name",
            "Admin",
            "--email",
            "admin001@mail.utoronto.ca",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::CreateSuperuser { utorid, .. }) if utorid == "admin001"
        ));
    }
}
