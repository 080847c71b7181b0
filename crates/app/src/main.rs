use std::net::SocketAddr;

use clap::Parser;
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

/// School ledger server.
#[derive(Debug, Parser)]
#[command(name = "bursar", version)]
struct Cli {
    /// Configuration file, without extension.
    #[arg(long, env = "BURSAR_CONFIG", default_value = settings::DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "bursar={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .conflict_retries(settings.ledger.conflict_retries)
        .build()
        .await?;

    if let Some(admin) = &settings.admin {
        engine
            .ensure_user(&admin.username, &admin.password, engine::UserRole::Admin)
            .await?;
        tracing::info!(username = %admin.username, "administrator ready");
    }

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{}:{}", bind, settings.server.port).parse()?;
    server::run(engine, addr).await;

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
