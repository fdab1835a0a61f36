use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voucher_ledger::{
    config::{self, database},
    core::{period_lock, settings},
    errors::Result,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Load .env file (non-fatal, env vars can be set externally)
    dotenv().ok();

    // 2. Load the application configuration
    let app_config = config::app::load_app_configuration()?;

    // 3. Initialize tracing; RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.log_filter)),
        )
        .init();
    info!("Loaded configuration: {:?}", app_config);

    // 4. Prepare storage
    tokio::fs::create_dir_all(&app_config.attachments_dir)
        .await
        .inspect_err(|e| error!("Failed to create attachments directory: {}", e))?;

    let db = database::create_connection(&app_config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;
    database::verify_tables(&db).await?;

    // 5. Report the runtime settings the ledger will run with
    match period_lock::closed_until(&db).await? {
        Some(date) => info!("Periods closed through {date}"),
        None => info!("No closed period"),
    }
    let allow_negative = settings::get_bool(&db, settings::EARMARK_ALLOW_NEGATIVE).await?;
    info!("Negative earmark balances allowed: {allow_negative}");

    Ok(())
}
