use migration::{Migrator, MigratorTrait};

mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledger={level},server={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect(&settings.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .retry_policy(settings.retry.policy())
        .build()
        .await?;

    if let Some(seed) = &settings.seed {
        seed_if_empty(&engine, seed).await?;
    }

    let addr: std::net::SocketAddr = settings.listen_addr().parse()?;
    server::run(engine, addr, settings.server.options()).await;

    Ok(())
}

async fn connect(config: &settings::Database) -> Result<sea_orm::DatabaseConnection, BoxError> {
    let database = sea_orm::Database::connect(config.url()).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

/// Create the configured wallets, but only on a store without any.
async fn seed_if_empty(engine: &engine::Engine, seed: &settings::Seed) -> Result<(), BoxError> {
    let existing = engine.wallet_count().await?;
    if existing > 0 {
        tracing::info!(existing, "store already has wallets, skipping seed");
        return Ok(());
    }

    for id in engine.seed_wallets(seed.wallets, &seed.balance).await? {
        tracing::info!(wallet = %id, balance = %seed.balance, "seeded wallet");
    }
    Ok(())
}
