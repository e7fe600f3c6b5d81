use std::sync::Arc;

use front_plugin::{Action, FrontPlugin, PaymentDemoPlugin};
use front_store::{Config, EntityStore, FrontOperations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "front_plugin=debug,front_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config ({}), using the built-in demo setup", e);
        Config::default()
    });

    let store = Arc::new(EntityStore::from_config(&config)?);
    let cafe_session = store.cafe_session()?;
    tracing::info!(
        "Front started, cafe session #{} is {}, currency {}",
        cafe_session.number,
        if cafe_session.is_open { "open" } else { "closed" },
        config.store.currency
    );

    let mut plugin = PaymentDemoPlugin::new(config.plugin.clone());
    let operations = Arc::new(FrontOperations::new(store.clone(), &config.plugin.user_name));
    plugin.initialize(operations, store.subscribe()).await?;

    let failed = plugin.run_all().await;
    tracing::info!("{} of {} actions failed", failed, Action::ALL.len());

    plugin.shutdown().await?;

    println!("{}", store.metrics().gather_text()?);
    Ok(())
}
