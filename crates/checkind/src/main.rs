use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use checkin_service::{CheckInService, Config, SqliteStore};
use tracing_subscriber::EnvFilter;

mod dbus_interface;

use dbus_interface::{CheckInInterface, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("checkind starting");

    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path)?;
    let service = Arc::new(CheckInService::new(&config, store));

    // Guard state expires lazily; the sweep only reclaims memory.
    let sweeper = Arc::clone(&service);
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });

    let iface = CheckInInterface::new(Arc::clone(&service), &config);
    let builder = if std::env::var("CHECKIN_SESSION_BUS").is_ok_and(|v| v != "0") {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await?;

    tracing::info!(
        bus = BUS_NAME,
        db = %config.db_path.display(),
        "checkind ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("checkind shutting down");

    Ok(())
}
