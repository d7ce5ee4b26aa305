//! Development server
//!
//! This binary creates a persistent API server seeded with demo data for
//! frontend development. Entries are created at mocked past times so some
//! have already matured, then the mocked clock follows real time and the
//! scheduler runs as it would in production.
//!
//! Usage: cargo run -p dev-server

use anyhow::Result;
use api::scheduler::Scheduler;
use api::telemetry::{LogFormat, get_subscriber, init_subscriber};
use jiff::Timestamp;
use std::time::Duration;
use test_helpers::mock::DevDataset;
use tokio::time::interval;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info".into(), LogFormat::from_env());
    init_subscriber(subscriber);

    info!("🚀 Starting development server");

    let app = test_helpers::spawn_app().await;
    info!("✅ API server running on http://127.0.0.1:{}", app.port);

    info!("📊 Setting up development data...");
    let dataset = DevDataset::create(&app).await?;

    start_time_sync_task(&app);
    let scheduler = Scheduler::new(
        app.db_pool.clone(),
        app.time_source.clone(),
        app.notifier.clone(),
        app.store_timeout,
        Duration::from_secs(1),
    );
    tokio::spawn(async move {
        scheduler.run().await;
    });

    info!("🎯 Development server ready!");
    info!("   API: http://127.0.0.1:{}/api", app.port);
    info!("");
    dataset.print_summary();
    info!("");
    info!("👋 Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down development server");
    Ok(())
}

/// Keep the mocked time source in step with real time.
fn start_time_sync_task(app: &test_helpers::TestApp) {
    let time_source = app.time_source.clone();

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            time_source.set(Timestamp::now());
        }
    });
}
