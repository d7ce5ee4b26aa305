mod account;
mod invest;
mod plan;
mod purchase;
mod scheduler;
mod summary;
mod withdraw;

use test_helpers::spawn_app;

#[tokio::test]
async fn health_check() -> anyhow::Result<()> {
    let app = spawn_app().await;

    app.client.health_check().await?;

    Ok(())
}
