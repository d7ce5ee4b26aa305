use jiff::Span;
use payloads::{EntryStatus, ReferralPayout, requests};
use reqwest::StatusCode;
use rust_decimal::dec;

use test_helpers::{
    alice_login_credentials, assert_api_error, assert_status_code, bot_a,
    spawn_app,
};

#[tokio::test]
async fn buy_a_bot() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    let bot = app.create_bot(&bot_a()).await?;
    assert_eq!(bot.price, dec!(50));
    app.fund(&alice_login_credentials(), dec!(120)).await?;

    app.login_alice().await?;
    assert_eq!(app.client.list_bots().await?, vec![bot]);

    let purchase = app.client.buy_bot("Scalper").await?;
    assert_eq!(purchase.amount, dec!(50));
    assert_eq!(purchase.status, EntryStatus::Active);
    // commission is computed even with nobody to pay it to
    assert_eq!(purchase.ref_earning, dec!(5.00));
    assert_eq!(purchase.referral_payout, ReferralPayout::None);
    assert_eq!(
        purchase.matures_at,
        app.time_source.now() + Span::new().hours(30 * 24)
    );
    assert_eq!(app.balance_of("alice").await?, dec!(70));

    app.client.buy_bot("Scalper").await?;
    assert_api_error(
        app.client.buy_bot("Scalper").await,
        StatusCode::BAD_REQUEST,
        "Insufficient balance",
    );
    assert_eq!(app.balance_of("alice").await?, dec!(20));
    assert_eq!(app.client.list_purchases().await?.len(), 2);

    assert_api_error(
        app.client.buy_bot("Nonexistent").await,
        StatusCode::NOT_FOUND,
        "Bot not found",
    );

    Ok(())
}

#[tokio::test]
async fn bots_are_created_by_admins() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_bot(&bot_a()).await?;

    assert_api_error(
        app.client.create_bot(&bot_a()).await,
        StatusCode::BAD_REQUEST,
        "A bot with this name already exists",
    );
    assert_status_code(
        app.client
            .create_bot(&requests::CreateBot {
                price: dec!(0),
                ..bot_a()
            })
            .await,
        StatusCode::BAD_REQUEST,
    );

    app.create_alice_user().await?;
    assert_status_code(
        app.client
            .create_bot(&requests::CreateBot {
                name: "Momentum".into(),
                ..bot_a()
            })
            .await,
        StatusCode::FORBIDDEN,
    );
    assert!(app.client.list_purchases().await?.is_empty());

    Ok(())
}
