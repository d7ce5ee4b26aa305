use api::scheduler::Scheduler;
use jiff::Span;
use payloads::{EntryStatus, ReferralPayout, requests};
use rust_decimal::dec;
use std::time::Duration;

use test_helpers::{
    TestApp, bob_login_credentials, bot_a, quick_plan, spawn_app,
};

/// Admin, alice, and bob referred by alice with $100 in the quick plan.
async fn bob_invests_quickly()
-> anyhow::Result<(TestApp, payloads::responses::Investment)> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    let alice = app.create_alice_user().await?;
    app.create_bob_user(Some(&alice.referral_code)).await?;
    app.create_plan(&quick_plan()).await?;
    app.fund(&bob_login_credentials(), dec!(100)).await?;
    app.login_bob().await?;
    let investment = app
        .client
        .create_investment(
            "Quick",
            &requests::CreateInvestment { amount: dec!(100) },
        )
        .await?;
    Ok((app, investment))
}

#[tokio::test]
async fn matured_investment_is_paid_once() -> anyhow::Result<()> {
    let (app, investment) = bob_invests_quickly().await?;
    assert_eq!(app.balance_of("bob").await?, dec!(0));

    // not due yet
    app.time_source.advance(Span::new().seconds(2));
    app.tick().await?;
    assert_eq!(app.balance_of("bob").await?, dec!(0));
    let listed = app.client.list_investments().await?;
    assert_eq!(listed[0].status, EntryStatus::Active);

    app.time_source.advance(Span::new().seconds(3));
    app.tick().await?;
    assert_eq!(app.balance_of("bob").await?, dec!(120.00));
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));

    let listed = app.client.list_investments().await?;
    assert_eq!(listed[0].id, investment.id);
    assert_eq!(listed[0].status, EntryStatus::Completed);
    assert_eq!(listed[0].referral_payout, ReferralPayout::Paid);
    assert_eq!(listed[0].completed_at, Some(app.time_source.now()));

    app.time_source.advance(Span::new().seconds(60));
    app.tick().await?;
    app.tick().await?;
    assert_eq!(app.balance_of("bob").await?, dec!(120.00));
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));

    // owner and referrer are both told
    assert!(app.wait_for_notifications("alice", 1).await? >= 1);

    Ok(())
}

fn start_scheduler(app: &TestApp) -> tokio::task::JoinHandle<()> {
    let scheduler = Scheduler::new(
        app.db_pool.clone(),
        app.time_source.clone(),
        app.notifier.clone(),
        app.store_timeout,
        Duration::from_millis(50),
    );
    tokio::spawn(async move { scheduler.run().await })
}

#[tokio::test]
async fn restart_before_maturity_still_pays_once() -> anyhow::Result<()> {
    let (app, _investment) = bob_invests_quickly().await?;

    // the first instance runs for a while, then the server goes down
    app.time_source.advance(Span::new().seconds(2));
    let first = start_scheduler(&app);
    tokio::time::sleep(Duration::from_millis(200)).await;
    first.abort();
    let _ = first.await;
    assert_eq!(app.balance_of("bob").await?, dec!(0));

    // a fresh instance, then the investment comes due
    let second = start_scheduler(&app);
    app.time_source.advance(Span::new().seconds(4));

    let mut balance = dec!(0);
    for _ in 0..50 {
        balance = app.balance_of("bob").await?;
        if balance > dec!(0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(balance, dec!(120.00));

    // several more ticks go by
    tokio::time::sleep(Duration::from_millis(300)).await;
    second.abort();
    assert_eq!(app.balance_of("bob").await?, dec!(120.00));
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));
    let listed = app.client.list_investments().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, EntryStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn restart_long_after_maturity_catches_up() -> anyhow::Result<()> {
    let (app, _investment) = bob_invests_quickly().await?;

    // the server was down well past maturity
    app.time_source.advance(Span::new().hours(6));
    let scheduler = start_scheduler(&app);

    let mut balance = dec!(0);
    for _ in 0..50 {
        balance = app.balance_of("bob").await?;
        if balance > dec!(0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    scheduler.abort();
    assert_eq!(balance, dec!(120.00));
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));

    Ok(())
}

#[tokio::test]
async fn concurrent_schedulers_pay_once() -> anyhow::Result<()> {
    let (app, _investment) = bob_invests_quickly().await?;
    app.time_source.advance(Span::new().seconds(10));

    let (a, b) = tokio::join!(app.tick(), app.tick());
    a?;
    b?;
    assert_eq!(app.balance_of("bob").await?, dec!(120.00));
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));

    Ok(())
}

#[tokio::test]
async fn pending_referral_is_reconciled() -> anyhow::Result<()> {
    let (app, investment) = bob_invests_quickly().await?;

    // the owner was paid but the referrer credit never committed
    sqlx::query(
        "UPDATE investments
        SET status = 'completed',
            ref_earning = referral_commission,
            completed_at = now(),
            referral_payout = 'pending'
        WHERE id = $1",
    )
    .bind(&investment.id.0)
    .execute(&app.db_pool)
    .await?;
    assert_eq!(app.balance_of("alice").await?, dec!(0));

    app.tick().await?;
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));
    let listed = app.client.list_investments().await?;
    assert_eq!(listed[0].referral_payout, ReferralPayout::Paid);
    // the owner isn't paid a second time
    assert_eq!(app.balance_of("bob").await?, dec!(0));

    app.tick().await?;
    assert_eq!(app.balance_of("alice").await?, dec!(10.00));

    Ok(())
}

#[tokio::test]
async fn purchase_expires_without_moving_money() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_bot(&bot_a()).await?;
    app.create_bob_user(None).await?;
    app.fund(&bob_login_credentials(), dec!(80)).await?;
    app.login_bob().await?;
    app.client.buy_bot("Scalper").await?;
    assert_eq!(app.balance_of("bob").await?, dec!(30));

    app.time_source.advance(Span::new().hours(29 * 24));
    app.tick().await?;
    let purchases = app.client.list_purchases().await?;
    assert_eq!(purchases[0].status, EntryStatus::Active);

    app.time_source.advance(Span::new().hours(24));
    app.tick().await?;
    let purchases = app.client.list_purchases().await?;
    assert_eq!(purchases[0].status, EntryStatus::Completed);
    assert_eq!(purchases[0].completed_at, Some(app.time_source.now()));
    assert_eq!(app.balance_of("bob").await?, dec!(30));

    Ok(())
}
