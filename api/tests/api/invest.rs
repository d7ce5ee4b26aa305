use jiff::Span;
use payloads::{
    EntryStatus, InvestmentId, ReferralPayout, requests, responses::PayoutOutcome,
};
use reqwest::StatusCode;
use rust_decimal::{Decimal, dec};

use test_helpers::{
    TestApp, alice_login_credentials, assert_api_error, assert_status_code,
    plan_a, spawn_app,
};

/// Admin, alice with `funds`, and the starter plan. Leaves alice logged in.
async fn alice_with_funds(funds: Decimal) -> anyhow::Result<TestApp> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.create_plan(&plan_a()).await?;
    app.fund(&alice_login_credentials(), funds).await?;
    app.login_alice().await?;
    Ok(app)
}

fn invest(amount: Decimal) -> requests::CreateInvestment {
    requests::CreateInvestment { amount }
}

#[tokio::test]
async fn investment_freezes_its_terms() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(1000)).await?;

    let investment = app
        .client
        .create_investment("Starter", &invest(dec!(500)))
        .await?;
    assert_eq!(investment.amount, dec!(500));
    assert_eq!(investment.payout_amount, dec!(550.00));
    assert_eq!(investment.referral_commission, dec!(25.00));
    assert_eq!(investment.status, EntryStatus::Active);
    assert_eq!(investment.referral_payout, ReferralPayout::None);
    assert_eq!(investment.referral_code_snapshot, None);
    assert_eq!(investment.ref_earning, None);
    assert_eq!(investment.completed_at, None);
    assert_eq!(
        investment.matures_at,
        app.time_source.now() + Span::new().hours(24)
    );
    assert_eq!(app.balance_of("alice").await?, dec!(500));

    assert_eq!(app.client.list_investments().await?, vec![investment]);

    Ok(())
}

#[tokio::test]
async fn investment_limits() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(2000)).await?;

    for amount in [dec!(99.99), dec!(1000.01)] {
        assert_status_code(
            app.client.create_investment("Starter", &invest(amount)).await,
            StatusCode::BAD_REQUEST,
        );
    }
    // would round to the plan minimum
    assert_api_error(
        app.client
            .create_investment("Starter", &invest(dec!(99.995)))
            .await,
        StatusCode::BAD_REQUEST,
        "Amounts can have at most 2 decimal places",
    );
    assert_eq!(app.balance_of("alice").await?, dec!(2000));
    // both bounds are inclusive
    app.client
        .create_investment("Starter", &invest(dec!(100)))
        .await?;
    app.client
        .create_investment("Starter", &invest(dec!(1000)))
        .await?;
    assert_eq!(app.balance_of("alice").await?, dec!(900));

    assert_api_error(
        app.client.create_investment("Platinum", &invest(dec!(100))).await,
        StatusCode::NOT_FOUND,
        "Plan not found",
    );

    Ok(())
}

#[tokio::test]
async fn investment_needs_funds() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(200)).await?;

    assert_api_error(
        app.client.create_investment("Starter", &invest(dec!(300))).await,
        StatusCode::BAD_REQUEST,
        "Insufficient balance",
    );
    assert_eq!(app.balance_of("alice").await?, dec!(200));
    assert!(app.client.list_investments().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn payout_happens_exactly_once() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(500)).await?;
    let investment = app
        .client
        .create_investment("Starter", &invest(dec!(500)))
        .await?;
    assert_eq!(app.balance_of("alice").await?, dec!(0));

    app.login_admin().await?;
    let report = app.client.payout_investment(&investment.id).await?;
    assert_eq!(report.outcome, PayoutOutcome::Paid);
    assert_eq!(report.investment.status, EntryStatus::Completed);
    assert_eq!(report.investment.ref_earning, Some(dec!(25.00)));
    assert_eq!(report.investment.completed_at, Some(app.time_source.now()));
    // no referrer to pay
    assert_eq!(report.investment.referral_payout, ReferralPayout::None);
    assert_eq!(app.balance_of("alice").await?, dec!(550.00));

    for _ in 0..2 {
        let report = app.client.payout_investment(&investment.id).await?;
        assert_eq!(report.outcome, PayoutOutcome::AlreadyCompleted);
    }
    assert_eq!(app.balance_of("alice").await?, dec!(550.00));

    // the scheduler finds nothing left to do, even after maturity
    app.time_source.advance(Span::new().hours(48));
    app.tick().await?;
    assert_eq!(app.balance_of("alice").await?, dec!(550.00));

    Ok(())
}

#[tokio::test]
async fn concurrent_payouts_credit_once() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(400)).await?;
    let investment = app
        .client
        .create_investment("Starter", &invest(dec!(400)))
        .await?;

    app.login_admin().await?;
    let (a, b, c) = tokio::join!(
        app.client.payout_investment(&investment.id),
        app.client.payout_investment(&investment.id),
        app.client.payout_investment(&investment.id),
    );
    let outcomes = [a?.outcome, b?.outcome, c?.outcome];
    let paid = outcomes
        .iter()
        .filter(|o| **o == PayoutOutcome::Paid)
        .count();
    assert_eq!(paid, 1);
    assert_eq!(app.balance_of("alice").await?, dec!(440.00));

    Ok(())
}

#[tokio::test]
async fn payout_is_admin_only() -> anyhow::Result<()> {
    let app = alice_with_funds(dec!(100)).await?;
    let investment = app
        .client
        .create_investment("Starter", &invest(dec!(100)))
        .await?;

    assert_status_code(
        app.client.payout_investment(&investment.id).await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client.list_all_investments().await,
        StatusCode::FORBIDDEN,
    );

    app.login_admin().await?;
    assert_api_error(
        app.client
            .payout_investment(&InvestmentId("missing".into()))
            .await,
        StatusCode::NOT_FOUND,
        "Investment not found",
    );
    assert_eq!(app.client.list_all_investments().await?.len(), 1);

    Ok(())
}
