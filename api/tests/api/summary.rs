use payloads::{RequestStatus, requests, responses::Tally};
use reqwest::StatusCode;
use rust_decimal::dec;

use test_helpers::{
    alice_login_credentials, assert_status_code, bob_login_credentials, bot_a,
    plan_a, spawn_app,
};

#[tokio::test]
async fn totals_per_ledger() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    let alice = app.create_alice_user().await?;
    app.create_bob_user(Some(&alice.referral_code)).await?;
    app.create_plan(&plan_a()).await?;
    app.create_bot(&bot_a()).await?;
    app.fund(&alice_login_credentials(), dec!(1000)).await?;
    app.fund(&bob_login_credentials(), dec!(50)).await?;

    app.login_alice().await?;
    // a pending and a declined deposit don't count
    app.client
        .create_deposit(&requests::CreateDeposit {
            method: "usdt".into(),
            amount: dec!(300),
            transaction_id: "pending".into(),
        })
        .await?;
    let declined = app
        .client
        .create_deposit(&requests::CreateDeposit {
            method: "usdt".into(),
            amount: dec!(70),
            transaction_id: "declined".into(),
        })
        .await?;
    let kept = app
        .client
        .create_withdrawal(&requests::CreateWithdrawal {
            method: "bitcoin".into(),
            address: "bc1qalice".into(),
            amount: dec!(100),
        })
        .await?;
    let refunded = app
        .client
        .create_withdrawal(&requests::CreateWithdrawal {
            method: "bitcoin".into(),
            address: "bc1qalice".into(),
            amount: dec!(200),
        })
        .await?;
    app.client
        .create_investment(
            "Starter",
            &requests::CreateInvestment { amount: dec!(500) },
        )
        .await?;
    app.client.buy_bot("Scalper").await?;

    app.login_admin().await?;
    app.client
        .update_deposit(&requests::UpdateDeposit {
            id: declined.id,
            status: RequestStatus::Declined,
        })
        .await?;
    app.client
        .update_withdrawal(&requests::UpdateWithdrawal {
            id: refunded.id,
            status: RequestStatus::Declined,
        })
        .await?;
    app.client
        .update_withdrawal(&requests::UpdateWithdrawal {
            id: kept.id,
            status: RequestStatus::Confirmed,
        })
        .await?;

    // bob's purchase earns alice 10% of $50
    app.login_bob().await?;
    app.client.buy_bot("Scalper").await?;

    app.login_alice().await?;
    let totals = app.client.totals().await?;
    // 1000 - 100 - 500 - 50 + 5
    assert_eq!(totals.balance, dec!(355.00));
    assert_eq!(
        totals.deposits,
        Tally {
            sum: dec!(1000),
            count: 1
        }
    );
    assert_eq!(
        totals.withdrawals,
        Tally {
            sum: dec!(100),
            count: 1
        }
    );
    // payout value, not principal
    assert_eq!(
        totals.investments,
        Tally {
            sum: dec!(550),
            count: 1
        }
    );
    assert_eq!(
        totals.purchases,
        Tally {
            sum: dec!(50),
            count: 1
        }
    );
    assert_eq!(
        totals.referral_earnings,
        Tally {
            sum: dec!(5),
            count: 1
        }
    );

    Ok(())
}

#[tokio::test]
async fn empty_totals() -> anyhow::Result<()> {
    let app = spawn_app().await;

    assert_status_code(app.client.totals().await, StatusCode::UNAUTHORIZED);

    app.create_alice_user().await?;
    let totals = app.client.totals().await?;
    assert_eq!(totals.balance, dec!(0));
    assert_eq!(totals.deposits, Tally::default());
    assert_eq!(totals.referral_earnings, Tally::default());

    let earnings = app.client.referral_earnings().await?;
    assert!(earnings.investments.is_empty());
    assert!(earnings.purchases.is_empty());

    Ok(())
}
