use api::store::StoreError;
use api::store::balance::{Precondition, adjust_balance_tx};
use payloads::{RequestStatus, requests};
use reqwest::StatusCode;
use rust_decimal::{Decimal, dec};

use test_helpers::{
    alice_login_credentials, assert_api_error, assert_status_code, spawn_app,
};

fn bitcoin_withdrawal(amount: Decimal) -> requests::CreateWithdrawal {
    requests::CreateWithdrawal {
        method: "bitcoin".into(),
        address: "bc1qalice".into(),
        amount,
    }
}

#[tokio::test]
async fn withdrawal_minimum_is_inclusive() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(500)).await?;
    app.login_alice().await?;

    assert_api_error(
        app.client
            .create_withdrawal(&bitcoin_withdrawal(dec!(99.99)))
            .await,
        StatusCode::BAD_REQUEST,
        "Minimum withdrawal is $100",
    );
    assert_eq!(app.balance_of("alice").await?, dec!(500));

    let withdrawal = app
        .client
        .create_withdrawal(&bitcoin_withdrawal(dec!(100)))
        .await?;
    assert_eq!(withdrawal.status, RequestStatus::Pending);
    // debited when requested
    assert_eq!(app.balance_of("alice").await?, dec!(400));

    Ok(())
}

#[tokio::test]
async fn sub_cent_withdrawal_is_not_rounded_up() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(500)).await?;
    app.login_alice().await?;

    assert_api_error(
        app.client
            .create_withdrawal(&bitcoin_withdrawal(dec!(99.995)))
            .await,
        StatusCode::BAD_REQUEST,
        "Amounts can have at most 2 decimal places",
    );
    assert_api_error(
        app.client
            .create_withdrawal(&bitcoin_withdrawal(dec!(100.001)))
            .await,
        StatusCode::BAD_REQUEST,
        "Amounts can have at most 2 decimal places",
    );
    assert!(app.client.list_withdrawals().await?.is_empty());
    assert_eq!(app.balance_of("alice").await?, dec!(500));

    Ok(())
}

#[tokio::test]
async fn withdrawal_needs_funds() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(150)).await?;
    app.login_alice().await?;

    assert_api_error(
        app.client
            .create_withdrawal(&bitcoin_withdrawal(dec!(150.01)))
            .await,
        StatusCode::BAD_REQUEST,
        "Insufficient balance",
    );
    assert!(app.client.list_withdrawals().await?.is_empty());

    // the whole balance is fine
    app.client
        .create_withdrawal(&bitcoin_withdrawal(dec!(150)))
        .await?;
    assert_eq!(app.balance_of("alice").await?, dec!(0));

    Ok(())
}

#[tokio::test]
async fn declined_withdrawal_is_refunded() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(500)).await?;
    app.login_alice().await?;

    let declined = app
        .client
        .create_withdrawal(&bitcoin_withdrawal(dec!(200)))
        .await?;
    let confirmed = app
        .client
        .create_withdrawal(&bitcoin_withdrawal(dec!(100)))
        .await?;
    assert_eq!(app.balance_of("alice").await?, dec!(200));

    app.login_admin().await?;
    let result = app
        .client
        .update_withdrawal(&requests::UpdateWithdrawal {
            id: declined.id.clone(),
            status: RequestStatus::Declined,
        })
        .await?;
    assert_eq!(result.status, RequestStatus::Declined);
    assert_eq!(app.balance_of("alice").await?, dec!(400));

    let result = app
        .client
        .update_withdrawal(&requests::UpdateWithdrawal {
            id: confirmed.id,
            status: RequestStatus::Confirmed,
        })
        .await?;
    assert_eq!(result.status, RequestStatus::Confirmed);
    assert_eq!(app.balance_of("alice").await?, dec!(400));

    // a second decline must not refund again
    assert_api_error(
        app.client
            .update_withdrawal(&requests::UpdateWithdrawal {
                id: declined.id,
                status: RequestStatus::Declined,
            })
            .await,
        StatusCode::BAD_REQUEST,
        "Request has already been processed",
    );
    assert_eq!(app.balance_of("alice").await?, dec!(400));

    let all = app.client.list_all_withdrawals().await?;
    assert_eq!(all.len(), 2);

    Ok(())
}

#[tokio::test]
async fn concurrent_withdrawals_never_overdraw() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(150)).await?;
    app.login_alice().await?;

    let first = bitcoin_withdrawal(dec!(100));
    let second = bitcoin_withdrawal(dec!(100));
    let (a, b) = tokio::join!(
        app.client.create_withdrawal(&first),
        app.client.create_withdrawal(&second),
    );

    let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 1);
    let failure = if a.is_err() { a } else { b };
    assert_api_error(failure, StatusCode::BAD_REQUEST, "Insufficient balance");

    assert_eq!(app.balance_of("alice").await?, dec!(50));
    assert_eq!(app.client.list_withdrawals().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn withdrawals_require_login() -> anyhow::Result<()> {
    let app = spawn_app().await;

    assert_status_code(
        app.client
            .create_withdrawal(&bitcoin_withdrawal(dec!(100)))
            .await,
        StatusCode::UNAUTHORIZED,
    );
    assert_status_code(
        app.client.list_withdrawals().await,
        StatusCode::UNAUTHORIZED,
    );

    Ok(())
}

#[tokio::test]
async fn concurrent_debits_below_the_minimum_never_overdraw()
-> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    let alice = app.create_alice_user().await?;
    app.fund(&alice_login_credentials(), dec!(100)).await?;

    // withdrawals start at $100, so go through the balance mutator itself
    let debit = || async {
        let mut tx = app.db_pool.begin().await?;
        let balance = adjust_balance_tx(
            &alice.id,
            dec!(-60),
            Precondition::ActiveAndSufficient,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok::<_, StoreError>(balance)
    };
    let (a, b) = tokio::join!(debit(), debit());

    let (ok, err) = match (a, b) {
        (Ok(balance), Err(e)) | (Err(e), Ok(balance)) => (balance, e),
        other => panic!("expected exactly one debit to succeed: {other:?}"),
    };
    assert_eq!(ok, dec!(40.00));
    assert!(matches!(err, StoreError::InsufficientBalance));
    assert_eq!(app.balance_of("alice").await?, dec!(40.00));

    Ok(())
}
