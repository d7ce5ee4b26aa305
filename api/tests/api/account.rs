use payloads::{AccountStatus, requests};
use reqwest::StatusCode;
use rust_decimal::{Decimal, dec};

use test_helpers::{
    assert_api_error, assert_status_code, bob_login_credentials, spawn_app,
};

#[tokio::test]
async fn create_account() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let created = app.create_alice_user().await?;
    assert_eq!(created.username, "alice");
    assert_eq!(created.balance, Decimal::ZERO);
    assert_eq!(created.status, AccountStatus::Active);
    assert!(!created.is_admin);
    assert_eq!(created.referred_by, None);
    assert_eq!(created.referral_code.0.len(), 9);
    assert!(created.referral_code.0.chars().all(|c| c.is_ascii_alphanumeric()));

    // the session is live
    let profile = app.client.user_profile().await?;
    assert_eq!(profile, created);

    Ok(())
}

#[tokio::test]
async fn login_refused() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let body = requests::LoginCredentials {
        username: "random".into(),
        password: "random".into(),
    };
    let result = app.client.login(&body).await;
    assert_api_error(result, StatusCode::UNAUTHORIZED, "Invalid credentials");

    // no session was started
    assert_status_code(app.client.user_profile().await, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn wrong_password_refused() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_alice_user().await?;
    app.client.logout().await?;

    let body = requests::LoginCredentials {
        username: "alice".into(),
        password: "not-her-password".into(),
    };
    assert_status_code(app.client.login(&body).await, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn logout_ends_session() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_alice_user().await?;

    app.client.logout().await?;
    assert_status_code(app.client.user_profile().await, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn duplicate_username_and_email_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_alice_user().await?;

    let mut body = test_helpers::alice_credentials();
    body.email = "someone-else@example.com".into();
    assert_api_error(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
        "Username is already taken",
    );

    let mut body = test_helpers::alice_credentials();
    body.username = "alice2".into();
    assert_api_error(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
        "Email is already registered",
    );

    Ok(())
}

#[tokio::test]
async fn invalid_registration_details_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let mut body = test_helpers::alice_credentials();
    body.username = (0..52).map(|_| "x").collect();
    assert_status_code(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
    );

    let mut body = test_helpers::alice_credentials();
    body.username = "1alice".into();
    assert_status_code(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
    );

    let mut body = test_helpers::alice_credentials();
    body.email = "not-an-email".into();
    assert_api_error(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
        "Invalid email address",
    );

    Ok(())
}

#[tokio::test]
async fn register_with_referral_code() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let alice = app.create_alice_user().await?;

    let bob = app.create_bob_user(Some(&alice.referral_code)).await?;
    assert_ne!(bob.referral_code, alice.referral_code);
    assert_eq!(bob.referred_by, Some(alice.referral_code));

    Ok(())
}

#[tokio::test]
async fn unknown_referral_code_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let body = requests::CreateAccount {
        referral_code: Some("NoSuchCde".into()),
        ..test_helpers::bob_credentials()
    };
    assert_api_error(
        app.client.create_account(&body).await,
        StatusCode::BAD_REQUEST,
        "Referral code not found",
    );

    Ok(())
}

#[tokio::test]
async fn admin_routes_require_admin() -> anyhow::Result<()> {
    let app = spawn_app().await;

    // no session at all
    assert_status_code(
        app.client.list_all_deposits().await,
        StatusCode::UNAUTHORIZED,
    );

    app.create_alice_user().await?;
    assert_status_code(
        app.client.list_all_deposits().await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client
            .update_account("alice", &requests::UpdateAccount::default())
            .await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client.create_plan(&test_helpers::plan_a()).await,
        StatusCode::FORBIDDEN,
    );

    Ok(())
}

#[tokio::test]
async fn deactivated_account_cannot_spend() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_bob_user(None).await?;
    app.create_admin_user().await?;
    app.fund(&bob_login_credentials(), dec!(500)).await?;

    // the admin is logged in after funding
    let updated = app
        .client
        .update_account(
            "bob",
            &requests::UpdateAccount {
                status: Some(AccountStatus::Deactivated),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.status, AccountStatus::Deactivated);

    app.login_bob().await?;
    let result = app
        .client
        .create_withdrawal(&requests::CreateWithdrawal {
            method: "bitcoin".into(),
            address: "bc1qbob".into(),
            amount: dec!(100),
        })
        .await;
    assert_api_error(result, StatusCode::BAD_REQUEST, "Account is deactivated");
    assert_eq!(app.balance_of("bob").await?, dec!(500));

    // and is told about it
    assert_eq!(app.wait_for_notifications("bob", 2).await?, 2);

    Ok(())
}

#[tokio::test]
async fn admin_cannot_make_account_refer_itself() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let alice = app.create_alice_user().await?;
    app.create_admin_user().await?;
    app.login_admin().await?;

    let result = app
        .client
        .update_account(
            "alice",
            &requests::UpdateAccount {
                referred_by: Some(alice.referral_code.0.clone()),
                ..Default::default()
            },
        )
        .await;
    assert_api_error(
        result,
        StatusCode::BAD_REQUEST,
        "An account cannot refer itself",
    );

    assert_status_code(
        app.client
            .update_account("nobody", &requests::UpdateAccount::default())
            .await,
        StatusCode::NOT_FOUND,
    );

    Ok(())
}
