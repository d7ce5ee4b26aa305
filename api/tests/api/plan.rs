use payloads::requests;
use reqwest::StatusCode;
use rust_decimal::dec;

use test_helpers::{
    alice_login_credentials, assert_api_error, assert_status_code, plan_a,
    quick_plan, spawn_app,
};

#[tokio::test]
async fn create_and_list_plans() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;

    let starter = app.create_plan(&plan_a()).await?;
    assert_eq!(starter.name, "Starter");
    assert_eq!(starter.terms, plan_a().terms);
    app.create_plan(&quick_plan()).await?;

    // plans are public, ordered by minimum
    app.client.logout().await?;
    let plans = app.client.list_plans().await?;
    let names: Vec<_> = plans.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Quick", "Starter"]);

    // a single plan needs a session
    assert_status_code(
        app.client.get_plan("Starter").await,
        StatusCode::UNAUTHORIZED,
    );
    app.create_alice_user().await?;
    assert_eq!(app.client.get_plan("Starter").await?, starter);
    assert_api_error(
        app.client.get_plan("Platinum").await,
        StatusCode::NOT_FOUND,
        "Plan not found",
    );

    Ok(())
}

#[tokio::test]
async fn invalid_plans_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.login_admin().await?;

    let mut plan = plan_a();
    plan.terms.profit_percent = "ten".into();
    assert_api_error(
        app.client.create_plan(&plan).await,
        StatusCode::BAD_REQUEST,
        "Invalid percentage 'ten'",
    );

    let mut plan = plan_a();
    plan.terms.commission_percent = "-5%".into();
    assert_status_code(
        app.client.create_plan(&plan).await,
        StatusCode::BAD_REQUEST,
    );

    let mut plan = plan_a();
    plan.terms.min = dec!(500);
    plan.terms.max = dec!(100);
    assert_api_error(
        app.client.create_plan(&plan).await,
        StatusCode::BAD_REQUEST,
        "Plan minimum must be positive and no greater than its maximum",
    );

    let mut plan = plan_a();
    plan.terms.duration_seconds = 0;
    assert_api_error(
        app.client.create_plan(&plan).await,
        StatusCode::BAD_REQUEST,
        "Duration must be between 1 second and 10 years",
    );

    let mut plan = plan_a();
    plan.name = "   ".into();
    assert_status_code(
        app.client.create_plan(&plan).await,
        StatusCode::BAD_REQUEST,
    );

    app.client.create_plan(&plan_a()).await?;
    assert_api_error(
        app.client.create_plan(&plan_a()).await,
        StatusCode::BAD_REQUEST,
        "A plan with this name already exists",
    );

    Ok(())
}

#[tokio::test]
async fn unused_plan_can_be_edited_and_deleted() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_plan(&plan_a()).await?;

    let terms = requests::PlanTerms {
        max: dec!(5000),
        profit_percent: "12.5%".into(),
        ..plan_a().terms
    };
    let updated = app.client.update_plan("Starter", &terms).await?;
    assert_eq!(updated.terms, terms);
    assert_eq!(app.client.get_plan("Starter").await?.terms, terms);

    app.client.delete_plan("Starter").await?;
    assert_status_code(
        app.client.get_plan("Starter").await,
        StatusCode::NOT_FOUND,
    );
    assert_status_code(
        app.client.delete_plan("Starter").await,
        StatusCode::NOT_FOUND,
    );

    Ok(())
}

#[tokio::test]
async fn plan_with_investments_is_frozen() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_alice_user().await?;
    app.create_plan(&plan_a()).await?;
    app.fund(&alice_login_credentials(), dec!(200)).await?;

    app.login_alice().await?;
    app.client
        .create_investment(
            "Starter",
            &requests::CreateInvestment { amount: dec!(100) },
        )
        .await?;

    app.login_admin().await?;
    let terms = requests::PlanTerms {
        profit_percent: "50%".into(),
        ..plan_a().terms
    };
    assert_api_error(
        app.client.update_plan("Starter", &terms).await,
        StatusCode::BAD_REQUEST,
        "Plan has investments and can no longer be changed",
    );
    assert_api_error(
        app.client.delete_plan("Starter").await,
        StatusCode::BAD_REQUEST,
        "Plan has investments and can no longer be changed",
    );
    assert_eq!(app.client.get_plan("Starter").await?.terms, plan_a().terms);

    Ok(())
}

#[tokio::test]
async fn plans_are_admin_only() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_admin_user().await?;
    app.create_plan(&plan_a()).await?;
    app.create_alice_user().await?;
    app.login_alice().await?;

    assert_status_code(
        app.client.create_plan(&quick_plan()).await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client.update_plan("Starter", &quick_plan().terms).await,
        StatusCode::FORBIDDEN,
    );
    assert_status_code(
        app.client.delete_plan("Starter").await,
        StatusCode::FORBIDDEN,
    );

    Ok(())
}
