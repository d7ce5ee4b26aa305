use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, put, web};
use payloads::{InvestmentId, requests, responses};
use sqlx::PgPool;

use crate::email::templates;
use crate::notify::Notifier;
use crate::store::{StoreTimeout, investment};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success, username_for};

#[tracing::instrument(
    skip(user, pool, time_source, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/invest/{plan}")]
pub async fn create_investment(
    user: Option<Identity>,
    plan: web::Path<String>,
    details: web::Json<requests::CreateInvestment>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let investment = timeout
        .run(investment::create_investment(
            &user_id,
            &plan,
            details.amount,
            &time_source,
            &pool,
        ))
        .await?;
    notifier.notify(
        user_id,
        templates::investment_started(
            &investment.plan_name,
            investment.amount,
            investment.payout_amount,
        ),
    );
    let username = username_for(&user_id, &pool, &timeout).await;
    notifier.announce(format!(
        "New investment: {username} invested ${} in {}",
        investment.amount, investment.plan_name
    ));
    Ok(success(
        "Investment created",
        responses::Investment::from(investment),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/invest")]
pub async fn list_investments(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let investments = timeout
        .run(investment::list_user_investments(&user_id, &pool))
        .await?;
    Ok(success(
        "Investments",
        investments
            .into_iter()
            .map(responses::Investment::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/admin/invest")]
pub async fn list_all_investments(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let investments = timeout
        .run(investment::list_all_investments(&pool))
        .await?;
    Ok(success(
        "Investments",
        investments
            .into_iter()
            .map(responses::Investment::from)
            .collect::<Vec<_>>(),
    ))
}

/// Pay an investment out now, whether or not it has matured. Calling this
/// on a completed investment changes nothing.
#[tracing::instrument(
    skip(user, pool, time_source, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[put("/invest/{id}")]
pub async fn payout_investment(
    user: Option<Identity>,
    id: web::Path<String>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let id = InvestmentId(id.into_inner());
    let mut payout = timeout
        .run(investment::payout_investment(&id, &time_source, &pool))
        .await?;
    payout.pay_referral(*timeout.get_ref(), &pool).await;
    notifier.investment_paid(&payout);
    let message = match payout.outcome {
        responses::PayoutOutcome::Paid => "Investment paid out",
        responses::PayoutOutcome::AlreadyCompleted => {
            "Investment was already paid out"
        }
    };
    Ok(success(
        message,
        responses::PayoutReport {
            outcome: payout.outcome,
            investment: payout.investment.into(),
        },
    ))
}
