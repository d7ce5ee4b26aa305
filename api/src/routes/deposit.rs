use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, put, web};
use payloads::{requests, responses};
use sqlx::PgPool;

use crate::email::templates;
use crate::notify::Notifier;
use crate::store::{StoreTimeout, deposit};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success};

#[tracing::instrument(
    skip(user, pool, time_source, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/deposit")]
pub async fn create_deposit(
    user: Option<Identity>,
    details: web::Json<requests::CreateDeposit>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let deposit = timeout
        .run(deposit::create_deposit(&user_id, &details, &time_source, &pool))
        .await?;
    notifier.announce(format!(
        "New deposit request: {} deposited ${} via {} (tx {})",
        deposit.username, deposit.amount, deposit.method, deposit.transaction_id
    ));
    Ok(success(
        "Deposit request received",
        responses::Deposit::from(deposit),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/deposit")]
pub async fn list_deposits(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let deposits = timeout
        .run(deposit::list_user_deposits(&user_id, &pool))
        .await?;
    Ok(success(
        "Deposits",
        deposits
            .into_iter()
            .map(responses::Deposit::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/admin/deposit")]
pub async fn list_all_deposits(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let deposits = timeout.run(deposit::list_all_deposits(&pool)).await?;
    Ok(success(
        "Deposits",
        deposits
            .into_iter()
            .map(responses::Deposit::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[put("/deposit")]
pub async fn review_deposit(
    user: Option<Identity>,
    details: web::Json<requests::UpdateDeposit>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let deposit = timeout
        .run(deposit::review_deposit(&details.id, details.status, &pool))
        .await?;
    notifier.notify(
        deposit.user_id,
        templates::deposit_reviewed(deposit.amount, deposit.status),
    );
    Ok(success(
        &format!("Deposit {}", deposit.status),
        responses::Deposit::from(deposit),
    ))
}
