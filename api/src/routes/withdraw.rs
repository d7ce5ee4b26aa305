use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, put, web};
use payloads::{requests, responses};
use sqlx::PgPool;

use crate::email::templates;
use crate::notify::Notifier;
use crate::store::{StoreTimeout, withdrawal};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success};

#[tracing::instrument(
    skip(user, pool, time_source, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/withdraw")]
pub async fn create_withdrawal(
    user: Option<Identity>,
    details: web::Json<requests::CreateWithdrawal>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let withdrawal = timeout
        .run(withdrawal::create_withdrawal(
            &user_id,
            &details,
            &time_source,
            &pool,
        ))
        .await?;
    notifier.notify(
        user_id,
        templates::withdrawal_requested(withdrawal.amount, &withdrawal.method),
    );
    notifier.announce(format!(
        "New withdrawal request: {} requested ${} via {} to {}",
        withdrawal.username,
        withdrawal.amount,
        withdrawal.method,
        withdrawal.address
    ));
    Ok(success(
        "Withdrawal request received",
        responses::Withdrawal::from(withdrawal),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/withdraw")]
pub async fn list_withdrawals(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let withdrawals = timeout
        .run(withdrawal::list_user_withdrawals(&user_id, &pool))
        .await?;
    Ok(success(
        "Withdrawals",
        withdrawals
            .into_iter()
            .map(responses::Withdrawal::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/admin/withdraw")]
pub async fn list_all_withdrawals(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let withdrawals =
        timeout.run(withdrawal::list_all_withdrawals(&pool)).await?;
    Ok(success(
        "Withdrawals",
        withdrawals
            .into_iter()
            .map(responses::Withdrawal::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[put("/withdraw")]
pub async fn review_withdrawal(
    user: Option<Identity>,
    details: web::Json<requests::UpdateWithdrawal>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let withdrawal = timeout
        .run(withdrawal::review_withdrawal(
            &details.id,
            details.status,
            &pool,
        ))
        .await?;
    notifier.notify(
        withdrawal.user_id,
        templates::withdrawal_reviewed(withdrawal.amount, withdrawal.status),
    );
    Ok(success(
        &format!("Withdrawal {}", withdrawal.status),
        responses::Withdrawal::from(withdrawal),
    ))
}
