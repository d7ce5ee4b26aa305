use actix_identity::Identity;
use actix_web::{HttpResponse, get, web};
use sqlx::PgPool;

use crate::store::{StoreTimeout, summary};

use super::{APIError, get_user_id, success};

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/total")]
pub async fn totals(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let totals = timeout.run(summary::totals(&user_id, &pool)).await?;
    Ok(success("Totals", totals))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/referral")]
pub async fn referral_earnings(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let earnings = timeout
        .run(summary::referral_earnings(&user_id, &pool))
        .await?;
    Ok(success("Referral earnings", earnings))
}
