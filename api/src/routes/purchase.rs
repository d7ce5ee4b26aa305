use actix_identity::Identity;
use actix_web::{HttpResponse, get, post, web};
use payloads::{requests, responses};
use sqlx::PgPool;

use crate::email::templates;
use crate::notify::Notifier;
use crate::store::{self, StoreTimeout, purchase};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success, username_for};

#[tracing::instrument(skip(pool, timeout))]
#[get("/purchase")]
pub async fn list_bots(
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let bots = timeout.run(store::list_bots(&pool)).await?;
    Ok(success(
        "Bots",
        bots.into_iter().map(responses::Bot::from).collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, time_source, timeout),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/purchase")]
pub async fn create_bot(
    user: Option<Identity>,
    details: web::Json<requests::CreateBot>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let bot = timeout
        .run(store::create_bot(&details, &pool, &time_source))
        .await?;
    Ok(success("Bot created", responses::Bot::from(bot)))
}

/// Buy a bot. The referrer's commission is paid right away.
#[tracing::instrument(
    skip(user, pool, time_source, timeout, notifier),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/purchase/{name}")]
pub async fn buy_bot(
    user: Option<Identity>,
    name: web::Path<String>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let mut purchase = timeout
        .run(purchase::create_purchase(&user_id, &name, &time_source, &pool))
        .await?;
    // the buyer has paid; from here on failures are only logged
    let referral = purchase.pay_referral(*timeout.get_ref(), &pool).await;
    notifier.notify(
        user_id,
        templates::bot_purchased(&purchase.bot_name, purchase.amount),
    );
    if let Some(credit) = &referral {
        notifier.referral_credited(credit);
    }
    let username = username_for(&user_id, &pool, &timeout).await;
    notifier.announce(format!(
        "New bot purchase: {username} bought {} for ${}",
        purchase.bot_name, purchase.amount
    ));
    Ok(success("Bot purchased", responses::Purchase::from(purchase)))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/user/purchase")]
pub async fn list_purchases(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let purchases = timeout
        .run(purchase::list_user_purchases(&user_id, &pool))
        .await?;
    Ok(success(
        "Purchases",
        purchases
            .into_iter()
            .map(responses::Purchase::from)
            .collect::<Vec<_>>(),
    ))
}
