use actix_identity::Identity;
use actix_web::{HttpResponse, delete, get, post, put, web};
use payloads::{requests, responses};
use sqlx::PgPool;

use crate::store::{self, StoreTimeout};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success};

#[tracing::instrument(skip(pool, timeout))]
#[get("/plan")]
pub async fn list_plans(
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let plans = timeout.run(store::list_plans(&pool)).await?;
    Ok(success(
        "Plans",
        plans
            .into_iter()
            .map(responses::Plan::from)
            .collect::<Vec<_>>(),
    ))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/plan/{name}")]
pub async fn get_plan(
    user: Option<Identity>,
    name: web::Path<String>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_user_id(&user)?;
    let plan = timeout.run(store::get_plan(&name, &pool)).await?;
    Ok(success("Plan", responses::Plan::from(plan)))
}

#[tracing::instrument(
    skip(user, pool, time_source, timeout),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[post("/plan")]
pub async fn create_plan(
    user: Option<Identity>,
    details: web::Json<requests::CreatePlan>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let plan = timeout
        .run(store::create_plan(&details, &pool, &time_source))
        .await?;
    Ok(success("Plan created", responses::Plan::from(plan)))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[put("/plan/{name}")]
pub async fn update_plan(
    user: Option<Identity>,
    name: web::Path<String>,
    terms: web::Json<requests::PlanTerms>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let plan = timeout
        .run(store::update_plan(&name, &terms, &pool))
        .await?;
    Ok(success("Plan updated", responses::Plan::from(plan)))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty),
    ret
)]
#[delete("/plan/{name}")]
pub async fn delete_plan(
    user: Option<Identity>,
    name: web::Path<String>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    timeout.run(store::delete_plan(&name, &pool)).await?;
    Ok(success("Plan deleted", ()))
}
