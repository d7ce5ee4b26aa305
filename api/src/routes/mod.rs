pub mod account;
pub mod deposit;
pub mod invest;
pub mod plan;
pub mod purchase;
pub mod summary;
pub mod withdraw;

use actix_identity::Identity;
use actix_web::{
    HttpResponse, ResponseError, body::BoxBody, dev::HttpServiceFactory, get,
    http::StatusCode, web,
};
use payloads::responses::{Envelope, SYSTEM_ERROR_MESSAGE};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{self, StoreError, StoreTimeout};

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(account::create_account)
        .service(account::login)
        .service(account::logout)
        .service(account::user_profile)
        .service(account::update_account)
        .service(deposit::create_deposit)
        .service(deposit::list_deposits)
        .service(deposit::list_all_deposits)
        .service(deposit::review_deposit)
        .service(withdraw::create_withdrawal)
        .service(withdraw::list_withdrawals)
        .service(withdraw::list_all_withdrawals)
        .service(withdraw::review_withdrawal)
        .service(plan::list_plans)
        .service(plan::get_plan)
        .service(plan::create_plan)
        .service(plan::update_plan)
        .service(plan::delete_plan)
        .service(invest::create_investment)
        .service(invest::list_investments)
        .service(invest::list_all_investments)
        .service(invest::payout_investment)
        .service(purchase::list_bots)
        .service(purchase::create_bot)
        .service(purchase::buy_bot)
        .service(purchase::list_purchases)
        .service(summary::totals)
        .service(summary::referral_earnings)
}

/// Malformed request bodies get the same error envelope as every other
/// failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        APIError::BadRequest(anyhow::anyhow!("Invalid request body: {err}"))
            .into()
    })
}

#[get("/health_check")]
pub async fn health_check() -> HttpResponse {
    success("healthy", ())
}

/// A 200 response with the data wrapped in a success envelope.
pub fn success<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::success(message, data))
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Admin access required")]
    Forbidden(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error("Not found")]
    NotFound(#[source] anyhow::Error),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let message = match self {
            Self::AuthError(e)
            | Self::Forbidden(e)
            | Self::BadRequest(e)
            | Self::NotFound(e) => e.to_string(),
            // internal details stay in the logs
            Self::UnexpectedError(e) => {
                tracing::error!("{e:#}");
                SYSTEM_ERROR_MESSAGE.to_string()
            }
        };
        HttpResponse::build(self.status_code())
            .json(Envelope::<()>::error(message))
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(_)
            | StoreError::Timeout(_)
            | StoreError::UnexpectedError(_)
            | StoreError::ReferralCodeCollision => {
                APIError::UnexpectedError(e.into())
            }
            StoreError::AccountNotFound
            | StoreError::PlanNotFound
            | StoreError::BotNotFound
            | StoreError::DepositNotFound
            | StoreError::WithdrawalNotFound
            | StoreError::InvestmentNotFound
            | StoreError::PurchaseNotFound => APIError::NotFound(e.into()),
            _ => APIError::BadRequest(e.into()),
        }
    }
}

fn get_user_id(user: &Option<Identity>) -> Result<payloads::UserId, APIError> {
    let user = user.as_ref().ok_or_else(|| {
        APIError::AuthError(anyhow::anyhow!("Not logged in"))
    })?;
    let id_str = user.id().map_err(|e| {
        APIError::AuthError(
            anyhow::Error::from(e).context("Invalid login session"),
        )
    })?;
    // special case: since this is used in so many routes, the user_id is
    // recorded here, but attaches to the span for the api route itself
    tracing::Span::current()
        .record("user_id", tracing::field::display(&id_str));
    Ok(payloads::UserId(
        Uuid::parse_str(&id_str).map_err(anyhow::Error::from)?,
    ))
}

/// Resolve the session to an account with admin rights.
async fn get_admin_id(
    user: &Option<Identity>,
    pool: &PgPool,
    timeout: &StoreTimeout,
) -> Result<payloads::UserId, APIError> {
    let user_id = get_user_id(user)?;
    let account = match timeout.run(store::read_user(pool, &user_id)).await {
        Ok(account) => account,
        // a session for an account that no longer exists
        Err(StoreError::AccountNotFound) => {
            return Err(APIError::AuthError(anyhow::anyhow!(
                "Account no longer exists"
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if !account.is_admin {
        return Err(APIError::Forbidden(anyhow::anyhow!(
            "Admin access required"
        )));
    }
    Ok(user_id)
}

/// Username for chat announcements, falling back to the account id.
async fn username_for(
    user_id: &payloads::UserId,
    pool: &PgPool,
    timeout: &StoreTimeout,
) -> String {
    timeout
        .run(store::read_user(pool, user_id))
        .await
        .map(|account| account.username)
        .unwrap_or_else(|_| user_id.to_string())
}
