use actix_identity::Identity;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, get, post, put, web};
use payloads::{AccountStatus, requests, responses};
use sqlx::PgPool;

use crate::email::templates;
use crate::notify::Notifier;
use crate::password::{
    AuthError, Credentials, NewUserDetails, create_user, validate_credentials,
};
use crate::store::{self, StoreTimeout};
use crate::time::TimeSource;

use super::{APIError, get_admin_id, get_user_id, success};

#[tracing::instrument(
    skip(new_user_details, pool, time_source, timeout),
    fields(username=tracing::field::Empty, user_id=tracing::field::Empty)
)]
#[post("/user")]
pub async fn create_account(
    new_user_details: web::Json<NewUserDetails>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let validation = requests::validate_username(&new_user_details.username);
    if let Some(message) = validation.error_message() {
        return Err(APIError::BadRequest(anyhow::anyhow!(message)));
    }
    if !is_plausible_email(&new_user_details.email) {
        return Err(APIError::BadRequest(anyhow::anyhow!(
            "Invalid email address"
        )));
    }
    let user = timeout
        .run(create_user(new_user_details.0, &pool, &time_source))
        .await?;
    Ok(success(
        "Account created",
        responses::UserProfile::from(user),
    ))
}

/// Something@something.tld, without whitespace.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

#[tracing::instrument(
    skip(credentials, pool),
    fields(username=tracing::field::Empty, user_id=tracing::field::Empty)
)]
#[post("/user/login")]
pub async fn login(
    request: HttpRequest,
    credentials: web::Json<Credentials>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    tracing::Span::current()
        .record("username", tracing::field::display(&credentials.username));
    match validate_credentials(credentials.0, &pool).await {
        Ok(user_id) => {
            tracing::Span::current()
                .record("user_id", tracing::field::display(&user_id));
            Identity::login(&request.extensions(), user_id.to_string())
                .map_err(|e| APIError::UnexpectedError(e.into()))?;
            Ok(success("Logged in", ()))
        }
        Err(e) => Err(match e {
            AuthError::InvalidCredentials(_) => APIError::AuthError(e.into()),
            AuthError::UnexpectedError(_) => {
                APIError::UnexpectedError(e.into())
            }
        }),
    }
}

#[tracing::instrument(skip(user), fields(user_id=tracing::field::Empty))]
#[post("/user/logout")]
pub async fn logout(user: Option<Identity>) -> Result<HttpResponse, APIError> {
    get_user_id(&user)?;
    if let Some(user) = user {
        user.logout();
    }
    Ok(success("Logged out", ()))
}

#[tracing::instrument(
    skip(user, pool, timeout),
    fields(user_id=tracing::field::Empty)
)]
#[get("/user")]
pub async fn user_profile(
    user: Option<Identity>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let account = timeout.run(store::read_user(&pool, &user_id)).await?;
    Ok(success("Profile", responses::UserProfile::from(account)))
}

#[tracing::instrument(
    skip(user, pool, timeout, notifier),
    fields(user_id=tracing::field::Empty)
)]
#[put("/admin/user/{username}")]
pub async fn update_account(
    user: Option<Identity>,
    username: web::Path<String>,
    update: web::Json<requests::UpdateAccount>,
    pool: web::Data<PgPool>,
    timeout: web::Data<StoreTimeout>,
    notifier: web::Data<Notifier>,
) -> Result<HttpResponse, APIError> {
    get_admin_id(&user, &pool, &timeout).await?;
    let before = timeout
        .run(store::get_user_by_username(&username, &pool))
        .await?;
    let account = timeout
        .run(store::update_account(&username, &update, &pool))
        .await?;
    if before.status == AccountStatus::Active
        && account.status == AccountStatus::Deactivated
    {
        notifier.notify(account.id, templates::account_deactivated());
    }
    Ok(success("Account updated", responses::UserProfile::from(account)))
}
