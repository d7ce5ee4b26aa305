//! Database store module for the ledger API
//!
//! ## Design Decisions
//!
//! ### Balances
//! - **Single source of truth**: `users.balance` is the only balance. Ledger
//!   tables (`deposits`, `withdrawals`, `investments`, `purchases`) are an
//!   audit trail and are never summed to derive it.
//! - **Serialized mutation**: every change goes through
//!   [`balance::adjust_balance_tx`], which locks the account row with
//!   `SELECT ... FOR UPDATE` inside the caller's transaction. A
//!   `CHECK (balance >= 0)` constraint backs this up.
//! - **Lock order**: when an operation touches a ledger row and an account,
//!   the ledger row is locked first.
//!
//! ### Identifiers
//! - Ledger rows have an internal `key` uuid and an external `id`, a random
//!   16 character hex token that is what clients see.
//! - Accounts hand out a 9 character alphanumeric referral code.
//!
//! ### Time Source Dependency
//! - Functions that stamp rows or compute maturity take a `TimeSource` so
//!   tests can drive time by hand.
//! - `updated_at` columns are maintained by database triggers.

use anyhow::Context;
use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{AccountStatus, ReferralCode, UserId, requests, responses};
use rand_core::{OsRng, RngCore};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::future::Future;
use std::time::Duration;

use crate::commission::{InvalidPercent, Percent};
use crate::time::TimeSource;

pub mod balance;
pub mod deposit;
pub mod investment;
pub mod purchase;
pub mod referral;
pub mod summary;
pub mod withdrawal;

/// Upper bound for plan and bot durations (ten years).
pub const MAX_DURATION_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

const REFERRAL_CODE_LEN: usize = 9;
const REFERRAL_CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A complete user row that stays in the backend.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub balance: Decimal,
    pub referral_code: ReferralCode,
    pub referred_by: Option<ReferralCode>,
    pub status: AccountStatus,
    pub is_admin: bool,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
}

impl From<User> for responses::UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            balance: user.balance,
            referral_code: user.referral_code,
            referred_by: user.referred_by,
            status: user.status,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Plan {
    pub name: String,
    pub min: Decimal,
    pub max: Decimal,
    pub profit_percent: String,
    pub commission_percent: String,
    pub duration_seconds: i64,
}

impl Plan {
    pub fn profit_percent(&self) -> Percent {
        Percent::from_stored(self.profit_percent.clone())
    }

    pub fn commission_percent(&self) -> Percent {
        Percent::from_stored(self.commission_percent.clone())
    }
}

impl From<Plan> for responses::Plan {
    fn from(plan: Plan) -> Self {
        Self {
            name: plan.name,
            terms: requests::PlanTerms {
                min: plan.min,
                max: plan.max,
                profit_percent: plan.profit_percent,
                commission_percent: plan.commission_percent,
                duration_seconds: plan.duration_seconds,
            },
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Bot {
    pub name: String,
    pub price: Decimal,
    pub commission_percent: String,
    pub duration_seconds: i64,
}

impl Bot {
    pub fn commission_percent(&self) -> Percent {
        Percent::from_stored(self.commission_percent.clone())
    }
}

impl From<Bot> for responses::Bot {
    fn from(bot: Bot) -> Self {
        Self {
            name: bot.name,
            price: bot.price,
            commission_percent: bot.commission_percent,
            duration_seconds: bot.duration_seconds,
        }
    }
}

/// Bound on how long a single store operation may take.
///
/// Dropping the future on timeout drops any open transaction with it, which
/// rolls it back.
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeout(pub Duration);

impl StoreTimeout {
    pub async fn run<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.0, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.0))?
    }
}

/// A random 16 character hex token used as the external id of ledger rows.
pub(crate) fn new_entry_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A random alphanumeric referral code.
pub(crate) fn new_referral_code() -> ReferralCode {
    // rejection sampling keeps the distribution uniform over the alphabet
    let limit = (u8::MAX as usize / REFERRAL_CODE_ALPHABET.len())
        * REFERRAL_CODE_ALPHABET.len();
    let mut code = String::with_capacity(REFERRAL_CODE_LEN);
    let mut buf = [0u8; 32];
    while code.len() < REFERRAL_CODE_LEN {
        OsRng.fill_bytes(&mut buf);
        for byte in buf {
            if (byte as usize) < limit && code.len() < REFERRAL_CODE_LEN {
                let index = byte as usize % REFERRAL_CODE_ALPHABET.len();
                code.push(REFERRAL_CODE_ALPHABET[index] as char);
            }
        }
    }
    ReferralCode(code)
}

/// Check a requested money amount: positive and in whole cents. The amount
/// is used exactly as submitted.
pub(crate) fn positive_amount(amount: Decimal) -> Result<Decimal, StoreError> {
    if amount <= Decimal::ZERO {
        return Err(StoreError::AmountMustBePositive);
    }
    check_cents(amount)?;
    Ok(amount)
}

fn check_cents(amount: Decimal) -> Result<(), StoreError> {
    if amount.normalize().scale() > 2 {
        return Err(StoreError::SubCentAmount);
    }
    Ok(())
}

fn check_len(value: &str, max: usize) -> Result<(), StoreError> {
    if value.len() > max {
        return Err(StoreError::FieldTooLong);
    }
    Ok(())
}

fn check_duration(duration_seconds: i64) -> Result<(), StoreError> {
    if duration_seconds <= 0 || duration_seconds > MAX_DURATION_SECONDS {
        return Err(StoreError::InvalidDuration);
    }
    Ok(())
}

/// When an entry created now with the given duration matures.
pub(crate) fn maturity(
    time_source: &TimeSource,
    duration_seconds: i64,
) -> Result<Timestamp, StoreError> {
    time_source
        .now()
        .checked_add(jiff::SignedDuration::from_secs(duration_seconds))
        .map_err(|_| StoreError::InvalidDuration)
}

#[tracing::instrument(skip(pool, password_hash, time_source))]
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    referred_by: Option<&ReferralCode>,
    time_source: &TimeSource,
) -> Result<User, StoreError> {
    check_len(username, requests::USERNAME_MAX_LEN)?;
    check_len(email, requests::EMAIL_MAX_LEN)?;

    if let Some(code) = referred_by {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)",
        )
        .bind(code)
        .fetch_one(pool)
        .await?;
        if !exists {
            return Err(StoreError::ReferralCodeNotFound);
        }
    }

    // A freshly generated code can collide with an existing one; try again
    // with a new code a few times before giving up.
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (
                    username,
                    email,
                    password_hash,
                    referral_code,
                    referred_by,
                    created_at,
                    updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                RETURNING *;",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(new_referral_code())
        .bind(referred_by)
        .bind(time_source.now().to_sqlx())
        .fetch_one(pool)
        .await;
        match result {
            Ok(user) => return Ok(user),
            Err(e) => match map_user_unique_error(e) {
                StoreError::ReferralCodeCollision if attempts < 5 => continue,
                e => return Err(e),
            },
        }
    }
}

/// Turn unique violations on the users table into specific errors.
fn map_user_unique_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e
        && db_err.is_unique_violation()
    {
        match db_err.constraint() {
            Some("users_username_unique") => return StoreError::UsernameTaken,
            Some("users_email_unique") => return StoreError::EmailTaken,
            Some("users_referral_code_unique") => {
                return StoreError::ReferralCodeCollision;
            }
            _ => {}
        }
    }
    e.into()
}

pub async fn read_user(pool: &PgPool, id: &UserId) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1;")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::AccountNotFound)
}

pub async fn get_user_by_username(
    username: &str,
    pool: &PgPool,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1;")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::AccountNotFound)
}

/// Admin update of an account's status and referrer.
///
/// Changing `referred_by` only affects entries created afterwards; existing
/// investments and purchases keep the referral code they were created with.
#[tracing::instrument(skip(pool))]
pub async fn update_account(
    username: &str,
    update: &requests::UpdateAccount,
    pool: &PgPool,
) -> Result<User, StoreError> {
    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = $1 FOR UPDATE",
    )
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::AccountNotFound)?;

    let referred_by = if update.clear_referral {
        None
    } else if let Some(code) = &update.referred_by {
        let code = ReferralCode(code.trim().to_string());
        if code == user.referral_code {
            return Err(StoreError::SelfReferral);
        }
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)",
        )
        .bind(&code)
        .fetch_one(&mut *tx)
        .await?;
        if !exists {
            return Err(StoreError::ReferralCodeNotFound);
        }
        Some(code)
    } else {
        user.referred_by.clone()
    };

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET status = $1, referred_by = $2
        WHERE id = $3
        RETURNING *",
    )
    .bind(update.status.unwrap_or(user.status))
    .bind(referred_by)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(user)
}

/// Number of accounts that registered with (or were assigned) this referral
/// code.
pub async fn count_referred_accounts(
    referral_code: &ReferralCode,
    pool: &PgPool,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE referred_by = $1",
    )
    .bind(referral_code)
    .fetch_one(pool)
    .await?)
}

fn validate_plan_terms(terms: &requests::PlanTerms) -> Result<(), StoreError> {
    terms.profit_percent.parse::<Percent>()?;
    terms.commission_percent.parse::<Percent>()?;
    if terms.min <= Decimal::ZERO || terms.max < terms.min {
        return Err(StoreError::InvalidPlanLimits);
    }
    check_cents(terms.min)?;
    check_cents(terms.max)?;
    check_duration(terms.duration_seconds)
}

pub async fn list_plans(pool: &PgPool) -> Result<Vec<Plan>, StoreError> {
    Ok(
        sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY min, name")
            .fetch_all(pool)
            .await?,
    )
}

pub async fn get_plan(name: &str, pool: &PgPool) -> Result<Plan, StoreError> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::PlanNotFound)
}

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_plan(
    details: &requests::CreatePlan,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Plan, StoreError> {
    let name = details.name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    check_len(name, requests::NAME_MAX_LEN)?;
    validate_plan_terms(&details.terms)?;
    let terms = &details.terms;
    sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (
                name,
                min,
                max,
                profit_percent,
                commission_percent,
                duration_seconds,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *",
    )
    .bind(name)
    .bind(terms.min)
    .bind(terms.max)
    .bind(terms.profit_percent.trim())
    .bind(terms.commission_percent.trim())
    .bind(terms.duration_seconds)
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await
    .map_err(|e| match StoreError::from(e) {
        StoreError::NotUnique(_) => StoreError::PlanExists,
        e => e,
    })
}

/// Replace a plan's terms. Plans that any investment references are frozen.
#[tracing::instrument(skip(pool))]
pub async fn update_plan(
    name: &str,
    terms: &requests::PlanTerms,
    pool: &PgPool,
) -> Result<Plan, StoreError> {
    validate_plan_terms(terms)?;
    let mut tx = pool.begin().await?;
    lock_unreferenced_plan_tx(name, &mut tx).await?;
    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans
        SET min = $1,
            max = $2,
            profit_percent = $3,
            commission_percent = $4,
            duration_seconds = $5
        WHERE name = $6
        RETURNING *",
    )
    .bind(terms.min)
    .bind(terms.max)
    .bind(terms.profit_percent.trim())
    .bind(terms.commission_percent.trim())
    .bind(terms.duration_seconds)
    .bind(name)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(plan)
}

#[tracing::instrument(skip(pool))]
pub async fn delete_plan(name: &str, pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    lock_unreferenced_plan_tx(name, &mut tx).await?;
    sqlx::query("DELETE FROM plans WHERE name = $1")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Lock a plan row for writing, failing if it doesn't exist or has
/// investments.
///
/// Investments take `FOR SHARE` on the plan while being created, so no
/// investment can slip in between this check and the write.
async fn lock_unreferenced_plan_tx(
    name: &str,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<(), StoreError> {
    sqlx::query("SELECT 1 FROM plans WHERE name = $1 FOR UPDATE")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::PlanNotFound)?;
    let in_use = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM investments WHERE plan_name = $1)",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;
    if in_use {
        return Err(StoreError::PlanInUse);
    }
    Ok(())
}

pub async fn list_bots(pool: &PgPool) -> Result<Vec<Bot>, StoreError> {
    Ok(
        sqlx::query_as::<_, Bot>("SELECT * FROM bots ORDER BY price, name")
            .fetch_all(pool)
            .await?,
    )
}

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_bot(
    details: &requests::CreateBot,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Bot, StoreError> {
    let name = details.name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    check_len(name, requests::NAME_MAX_LEN)?;
    details.commission_percent.parse::<Percent>()?;
    check_duration(details.duration_seconds)?;
    let price = positive_amount(details.price)?;
    sqlx::query_as::<_, Bot>(
        "INSERT INTO bots (
                name,
                price,
                commission_percent,
                duration_seconds,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *",
    )
    .bind(name)
    .bind(price)
    .bind(details.commission_percent.trim())
    .bind(details.duration_seconds)
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await
    .map_err(|e| match StoreError::from(e) {
        StoreError::NotUnique(_) => StoreError::BotExists,
        e => e,
    })
}

/// Persist a user-facing notification.
pub async fn create_notification(
    user_id: &UserId,
    subject: &str,
    message: &str,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO notifications (user_id, subject, message, created_at)
        VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(subject)
    .bind(message)
    .bind(time_source.now().to_sqlx())
    .execute(pool)
    .await
    .context("Failed to insert notification")?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Field too long")]
    FieldTooLong,
    #[error("Name must not be empty")]
    EmptyName,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Email is already registered")]
    EmailTaken,
    #[error("Referral code collision")]
    ReferralCodeCollision,
    #[error("Referral code not found")]
    ReferralCodeNotFound,
    #[error("An account cannot refer itself")]
    SelfReferral,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is deactivated")]
    AccountInactive,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Amount must be positive")]
    AmountMustBePositive,
    #[error("Amounts can have at most 2 decimal places")]
    SubCentAmount,
    #[error("Minimum withdrawal is ${minimum}")]
    BelowMinimumWithdrawal { minimum: Decimal },
    #[error("Amount must be between ${min} and ${max} for this plan")]
    AmountOutsidePlanLimits { min: Decimal, max: Decimal },
    #[error(transparent)]
    InvalidPercent(#[from] InvalidPercent),
    #[error("Plan minimum must be positive and no greater than its maximum")]
    InvalidPlanLimits,
    #[error("Duration must be between 1 second and 10 years")]
    InvalidDuration,
    #[error("Plan not found")]
    PlanNotFound,
    #[error("A plan with this name already exists")]
    PlanExists,
    #[error("Plan has investments and can no longer be changed")]
    PlanInUse,
    #[error("Bot not found")]
    BotNotFound,
    #[error("A bot with this name already exists")]
    BotExists,
    #[error("Deposit not found")]
    DepositNotFound,
    #[error("Withdrawal not found")]
    WithdrawalNotFound,
    #[error("Investment not found")]
    InvestmentNotFound,
    #[error("Purchase not found")]
    PurchaseNotFound,
    #[error("Request has already been processed")]
    EntryAlreadyProcessed,
    #[error("Requests can only be confirmed or declined")]
    InvalidStatusTransition,
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unique constraint violation")]
    NotUnique(#[source] sqlx::Error),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::NotUnique(e);
        }
        StoreError::Database(e)
    }
}
