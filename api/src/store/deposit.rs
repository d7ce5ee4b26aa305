//! Deposit requests: created pending by the account owner, then confirmed
//! (crediting the amount) or declined by an admin, once.

use jiff::civil::{Date, Time};
use jiff_sqlx::ToSqlx;
use payloads::{DepositId, RequestStatus, UserId, requests, responses};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::balance::{Precondition, adjust_balance_tx};
use super::{StoreError, check_len, new_entry_id, positive_amount};
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub username: String,
    pub method: String,
    pub amount: Decimal,
    pub transaction_id: String,
    pub status: RequestStatus,
    #[sqlx(try_from = "jiff_sqlx::Date")]
    pub created_date: Date,
    #[sqlx(try_from = "jiff_sqlx::Time")]
    pub created_time: Time,
}

impl From<Deposit> for responses::Deposit {
    fn from(deposit: Deposit) -> Self {
        Self {
            id: deposit.id,
            user_id: deposit.user_id,
            username: deposit.username,
            method: deposit.method,
            amount: deposit.amount,
            transaction_id: deposit.transaction_id,
            status: deposit.status,
            created_date: deposit.created_date,
            created_time: deposit.created_time,
        }
    }
}

const SELECT_DEPOSITS: &str = "SELECT d.id, d.user_id, u.username, d.method,
        d.amount, d.transaction_id, d.status, d.created_date, d.created_time
    FROM deposits d
    JOIN users u ON u.id = d.user_id";

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_deposit(
    user_id: &UserId,
    details: &requests::CreateDeposit,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Deposit, StoreError> {
    let amount = positive_amount(details.amount)?;
    check_len(&details.method, requests::FIELD_MAX_LEN)?;
    check_len(&details.transaction_id, requests::FIELD_MAX_LEN)?;

    let (created_date, created_time) = time_source.ledger_stamp();
    sqlx::query_as::<_, Deposit>(
        "WITH d AS (
            INSERT INTO deposits (
                id,
                user_id,
                method,
                amount,
                transaction_id,
                created_date,
                created_time
            )
            SELECT $1, id, $3, $4, $5, $6, $7 FROM users WHERE id = $2
            RETURNING *
        )
        SELECT d.id, d.user_id, u.username, d.method, d.amount,
            d.transaction_id, d.status, d.created_date, d.created_time
        FROM d
        JOIN users u ON u.id = d.user_id",
    )
    .bind(new_entry_id())
    .bind(user_id)
    .bind(details.method.trim())
    .bind(amount)
    .bind(details.transaction_id.trim())
    .bind(created_date.to_sqlx())
    .bind(created_time.to_sqlx())
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::AccountNotFound)
}

pub async fn list_user_deposits(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<Deposit>, StoreError> {
    Ok(sqlx::query_as::<_, Deposit>(&format!(
        "{SELECT_DEPOSITS} WHERE d.user_id = $1
        ORDER BY d.created_date DESC, d.created_time DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn list_all_deposits(
    pool: &PgPool,
) -> Result<Vec<Deposit>, StoreError> {
    Ok(sqlx::query_as::<_, Deposit>(&format!(
        "{SELECT_DEPOSITS} ORDER BY d.created_date DESC, d.created_time DESC"
    ))
    .fetch_all(pool)
    .await?)
}

/// Resolve a pending deposit. Confirming credits the owner's balance.
#[tracing::instrument(skip(pool))]
pub async fn review_deposit(
    id: &DepositId,
    status: RequestStatus,
    pool: &PgPool,
) -> Result<Deposit, StoreError> {
    if status == RequestStatus::Pending {
        return Err(StoreError::InvalidStatusTransition);
    }
    let mut tx = pool.begin().await?;

    let (user_id, amount, current) =
        sqlx::query_as::<_, (UserId, Decimal, RequestStatus)>(
            "SELECT user_id, amount, status FROM deposits
            WHERE id = $1
            FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::DepositNotFound)?;
    if current != RequestStatus::Pending {
        return Err(StoreError::EntryAlreadyProcessed);
    }

    sqlx::query("UPDATE deposits SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if status == RequestStatus::Confirmed {
        adjust_balance_tx(&user_id, amount, Precondition::None, &mut tx)
            .await?;
    }

    let deposit = sqlx::query_as::<_, Deposit>(&format!(
        "{SELECT_DEPOSITS} WHERE d.id = $1"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(deposit)
}
