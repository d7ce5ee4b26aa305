//! Withdrawal requests.
//!
//! The amount leaves the balance when the request is made, so a pending
//! withdrawal can't be spent twice. An admin then confirms it, or declines
//! it and the amount is refunded.

use jiff::civil::{Date, Time};
use jiff_sqlx::ToSqlx;
use payloads::{RequestStatus, UserId, WithdrawalId, requests, responses};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::balance::{Precondition, adjust_balance_tx};
use super::{StoreError, check_len, new_entry_id, positive_amount};
use crate::time::TimeSource;

pub const MIN_WITHDRAWAL: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, FromRow)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub username: String,
    pub method: String,
    pub address: String,
    pub amount: Decimal,
    pub status: RequestStatus,
    #[sqlx(try_from = "jiff_sqlx::Date")]
    pub created_date: Date,
    #[sqlx(try_from = "jiff_sqlx::Time")]
    pub created_time: Time,
}

impl From<Withdrawal> for responses::Withdrawal {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            id: withdrawal.id,
            user_id: withdrawal.user_id,
            username: withdrawal.username,
            method: withdrawal.method,
            address: withdrawal.address,
            amount: withdrawal.amount,
            status: withdrawal.status,
            created_date: withdrawal.created_date,
            created_time: withdrawal.created_time,
        }
    }
}

const SELECT_WITHDRAWALS: &str = "SELECT w.id, w.user_id, u.username,
        w.method, w.address, w.amount, w.status, w.created_date,
        w.created_time
    FROM withdrawals w
    JOIN users u ON u.id = w.user_id";

fn check_minimum(amount: Decimal) -> Result<(), StoreError> {
    if amount < MIN_WITHDRAWAL {
        return Err(StoreError::BelowMinimumWithdrawal {
            minimum: MIN_WITHDRAWAL,
        });
    }
    Ok(())
}

/// Debit the amount and record a pending withdrawal, atomically.
#[tracing::instrument(skip(pool, time_source))]
pub async fn create_withdrawal(
    user_id: &UserId,
    details: &requests::CreateWithdrawal,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Withdrawal, StoreError> {
    let amount = positive_amount(details.amount)?;
    check_minimum(amount)?;
    check_len(&details.method, requests::FIELD_MAX_LEN)?;
    check_len(&details.address, requests::FIELD_MAX_LEN)?;

    let mut tx = pool.begin().await?;
    adjust_balance_tx(
        user_id,
        -amount,
        Precondition::ActiveAndSufficient,
        &mut tx,
    )
    .await?;

    let (created_date, created_time) = time_source.ledger_stamp();
    let withdrawal = sqlx::query_as::<_, Withdrawal>(
        "WITH w AS (
            INSERT INTO withdrawals (
                id,
                user_id,
                method,
                address,
                amount,
                created_date,
                created_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        )
        SELECT w.id, w.user_id, u.username, w.method, w.address, w.amount,
            w.status, w.created_date, w.created_time
        FROM w
        JOIN users u ON u.id = w.user_id",
    )
    .bind(new_entry_id())
    .bind(user_id)
    .bind(details.method.trim())
    .bind(details.address.trim())
    .bind(amount)
    .bind(created_date.to_sqlx())
    .bind(created_time.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(withdrawal)
}

pub async fn list_user_withdrawals(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<Withdrawal>, StoreError> {
    Ok(sqlx::query_as::<_, Withdrawal>(&format!(
        "{SELECT_WITHDRAWALS} WHERE w.user_id = $1
        ORDER BY w.created_date DESC, w.created_time DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn list_all_withdrawals(
    pool: &PgPool,
) -> Result<Vec<Withdrawal>, StoreError> {
    Ok(sqlx::query_as::<_, Withdrawal>(&format!(
        "{SELECT_WITHDRAWALS}
        ORDER BY w.created_date DESC, w.created_time DESC"
    ))
    .fetch_all(pool)
    .await?)
}

/// Resolve a pending withdrawal. Declining refunds the amount.
#[tracing::instrument(skip(pool))]
pub async fn review_withdrawal(
    id: &WithdrawalId,
    status: RequestStatus,
    pool: &PgPool,
) -> Result<Withdrawal, StoreError> {
    if status == RequestStatus::Pending {
        return Err(StoreError::InvalidStatusTransition);
    }
    let mut tx = pool.begin().await?;

    let (user_id, amount, current) =
        sqlx::query_as::<_, (UserId, Decimal, RequestStatus)>(
            "SELECT user_id, amount, status FROM withdrawals
            WHERE id = $1
            FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::WithdrawalNotFound)?;
    if current != RequestStatus::Pending {
        return Err(StoreError::EntryAlreadyProcessed);
    }

    sqlx::query("UPDATE withdrawals SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if status == RequestStatus::Declined {
        adjust_balance_tx(&user_id, amount, Precondition::None, &mut tx)
            .await?;
    }

    let withdrawal = sqlx::query_as::<_, Withdrawal>(&format!(
        "{SELECT_WITHDRAWALS} WHERE w.id = $1"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(withdrawal)
}
