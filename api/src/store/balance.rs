//! The balance mutator.
//!
//! Every money-moving operation changes `users.balance` through
//! [`adjust_balance_tx`]. The account row is locked with `FOR UPDATE` in the
//! caller's transaction, so the check against the current balance and the
//! write cannot interleave with another writer on the same account.
//! Operations on different accounts don't contend.

use payloads::{AccountStatus, ReferralCode, UserId};
use rust_decimal::Decimal;
use sqlx::FromRow;

use super::StoreError;
use crate::commission::round2;

/// What must hold for a balance change to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Credits. The change is applied regardless of account status.
    None,
    /// The resulting balance must not be negative.
    Sufficient,
    /// The account must be active and the resulting balance must not be
    /// negative.
    ActiveAndSufficient,
}

/// The account columns relevant to money movement, read under the row lock.
#[derive(Debug, Clone, FromRow)]
pub struct LockedAccount {
    pub id: UserId,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub referred_by: Option<ReferralCode>,
}

/// Lock an account row for the rest of the transaction.
pub(crate) async fn lock_account_tx(
    user_id: &UserId,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<LockedAccount, StoreError> {
    sqlx::query_as::<_, LockedAccount>(
        "SELECT id, balance, status, referred_by FROM users
        WHERE id = $1
        FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::AccountNotFound)
}

/// Add `delta` (negative to debit) to an account's balance, returning the
/// new balance.
///
/// A balance can never go negative, whatever the precondition; the
/// precondition only adds checks. Nothing is written when a check fails, and
/// the caller's transaction should be dropped.
#[tracing::instrument(skip(tx), ret, err(level = "debug"))]
pub async fn adjust_balance_tx(
    user_id: &UserId,
    delta: Decimal,
    precondition: Precondition,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<Decimal, StoreError> {
    let account = lock_account_tx(user_id, tx).await?;
    let new_balance = apply_delta(&account, delta, precondition)?;

    sqlx::query("UPDATE users SET balance = $1 WHERE id = $2")
        .bind(new_balance)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    Ok(new_balance)
}

fn apply_delta(
    account: &LockedAccount,
    delta: Decimal,
    precondition: Precondition,
) -> Result<Decimal, StoreError> {
    if precondition == Precondition::ActiveAndSufficient
        && account.status != AccountStatus::Active
    {
        return Err(StoreError::AccountInactive);
    }
    let new_balance = round2(account.balance + round2(delta));
    if new_balance < Decimal::ZERO {
        return Err(StoreError::InsufficientBalance);
    }
    Ok(new_balance)
}
