//! Bot purchases.
//!
//! Unlike investments, a purchase pays its referral commission right away:
//! `ref_earning` is set when the row is inserted and the referrer is credited
//! straight after commit, see [`Purchase::pay_referral`]. Maturity only marks the subscription as ended and
//! moves no money.

use jiff::Timestamp;
use jiff::civil::{Date, Time};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    EntryStatus, OptionalTimestamp, PurchaseId, ReferralCode, ReferralPayout,
    UserId, responses,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::balance::{Precondition, adjust_balance_tx, lock_account_tx};
use super::referral::{EntryKind, ReferralCredit, settle_committed};
use super::{Bot, StoreError, StoreTimeout, maturity, new_entry_id};
use crate::commission::split;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub bot_name: String,
    pub amount: Decimal,
    pub referral_code_snapshot: Option<ReferralCode>,
    pub ref_earning: Decimal,
    pub referral_payout: ReferralPayout,
    pub status: EntryStatus,
    #[sqlx(try_from = "jiff_sqlx::Date")]
    pub created_date: Date,
    #[sqlx(try_from = "jiff_sqlx::Time")]
    pub created_time: Time,
    #[sqlx(try_from = "SqlxTs")]
    pub matures_at: Timestamp,
    #[sqlx(try_from = "OptionalTimestamp")]
    pub completed_at: Option<Timestamp>,
}

impl From<Purchase> for responses::Purchase {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id,
            user_id: purchase.user_id,
            bot_name: purchase.bot_name,
            amount: purchase.amount,
            referral_code_snapshot: purchase.referral_code_snapshot,
            ref_earning: purchase.ref_earning,
            referral_payout: purchase.referral_payout,
            status: purchase.status,
            created_date: purchase.created_date,
            created_time: purchase.created_time,
            matures_at: purchase.matures_at,
            completed_at: purchase.completed_at,
        }
    }
}

impl Purchase {
    /// Credit the referrer of a purchase that just committed, returning the
    /// credit if one was made. Failures leave the payout `pending`.
    pub async fn pay_referral(
        &mut self,
        timeout: StoreTimeout,
        pool: &PgPool,
    ) -> Option<ReferralCredit> {
        let settlement =
            settle_committed(EntryKind::Purchase, &self.id.0, timeout, pool)
                .await?;
        self.referral_payout = settlement.outcome;
        settlement.credit
    }
}

/// Debit the bot's price and record the purchase.
#[tracing::instrument(skip(pool, time_source))]
pub async fn create_purchase(
    user_id: &UserId,
    bot_name: &str,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Purchase, StoreError> {
    let mut tx = pool.begin().await?;

    let bot =
        sqlx::query_as::<_, Bot>("SELECT * FROM bots WHERE name = $1 FOR SHARE")
            .bind(bot_name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::BotNotFound)?;
    let commission = split(bot.price, &bot.commission_percent());
    let matures_at = maturity(time_source, bot.duration_seconds)?;

    adjust_balance_tx(
        user_id,
        -bot.price,
        Precondition::ActiveAndSufficient,
        &mut tx,
    )
    .await?;
    let account = lock_account_tx(user_id, &mut tx).await?;
    let referral_payout = match account.referred_by {
        Some(_) => ReferralPayout::Pending,
        None => ReferralPayout::None,
    };

    let (created_date, created_time) = time_source.ledger_stamp();
    let purchase = sqlx::query_as::<_, Purchase>(
        "INSERT INTO purchases (
                id,
                user_id,
                bot_name,
                amount,
                referral_code_snapshot,
                ref_earning,
                referral_payout,
                created_date,
                created_time,
                matures_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
    )
    .bind(new_entry_id())
    .bind(user_id)
    .bind(&bot.name)
    .bind(bot.price)
    .bind(&account.referred_by)
    .bind(commission.percent_portion)
    .bind(referral_payout)
    .bind(created_date.to_sqlx())
    .bind(created_time.to_sqlx())
    .bind(matures_at.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(purchase)
}

pub async fn list_user_purchases(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<Purchase>, StoreError> {
    Ok(sqlx::query_as::<_, Purchase>(
        "SELECT * FROM purchases
        WHERE user_id = $1
        ORDER BY created_date DESC, created_time DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

/// Mark a matured purchase completed. Returns false if it already was.
#[tracing::instrument(skip(pool, time_source))]
pub async fn complete_purchase(
    id: &PurchaseId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE purchases
        SET status = 'completed',
            completed_at = $1,
            scheduler_failure_count = 0,
            scheduler_last_failed_at = NULL
        WHERE id = $2 AND status = 'active'",
    )
    .bind(time_source.now().to_sqlx())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Record a failed scheduler attempt, pushing the next one back.
pub async fn record_scheduler_failure(
    id: &PurchaseId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE purchases
        SET scheduler_failure_count = scheduler_failure_count + 1,
            scheduler_last_failed_at = $1
        WHERE id = $2",
    )
    .bind(time_source.now().to_sqlx())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
