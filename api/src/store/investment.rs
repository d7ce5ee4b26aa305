//! The investment lifecycle: `active -> completed`, exactly once.
//!
//! ```text
//!   create_investment            payout_investment
//!        |                              |
//!        v                              v
//!   debit principal, ---------->  credit payout_amount,
//!   freeze payout_amount,         status = completed,
//!   referral_commission,          ref_earning = referral_commission,
//!   snapshot referrer,            referral_payout = pending | none
//!   matures_at = now + duration         |
//!                                       v
//!                                 Payout::pay_referral (own transaction)
//! ```
//!
//! Everything the payout needs is frozen on the row at creation, so later
//! changes to the plan or to the owner's referrer never alter an investment
//! in flight.

use jiff::Timestamp;
use jiff::civil::{Date, Time};
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    EntryStatus, InvestmentId, OptionalTimestamp, ReferralCode, ReferralPayout,
    UserId, responses,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::balance::{Precondition, adjust_balance_tx, lock_account_tx};
use super::referral::{EntryKind, ReferralCredit, settle_committed};
use super::{
    Plan, StoreError, StoreTimeout, maturity, new_entry_id, positive_amount,
};
use crate::commission::split;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct Investment {
    pub id: InvestmentId,
    pub user_id: UserId,
    pub plan_name: String,
    pub amount: Decimal,
    pub payout_amount: Decimal,
    pub referral_commission: Decimal,
    pub referral_code_snapshot: Option<ReferralCode>,
    pub ref_earning: Option<Decimal>,
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

impl From<Investment> for responses::Investment {
    fn from(investment: Investment) -> Self {
        Self {
            id: investment.id,
            user_id: investment.user_id,
            plan_name: investment.plan_name,
            amount: investment.amount,
            payout_amount: investment.payout_amount,
            referral_commission: investment.referral_commission,
            referral_code_snapshot: investment.referral_code_snapshot,
            ref_earning: investment.ref_earning,
            referral_payout: investment.referral_payout,
            status: investment.status,
            created_date: investment.created_date,
            created_time: investment.created_time,
            matures_at: investment.matures_at,
            completed_at: investment.completed_at,
        }
    }
}

/// Result of a payout attempt.
#[derive(Debug, Clone)]
pub struct Payout {
    pub outcome: responses::PayoutOutcome,
    pub investment: Investment,
    /// Set once [`Payout::pay_referral`] has credited the referrer.
    pub referral: Option<ReferralCredit>,
}

impl Payout {
    /// Credit the referrer after a payout that just committed. Does nothing
    /// if this payout found the investment already completed. Failures leave
    /// the referral payout `pending`.
    pub async fn pay_referral(&mut self, timeout: StoreTimeout, pool: &PgPool) {
        if self.outcome != responses::PayoutOutcome::Paid {
            return;
        }
        let Some(settlement) = settle_committed(
            EntryKind::Investment,
            &self.investment.id.0,
            timeout,
            pool,
        )
        .await
        else {
            return;
        };
        self.investment.referral_payout = settlement.outcome;
        self.referral = settlement.credit;
    }
}

/// Debit the principal and open an investment in the named plan.
#[tracing::instrument(skip(pool, time_source))]
pub async fn create_investment(
    user_id: &UserId,
    plan_name: &str,
    amount: Decimal,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Investment, StoreError> {
    let amount = positive_amount(amount)?;
    let mut tx = pool.begin().await?;

    // FOR SHARE keeps the plan from being edited or deleted until commit
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE name = $1 FOR SHARE",
    )
    .bind(plan_name)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::PlanNotFound)?;
    if amount < plan.min || amount > plan.max {
        return Err(StoreError::AmountOutsidePlanLimits {
            min: plan.min,
            max: plan.max,
        });
    }

    let profit = split(amount, &plan.profit_percent());
    let commission = split(amount, &plan.commission_percent());
    let matures_at = maturity(time_source, plan.duration_seconds)?;

    adjust_balance_tx(
        user_id,
        -amount,
        Precondition::ActiveAndSufficient,
        &mut tx,
    )
    .await?;
    // already locked by the debit; read the referrer as of now
    let account = lock_account_tx(user_id, &mut tx).await?;

    let (created_date, created_time) = time_source.ledger_stamp();
    let investment = sqlx::query_as::<_, Investment>(
        "INSERT INTO investments (
                id,
                user_id,
                plan_name,
                amount,
                payout_amount,
                referral_commission,
                referral_code_snapshot,
                created_date,
                created_time,
                matures_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
    )
    .bind(new_entry_id())
    .bind(user_id)
    .bind(&plan.name)
    .bind(amount)
    .bind(profit.gross_plus_percent)
    .bind(commission.percent_portion)
    .bind(&account.referred_by)
    .bind(created_date.to_sqlx())
    .bind(created_time.to_sqlx())
    .bind(matures_at.to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(investment)
}

pub async fn list_user_investments(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<Investment>, StoreError> {
    Ok(sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments
        WHERE user_id = $1
        ORDER BY created_date DESC, created_time DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn list_all_investments(
    pool: &PgPool,
) -> Result<Vec<Investment>, StoreError> {
    Ok(sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments
        ORDER BY created_date DESC, created_time DESC",
    )
    .fetch_all(pool)
    .await?)
}

/// Pay an investment out: credit the owner and complete the entry. The
/// referrer is credited afterwards by [`Payout::pay_referral`].
///
/// Idempotent. The investment row lock serializes concurrent callers, and a
/// completed investment is returned untouched as
/// [`responses::PayoutOutcome::AlreadyCompleted`].
#[tracing::instrument(skip(pool, time_source))]
pub async fn payout_investment(
    id: &InvestmentId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Payout, StoreError> {
    let mut tx = pool.begin().await?;

    let investment = sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::InvestmentNotFound)?;
    if investment.status == EntryStatus::Completed {
        return Ok(Payout {
            outcome: responses::PayoutOutcome::AlreadyCompleted,
            investment,
            referral: None,
        });
    }

    adjust_balance_tx(
        &investment.user_id,
        investment.payout_amount,
        Precondition::None,
        &mut tx,
    )
    .await?;
    let investment = sqlx::query_as::<_, Investment>(
        "UPDATE investments
        SET status = 'completed',
            ref_earning = referral_commission,
            completed_at = $1,
            referral_payout = CASE
                WHEN referral_code_snapshot IS NULL
                    THEN 'none'::referral_payout
                ELSE 'pending'::referral_payout
            END,
            scheduler_failure_count = 0,
            scheduler_last_failed_at = NULL
        WHERE id = $2
        RETURNING *",
    )
    .bind(time_source.now().to_sqlx())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Payout {
        outcome: responses::PayoutOutcome::Paid,
        investment,
        referral: None,
    })
}

/// Record a failed scheduler attempt, pushing the next one back.
pub async fn record_scheduler_failure(
    id: &InvestmentId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE investments
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
