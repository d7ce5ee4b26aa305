//! Read-only aggregates over an account's ledger.

use payloads::{UserId, responses};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::investment::Investment;
use super::purchase::Purchase;
use super::{StoreError, count_referred_accounts, read_user};

#[derive(Debug, FromRow)]
struct TallyRow {
    sum: Decimal,
    count: i64,
}

impl From<TallyRow> for responses::Tally {
    fn from(row: TallyRow) -> Self {
        Self {
            sum: row.sum,
            count: row.count,
        }
    }
}

async fn tally(
    query: &str,
    user_id: &UserId,
    pool: &PgPool,
) -> Result<responses::Tally, StoreError> {
    Ok(sqlx::query_as::<_, TallyRow>(query)
        .bind(user_id)
        .fetch_one(pool)
        .await?
        .into())
}

/// Balance plus sums and counts per ledger kind.
///
/// Declined deposits and withdrawals are left out. Referral earnings count
/// only commission actually credited; their count is the number of referred
/// accounts.
#[tracing::instrument(skip(pool))]
pub async fn totals(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<responses::Totals, StoreError> {
    let user = read_user(pool, user_id).await?;

    let deposits = tally(
        "SELECT COALESCE(SUM(amount), 0) AS sum, COUNT(*) AS count
        FROM deposits
        WHERE user_id = $1 AND status = 'confirmed'",
        user_id,
        pool,
    )
    .await?;
    let withdrawals = tally(
        "SELECT COALESCE(SUM(amount), 0) AS sum, COUNT(*) AS count
        FROM withdrawals
        WHERE user_id = $1 AND status <> 'declined'",
        user_id,
        pool,
    )
    .await?;
    let investments = tally(
        "SELECT COALESCE(SUM(payout_amount), 0) AS sum, COUNT(*) AS count
        FROM investments
        WHERE user_id = $1",
        user_id,
        pool,
    )
    .await?;
    let purchases = tally(
        "SELECT COALESCE(SUM(amount), 0) AS sum, COUNT(*) AS count
        FROM purchases
        WHERE user_id = $1",
        user_id,
        pool,
    )
    .await?;

    let referral_sum = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(ref_earning), 0) FROM (
            SELECT ref_earning FROM investments
            WHERE referral_code_snapshot = $1 AND referral_payout = 'paid'
            UNION ALL
            SELECT ref_earning FROM purchases
            WHERE referral_code_snapshot = $1 AND referral_payout = 'paid'
        ) earned",
    )
    .bind(&user.referral_code)
    .fetch_one(pool)
    .await?;
    let referred = count_referred_accounts(&user.referral_code, pool).await?;

    Ok(responses::Totals {
        balance: user.balance,
        deposits,
        withdrawals,
        investments,
        purchases,
        referral_earnings: responses::Tally {
            sum: referral_sum,
            count: referred,
        },
    })
}

/// Investments and purchases created by accounts the caller referred,
/// newest first.
#[tracing::instrument(skip(pool))]
pub async fn referral_earnings(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<responses::ReferralEarnings, StoreError> {
    let user = read_user(pool, user_id).await?;

    let investments = sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments
        WHERE referral_code_snapshot = $1
        ORDER BY created_date DESC, created_time DESC",
    )
    .bind(&user.referral_code)
    .fetch_all(pool)
    .await?;
    let purchases = sqlx::query_as::<_, Purchase>(
        "SELECT * FROM purchases
        WHERE referral_code_snapshot = $1
        ORDER BY created_date DESC, created_time DESC",
    )
    .bind(&user.referral_code)
    .fetch_all(pool)
    .await?;

    Ok(responses::ReferralEarnings {
        investments: investments.into_iter().map(Into::into).collect(),
        purchases: purchases.into_iter().map(Into::into).collect(),
    })
}
