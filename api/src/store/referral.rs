//! Crediting referral commission.
//!
//! Investments and purchases record the owner's referrer at creation
//! (`referral_code_snapshot`). Once an entry's `ref_earning` is known and its
//! `referral_payout` is `pending`, [`pay_pending_referral`] credits the
//! referrer in a transaction of its own. If that fails the entry stays
//! `pending` and the scheduler retries just this step.

use payloads::{ReferralCode, ReferralPayout, UserId};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::balance::{Precondition, adjust_balance_tx};
use super::{StoreError, StoreTimeout};
use crate::telemetry::log_error;

/// The ledger tables that carry referral commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum EntryKind {
    #[display("investment")]
    Investment,
    #[display("purchase")]
    Purchase,
}

impl EntryKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Investment => "investments",
            Self::Purchase => "purchases",
        }
    }
}

/// A referral commission that was just credited.
#[derive(Debug, Clone)]
pub struct ReferralCredit {
    pub kind: EntryKind,
    pub entry_id: String,
    pub referrer: UserId,
    pub amount: Decimal,
}

/// How a pending referral payout was resolved.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// `paid` or `skipped`.
    pub outcome: ReferralPayout,
    pub credit: Option<ReferralCredit>,
}

/// Credit the referrer of an entry whose referral payout is pending.
///
/// Returns `None` for entries that aren't pending, which are left alone, so
/// this is safe to call repeatedly and concurrently. A snapshot code that no
/// longer matches an account, or a zero commission, marks the entry
/// `skipped`.
#[tracing::instrument(skip(pool), err(level = "debug"))]
pub async fn pay_pending_referral(
    kind: EntryKind,
    entry_id: &str,
    pool: &PgPool,
) -> Result<Option<Settlement>, StoreError> {
    let table = kind.table();
    let mut tx = pool.begin().await?;

    let Some((snapshot, ref_earning, payout)) = sqlx::query_as::<
        _,
        (Option<ReferralCode>, Option<Decimal>, ReferralPayout),
    >(&format!(
        "SELECT referral_code_snapshot, ref_earning, referral_payout
        FROM {table}
        WHERE id = $1
        FOR UPDATE"
    ))
    .bind(entry_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(match kind {
            EntryKind::Investment => StoreError::InvestmentNotFound,
            EntryKind::Purchase => StoreError::PurchaseNotFound,
        });
    };
    if payout != ReferralPayout::Pending {
        return Ok(None);
    }

    let amount = ref_earning.unwrap_or_default();
    let referrer = match &snapshot {
        Some(code) if amount > Decimal::ZERO => {
            sqlx::query_scalar::<_, UserId>(
                "SELECT id FROM users WHERE referral_code = $1",
            )
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
        }
        _ => None,
    };

    let (outcome, credit) = match referrer {
        Some(referrer) => {
            adjust_balance_tx(&referrer, amount, Precondition::None, &mut tx)
                .await?;
            let credit = ReferralCredit {
                kind,
                entry_id: entry_id.to_string(),
                referrer,
                amount,
            };
            (ReferralPayout::Paid, Some(credit))
        }
        None => (ReferralPayout::Skipped, None),
    };

    sqlx::query(&format!(
        "UPDATE {table} SET referral_payout = $1 WHERE id = $2"
    ))
    .bind(outcome)
    .bind(entry_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%outcome, "referral payout settled");
    Ok(Some(Settlement { outcome, credit }))
}

/// Settle the referral payout of an entry whose own transaction has already
/// committed.
///
/// Runs under a timeout of its own. The entry's money has moved by now, so
/// a failure is only logged: the entry stays `pending` for the scheduler.
pub async fn settle_committed(
    kind: EntryKind,
    entry_id: &str,
    timeout: StoreTimeout,
    pool: &PgPool,
) -> Option<Settlement> {
    timeout
        .run(pay_pending_referral(kind, entry_id, pool))
        .await
        .unwrap_or_else(|e| {
            log_error(anyhow::Error::from(e).context(format!(
                "Referral payout for {kind} {entry_id} left pending"
            )));
            None
        })
}

/// Ids of entries whose referral commission still needs paying.
pub async fn list_pending_referrals(
    kind: EntryKind,
    limit: i64,
    pool: &PgPool,
) -> Result<Vec<String>, StoreError> {
    let table = kind.table();
    Ok(sqlx::query_scalar::<_, String>(&format!(
        "SELECT id FROM {table}
        WHERE referral_payout = 'pending' AND ref_earning IS NOT NULL
        ORDER BY updated_at
        LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?)
}
