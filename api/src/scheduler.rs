//! Time-based triggers: investment payouts and purchase expiry.
//!
//! Maturity is stored on each row (`matures_at`), never held in process
//! memory, so a restarted server pays out anything that came due while it
//! was down on its first tick.
//!
//! ```text
//!  create                    matures_at              tick
//!    |---------- duration ---------|---------------------|
//!                                                  payout (once)
//!                                                  referral credit
//! ```
//!
//! Each tick:
//! 1. pays out due investments, one at a time,
//! 2. completes due purchases,
//! 3. retries referral credits still marked pending.
//!
//! Entries are claimed with a transaction-scoped advisory lock, so several
//! scheduler instances can run side by side; the payout's own row lock and
//! status check make a double credit impossible regardless. An entry that
//! fails is retried with exponential backoff and doesn't hold up the rest.

use anyhow::Context;
use jiff_sqlx::ToSqlx;
use payloads::{InvestmentId, PurchaseId};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time;

use crate::notify::Notifier;
use crate::store::{
    self, StoreTimeout,
    referral::{
        EntryKind, Settlement, list_pending_referrals, pay_pending_referral,
    },
};
use crate::{telemetry::log_error, time::TimeSource};

/// Referral retries attempted per kind per tick.
const REFERRAL_BATCH: i64 = 100;

/// A run of failures this long usually means the database itself is
/// unavailable rather than one bad entry, so the sweep stops until the next
/// tick.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

pub struct Scheduler {
    pool: PgPool,
    time_source: TimeSource,
    notifier: Notifier,
    store_timeout: StoreTimeout,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        time_source: TimeSource,
        notifier: Notifier,
        store_timeout: StoreTimeout,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            time_source,
            notifier,
            store_timeout,
            tick_interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let _ = schedule_tick(
                &self.pool,
                &self.time_source,
                &self.notifier,
                self.store_timeout,
            )
            .await
            .map_err(log_error);
        }
    }
}

/// Update state once right now.
#[tracing::instrument(skip_all)]
pub async fn schedule_tick(
    pool: &PgPool,
    time_source: &TimeSource,
    notifier: &Notifier,
    store_timeout: StoreTimeout,
) -> anyhow::Result<()> {
    process_due_investments(pool, time_source, notifier, store_timeout)
        .await?;
    process_due_purchases(pool, time_source, store_timeout).await?;
    reconcile_referrals(pool, notifier, store_timeout).await?;
    Ok(())
}

#[tracing::instrument(skip_all)]
async fn process_due_investments(
    pool: &PgPool,
    time_source: &TimeSource,
    notifier: &Notifier,
    store_timeout: StoreTimeout,
) -> anyhow::Result<()> {
    let mut consecutive_failures = 0;
    loop {
        match process_next_investment(pool, time_source, notifier, store_timeout)
            .await
        {
            Ok(true) => consecutive_failures = 0, // Processed one, try for more
            Ok(false) => break,                   // Nothing else is due
            Err(e) => {
                // The failure is recorded and backed off; move on
                tracing::error!("Failed to pay out investment: {:#}", e);
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    anyhow::bail!("Giving up on investments for this tick");
                }
            }
        }
    }
    Ok(())
}

/// Lock and pay out the next due investment.
/// Returns Ok(true) if one was processed, Ok(false) if none are due.
#[tracing::instrument(skip_all)]
async fn process_next_investment(
    pool: &PgPool,
    time_source: &TimeSource,
    notifier: &Notifier,
    store_timeout: StoreTimeout,
) -> anyhow::Result<bool> {
    // This transaction is ONLY used to hold the advisory lock for coordination.
    // The payout runs in its own transaction.
    let mut coordination_tx = pool.begin().await?;

    let Some(id) =
        lock_next_due_investment(&mut coordination_tx, time_source).await?
    else {
        return Ok(false);
    };

    let result = store_timeout
        .run(store::investment::payout_investment(&id, time_source, pool))
        .await;
    match result {
        Ok(mut payout) => {
            // the payout has committed; nothing below may report a failure
            let _ = coordination_tx
                .commit()
                .await
                .context("Failed to release investment payout lock")
                .map_err(log_error);
            tracing::info!(investment_id = %id, outcome = ?payout.outcome, "investment matured");
            payout.pay_referral(store_timeout, pool).await;
            notifier.investment_paid(&payout);
            Ok(true)
        }
        Err(e) => {
            // Record the failure before releasing the lock
            let _ = store::investment::record_scheduler_failure(
                &id,
                time_source,
                pool,
            )
            .await
            .context("Failed to record investment payout failure")
            .map_err(log_error);
            let _ = coordination_tx.commit().await;
            Err(anyhow::Error::from(e)
                .context(format!("Payout of investment {id} failed")))
        }
    }
}

/// Find a due investment not in backoff and take its advisory lock.
///
/// Backoff is 30 seconds * 2^failures, capped at 5 failures (16 minutes).
async fn lock_next_due_investment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    time_source: &TimeSource,
) -> anyhow::Result<Option<InvestmentId>> {
    sqlx::query_scalar::<_, InvestmentId>(
        "SELECT id FROM investments
        WHERE status = 'active'
            AND matures_at <= $1
            AND (
                scheduler_failure_count = 0
                OR scheduler_last_failed_at IS NULL
                OR $1 > scheduler_last_failed_at +
                    INTERVAL '30 seconds' * POW(2, LEAST(scheduler_failure_count, 5))
            )
            AND pg_try_advisory_xact_lock(
                hashtextextended('investment_payout:' || key::text, 0)
            )
        ORDER BY matures_at
        LIMIT 1",
    )
    .bind(time_source.now().to_sqlx())
    .fetch_optional(&mut **tx)
    .await
    .map_err(Into::into)
}

#[tracing::instrument(skip_all)]
async fn process_due_purchases(
    pool: &PgPool,
    time_source: &TimeSource,
    store_timeout: StoreTimeout,
) -> anyhow::Result<()> {
    let mut consecutive_failures = 0;
    loop {
        match process_next_purchase(pool, time_source, store_timeout).await {
            Ok(true) => consecutive_failures = 0,
            Ok(false) => break,
            Err(e) => {
                tracing::error!("Failed to complete purchase: {:#}", e);
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    anyhow::bail!("Giving up on purchases for this tick");
                }
            }
        }
    }
    Ok(())
}

async fn process_next_purchase(
    pool: &PgPool,
    time_source: &TimeSource,
    store_timeout: StoreTimeout,
) -> anyhow::Result<bool> {
    let mut coordination_tx = pool.begin().await?;

    let Some(id) =
        lock_next_due_purchase(&mut coordination_tx, time_source).await?
    else {
        return Ok(false);
    };

    let result = store_timeout
        .run(store::purchase::complete_purchase(&id, time_source, pool))
        .await;
    match result {
        Ok(_) => {
            let _ = coordination_tx
                .commit()
                .await
                .context("Failed to release purchase completion lock")
                .map_err(log_error);
            tracing::info!(purchase_id = %id, "purchase ended");
            Ok(true)
        }
        Err(e) => {
            let _ = store::purchase::record_scheduler_failure(
                &id,
                time_source,
                pool,
            )
            .await
            .context("Failed to record purchase completion failure")
            .map_err(log_error);
            let _ = coordination_tx.commit().await;
            Err(anyhow::Error::from(e)
                .context(format!("Completion of purchase {id} failed")))
        }
    }
}

async fn lock_next_due_purchase(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    time_source: &TimeSource,
) -> anyhow::Result<Option<PurchaseId>> {
    sqlx::query_scalar::<_, PurchaseId>(
        "SELECT id FROM purchases
        WHERE status = 'active'
            AND matures_at <= $1
            AND (
                scheduler_failure_count = 0
                OR scheduler_last_failed_at IS NULL
                OR $1 > scheduler_last_failed_at +
                    INTERVAL '30 seconds' * POW(2, LEAST(scheduler_failure_count, 5))
            )
            AND pg_try_advisory_xact_lock(
                hashtextextended('purchase_completion:' || key::text, 0)
            )
        ORDER BY matures_at
        LIMIT 1",
    )
    .bind(time_source.now().to_sqlx())
    .fetch_optional(&mut **tx)
    .await
    .map_err(Into::into)
}

/// Retry referral credits that were left pending after their entry's
/// primary transition committed.
#[tracing::instrument(skip_all)]
async fn reconcile_referrals(
    pool: &PgPool,
    notifier: &Notifier,
    store_timeout: StoreTimeout,
) -> anyhow::Result<()> {
    for kind in [EntryKind::Investment, EntryKind::Purchase] {
        let pending = store_timeout
            .run(list_pending_referrals(kind, REFERRAL_BATCH, pool))
            .await?;
        for entry_id in pending {
            match store_timeout
                .run(pay_pending_referral(kind, &entry_id, pool))
                .await
            {
                Ok(Some(Settlement {
                    credit: Some(credit),
                    ..
                })) => notifier.referral_credited(&credit),
                Ok(_) => {}
                Err(e) => log_error(anyhow::Error::from(e).context(format!(
                    "Referral payout for {kind} {entry_id} still pending"
                ))),
            }
        }
    }
    Ok(())
}
