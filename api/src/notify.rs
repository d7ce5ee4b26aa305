//! Best-effort notifications.
//!
//! Everything here runs on spawned tasks after the money movement it
//! describes has committed. Failures are logged and never reach the caller.

use anyhow::Context;
use payloads::{UserId, responses::PayoutOutcome};
use secrecy::{ExposeSecret, SecretBox};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::Config;
use crate::email::{EmailService, EmailTemplate, templates};
use crate::store::{self, investment::Payout, referral::ReferralCredit};
use crate::telemetry::log_error;
use crate::time::TimeSource;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Where chat-ops announcements go.
pub struct TelegramConfig {
    pub bot_token: SecretBox<String>,
    pub chat_id: String,
}

/// Dispatches user notifications (a persisted record plus an email) and
/// operator announcements.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

struct Inner {
    pool: PgPool,
    time_source: TimeSource,
    email: EmailService,
    http: reqwest::Client,
    telegram: Option<TelegramConfig>,
}

impl Notifier {
    pub fn new(
        pool: PgPool,
        time_source: TimeSource,
        email: EmailService,
        telegram: Option<TelegramConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                time_source,
                email,
                http: reqwest::Client::new(),
                telegram,
            }),
        }
    }

    pub fn from_config(
        config: &Config,
        pool: PgPool,
        time_source: TimeSource,
    ) -> Self {
        let email = EmailService::new(
            SecretBox::new(Box::new(
                config.email_api_key.expose_secret().clone(),
            )),
            config.email_from_address.clone(),
        );
        let telegram = config.telegram.as_ref().map(|t| TelegramConfig {
            bot_token: SecretBox::new(Box::new(
                t.bot_token.expose_secret().clone(),
            )),
            chat_id: t.chat_id.clone(),
        });
        Self::new(pool, time_source, email, telegram)
    }

    /// Record a notification for `recipient` and email it to them.
    pub fn notify(
        &self,
        recipient: UserId,
        template: EmailTemplate,
    ) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let span = tracing::info_span!(
            "notify",
            user_id = %recipient,
            subject = %template.subject
        );
        tokio::spawn(
            async move {
                let _ = inner
                    .deliver(recipient, template)
                    .await
                    .map_err(log_error);
            }
            .instrument(span),
        )
    }

    /// Post a message to the operators' chat, or just log it when no chat
    /// is configured.
    pub fn announce(&self, text: impl Into<String>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let text = text.into();
        tokio::spawn(
            async move {
                let _ = inner.announce(&text).await.map_err(log_error);
            }
            .instrument(tracing::info_span!("announce")),
        )
    }

    /// Tell the owner (and referrer, if credited) about a payout.
    pub fn investment_paid(&self, payout: &Payout) {
        if payout.outcome != PayoutOutcome::Paid {
            return;
        }
        let investment = &payout.investment;
        self.notify(
            investment.user_id,
            templates::investment_matured(
                &investment.plan_name,
                investment.payout_amount,
            ),
        );
        if let Some(credit) = &payout.referral {
            self.referral_credited(credit);
        }
    }

    pub fn referral_credited(&self, credit: &ReferralCredit) {
        self.notify(
            credit.referrer,
            templates::referral_earned(credit.amount, &credit.kind.to_string()),
        );
    }
}

impl Inner {
    async fn deliver(
        &self,
        recipient: UserId,
        template: EmailTemplate,
    ) -> anyhow::Result<()> {
        let user = store::read_user(&self.pool, &recipient)
            .await
            .context("Failed to look up notification recipient")?;
        store::create_notification(
            &recipient,
            &template.subject,
            &template.text_body,
            &self.time_source,
            &self.pool,
        )
        .await
        .context("Failed to record notification")?;
        self.email
            .send_email(&user.email, &template)
            .await
            .context("Failed to email notification")
    }

    async fn announce(&self, text: &str) -> anyhow::Result<()> {
        let Some(telegram) = &self.telegram else {
            tracing::info!(text, "chat announcement (no chat configured)");
            return Ok(());
        };
        let url = format!(
            "{TELEGRAM_API}/bot{}/sendMessage",
            telegram.bot_token.expose_secret()
        );
        self.http
            .post(url)
            .json(&serde_json::json!({
                "chat_id": telegram.chat_id,
                "text": text,
            }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| e.without_url())
            .context("Failed to post chat announcement")?;
        Ok(())
    }
}
