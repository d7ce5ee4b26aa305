//! Demo data for the development server.
//!
//! Creates an operator, three investors (bob and charlie referred by alice),
//! a few plans and bots, and entries in every state: pending and confirmed
//! deposits, a declined withdrawal, active and matured investments and a bot
//! purchase.

use crate::{
    TestApp, alice_login_credentials, bob_login_credentials, bot_a,
    charlie_credentials, charlie_login_credentials, plan_a, quick_plan,
};
use anyhow::Result;
use jiff::{Span, Timestamp};
use payloads::{RequestStatus, requests, responses};
use rust_decimal::dec;

pub struct DevDataset {
    pub admin: responses::UserProfile,
    pub alice: responses::UserProfile,
    pub bob: responses::UserProfile,
    pub charlie: responses::UserProfile,
    pub plans: Vec<responses::Plan>,
    pub bots: Vec<responses::Bot>,
    pub matured_investment: responses::Investment,
    pub active_investment: responses::Investment,
    pub purchase: responses::Purchase,
}

impl DevDataset {
    pub async fn create(app: &TestApp) -> Result<Self> {
        // matured entries are created in the past, then time catches up
        app.time_source.set(Timestamp::now() - Span::new().hours(72));

        tracing::info!("👤 Creating operator and investors");
        let admin = app.create_admin_user().await?;
        let alice = app.create_alice_user().await?;
        let bob = app.create_bob_user(Some(&alice.referral_code)).await?;
        let charlie = app
            .client
            .create_account(&requests::CreateAccount {
                referral_code: Some(alice.referral_code.0.clone()),
                ..charlie_credentials()
            })
            .await?;

        tracing::info!("📈 Creating plans and bots");
        let plans = vec![
            app.create_plan(&plan_a()).await?,
            app.create_plan(&quick_plan()).await?,
            app.create_plan(&gold_plan()).await?,
        ];
        let bots = vec![
            app.create_bot(&bot_a()).await?,
            app.create_bot(&requests::CreateBot {
                name: "Arbitrage".into(),
                price: dec!(250),
                commission_percent: "7.5%".into(),
                duration_seconds: 90 * 24 * 60 * 60,
            })
            .await?,
        ];

        tracing::info!("💰 Funding accounts");
        app.fund(&alice_login_credentials(), dec!(2000)).await?;
        app.fund(&bob_login_credentials(), dec!(1500)).await?;
        app.fund(&charlie_login_credentials(), dec!(300)).await?;

        // one deposit left for the operator to review
        app.login_charlie().await?;
        app.client
            .create_deposit(&requests::CreateDeposit {
                method: "usdt".into(),
                amount: dec!(500),
                transaction_id: "demo-pending-deposit".into(),
            })
            .await?;

        tracing::info!("🏦 Creating investments and purchases");
        app.login_bob().await?;
        let matured_investment = app
            .client
            .create_investment(
                &plan_a().name,
                &requests::CreateInvestment { amount: dec!(500) },
            )
            .await?;
        let purchase = app.client.buy_bot(&bot_a().name).await?;

        // a withdrawal the operator declined, refunding the amount
        let withdrawal = app
            .client
            .create_withdrawal(&requests::CreateWithdrawal {
                method: "bitcoin".into(),
                address: "bc1qdemo0address".into(),
                amount: dec!(200),
            })
            .await?;
        app.login_admin().await?;
        app.client
            .update_withdrawal(&requests::UpdateWithdrawal {
                id: withdrawal.id,
                status: RequestStatus::Declined,
            })
            .await?;

        // bob's starter investment matures and pays alice her commission
        app.time_source.advance(Span::new().hours(48));
        app.tick().await?;

        app.login_alice().await?;
        let active_investment = app
            .client
            .create_investment(
                &gold_plan().name,
                &requests::CreateInvestment { amount: dec!(1200) },
            )
            .await?;

        Ok(Self {
            admin,
            alice,
            bob,
            charlie,
            plans,
            bots,
            matured_investment,
            active_investment,
            purchase,
        })
    }

    pub fn print_summary(&self) {
        tracing::info!("📋 Development dataset:");
        tracing::info!(
            "   Operator: {} (password operatorpw)",
            self.admin.username
        );
        tracing::info!(
            "   Investors: {} (referral code {}), {}, {}",
            self.alice.username,
            self.alice.referral_code,
            self.bob.username,
            self.charlie.username
        );
        for plan in &self.plans {
            tracing::info!(
                "   Plan {}: ${}-${}, {} profit, {} commission, {}s",
                plan.name,
                plan.terms.min,
                plan.terms.max,
                plan.terms.profit_percent,
                plan.terms.commission_percent,
                plan.terms.duration_seconds
            );
        }
        for bot in &self.bots {
            tracing::info!("   Bot {}: ${}", bot.name, bot.price);
        }
        tracing::info!(
            "   Matured investment {} and active investment {}",
            self.matured_investment.id,
            self.active_investment.id
        );
        tracing::info!("   Bot purchase {}", self.purchase.id);
    }
}

/// A week-long plan for larger amounts.
pub fn gold_plan() -> requests::CreatePlan {
    requests::CreatePlan {
        name: "Gold".into(),
        terms: requests::PlanTerms {
            min: dec!(1000),
            max: dec!(50000),
            profit_percent: "25%".into(),
            commission_percent: "8%".into(),
            duration_seconds: 7 * 24 * 60 * 60,
        },
    }
}
