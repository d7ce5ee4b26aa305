use crate::{
    AccountStatus, DepositId, EntryStatus, InvestmentId, PurchaseId,
    ReferralCode, ReferralPayout, RequestStatus, UserId, WithdrawalId,
};
use jiff::Timestamp;
use jiff::civil::{Date, Time};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Generic 500 body. Internal error details are only logged.
pub const SYSTEM_ERROR_MESSAGE: &str = "System error. Try again later";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Success,
    Error,
}

/// Wrapper around every API response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: Feedback,
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            kind: Feedback::Success,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: Feedback::Error,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub balance: Decimal,
    pub referral_code: ReferralCode,
    pub referred_by: Option<ReferralCode>,
    pub status: AccountStatus,
    pub is_admin: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub username: String,
    pub method: String,
    pub amount: Decimal,
    pub transaction_id: String,
    pub status: RequestStatus,
    pub created_date: Date,
    pub created_time: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub username: String,
    pub method: String,
    pub address: String,
    pub amount: Decimal,
    pub status: RequestStatus,
    pub created_date: Date,
    pub created_time: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub terms: crate::requests::PlanTerms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub name: String,
    pub price: Decimal,
    pub commission_percent: String,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub user_id: UserId,
    pub plan_name: String,
    pub amount: Decimal,
    /// Principal plus profit, credited to the owner at maturity.
    pub payout_amount: Decimal,
    pub referral_commission: Decimal,
    pub referral_code_snapshot: Option<ReferralCode>,
    /// Set when the investment completes.
    pub ref_earning: Option<Decimal>,
    pub referral_payout: ReferralPayout,
    pub status: EntryStatus,
    pub created_date: Date,
    pub created_time: Time,
    pub matures_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub bot_name: String,
    pub amount: Decimal,
    pub referral_code_snapshot: Option<ReferralCode>,
    pub ref_earning: Decimal,
    pub referral_payout: ReferralPayout,
    pub status: EntryStatus,
    pub created_date: Date,
    pub created_time: Time,
    pub matures_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutOutcome {
    /// The investment was credited by this call.
    Paid,
    /// A previous call already completed it; nothing changed.
    AlreadyCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub outcome: PayoutOutcome,
    pub investment: Investment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub sum: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub balance: Decimal,
    pub deposits: Tally,
    pub withdrawals: Tally,
    /// Sum of payout amounts over the caller's investments.
    pub investments: Tally,
    pub purchases: Tally,
    /// Sum of commission earned; count is the number of referred accounts.
    pub referral_earnings: Tally,
}

/// Entries whose commission went, or will go, to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralEarnings {
    pub investments: Vec<Investment>,
    pub purchases: Vec<Purchase>,
}
