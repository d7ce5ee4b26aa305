use crate::{AccountStatus, RequestStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const EMAIL_MAX_LEN: usize = 255;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const NAME_MAX_LEN: usize = 100;
pub const FIELD_MAX_LEN: usize = 255;

/// Validation result for usernames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameValidation {
    Valid,
    TooShort,
    TooLong,
    InvalidCharacters,
    MustStartWithLetter,
}

impl UsernameValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::TooShort => Some("Username must be at least 3 characters"),
            Self::TooLong => Some("Username must be at most 30 characters"),
            Self::InvalidCharacters => Some(
                "Username can only contain letters, numbers, and underscores",
            ),
            Self::MustStartWithLetter => {
                Some("Username must start with a letter")
            }
        }
    }
}

/// Validate a username.
///
/// Rules:
/// - 3-30 characters
/// - ASCII letters, numbers, and underscores only
/// - Must start with a letter
pub fn validate_username(username: &str) -> UsernameValidation {
    if username.len() < USERNAME_MIN_LEN {
        return UsernameValidation::TooShort;
    }
    if username.len() > USERNAME_MAX_LEN {
        return UsernameValidation::TooLong;
    }

    let mut chars = username.chars();

    if let Some(first) = chars.next()
        && !first.is_ascii_alphabetic()
    {
        return UsernameValidation::MustStartWithLetter;
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return UsernameValidation::InvalidCharacters;
    }

    UsernameValidation::Valid
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Referral code of the account that referred this one, if any.
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

/// Admin changes to an account. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAccount {
    #[serde(default)]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub referred_by: Option<String>,
    /// Remove the account's referrer. Takes precedence over `referred_by`.
    #[serde(default)]
    pub clear_referral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeposit {
    pub method: String,
    pub amount: Decimal,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDeposit {
    pub id: crate::DepositId,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWithdrawal {
    pub method: String,
    pub address: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWithdrawal {
    pub id: crate::WithdrawalId,
    pub status: RequestStatus,
}

/// The editable terms of an investment plan.
///
/// Percentages are kept as entered (`"10"`, `"10%"`, `"7.5 %"`) and are
/// validated on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTerms {
    pub min: Decimal,
    pub max: Decimal,
    pub profit_percent: String,
    pub commission_percent: String,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub terms: PlanTerms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvestment {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBot {
    pub name: String,
    pub price: Decimal,
    pub commission_percent: String,
    pub duration_seconds: i64,
}
