//! Types shared between the API server and its clients.
//!
//! Money is always `rust_decimal::Decimal`, which serializes as a decimal
//! string so no precision is lost in transit.

mod api_client;
pub mod requests;
pub mod responses;

pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal account id. Never changes for the lifetime of an account.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct UserId(pub Uuid);

/// The code an account hands out to refer others, and the value other
/// accounts store in `referred_by`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct ReferralCode(pub String);

/// External id of a deposit: a random hex token, distinct from the row key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct DepositId(pub String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct WithdrawalId(pub String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct InvestmentId(pub String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct PurchaseId(pub String);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "account_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[display("active")]
    Active,
    #[display("deactivated")]
    Deactivated,
}

/// Status of a deposit or withdrawal request.
///
/// Requests start out pending and are resolved exactly once by an admin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "request_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[display("pending")]
    Pending,
    #[display("confirmed")]
    Confirmed,
    #[display("declined")]
    Declined,
}

/// Status of an investment or bot purchase. `Completed` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "entry_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[display("active")]
    Active,
    #[display("completed")]
    Completed,
}

/// Where an entry's referral commission stands.
///
/// `Pending` means the owner has been paid but the referrer has not been
/// credited yet; the scheduler keeps retrying those.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "referral_payout", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ReferralPayout {
    #[display("none")]
    None,
    #[display("pending")]
    Pending,
    #[display("paid")]
    Paid,
    #[display("skipped")]
    Skipped,
}

/// Nullable timestamp column, decoded through jiff-sqlx.
#[cfg(feature = "use-sqlx")]
pub struct OptionalTimestamp(Option<jiff_sqlx::Timestamp>);

#[cfg(feature = "use-sqlx")]
impl sqlx::Type<sqlx::Postgres> for OptionalTimestamp {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <jiff_sqlx::Timestamp as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <jiff_sqlx::Timestamp as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "use-sqlx")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OptionalTimestamp {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let inner = <Option<jiff_sqlx::Timestamp> as sqlx::Decode<
            'r,
            sqlx::Postgres,
        >>::decode(value)?;
        Ok(Self(inner))
    }
}

#[cfg(feature = "use-sqlx")]
impl From<OptionalTimestamp> for Option<jiff::Timestamp> {
    fn from(value: OptionalTimestamp) -> Self {
        value.0.map(|ts| ts.to_jiff())
    }
}
