//! Profit and referral commission arithmetic.
//!
//! Plans and bots store their rates as the text an admin entered, e.g.
//! `"10%"`. Admin input is validated with [`Percent::from_str`]; stored
//! rates are evaluated leniently with [`Percent::rate`] so a malformed value
//! that somehow made it into the database yields a zero split rather than an
//! error in the middle of a payout.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Round a money amount to cents, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A percentage as entered, e.g. `"10"`, `"10%"` or `" 7.5 % "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Percent(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid percentage '{0}'")]
pub struct InvalidPercent(pub String);

impl Percent {
    /// Wrap stored text without validating it.
    pub fn from_stored(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric rate, reading the leading number and ignoring whatever
    /// follows it. `None` if there is no leading number or it's negative.
    pub fn rate(&self) -> Option<Decimal> {
        let text = self.0.trim_start();
        let end = text
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        Decimal::from_str(&text[..end])
            .ok()
            .filter(|rate| !rate.is_sign_negative())
    }
}

impl FromStr for Percent {
    type Err = InvalidPercent;

    /// Strict parse: a non-negative number, optionally followed by `%`,
    /// with surrounding whitespace allowed and nothing else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
        let valid = !number.is_empty()
            && number.chars().all(|c| c.is_ascii_digit() || c == '.')
            && Decimal::from_str(number).is_ok();
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidPercent(s.to_string()))
        }
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of applying a percentage to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// Principal plus the percent portion.
    pub gross_plus_percent: Decimal,
    /// Just the percent portion.
    pub percent_portion: Decimal,
}

impl Split {
    pub const ZERO: Split = Split {
        gross_plus_percent: Decimal::ZERO,
        percent_portion: Decimal::ZERO,
    };
}

/// Apply `rate` to `principal`, rounding each part to cents.
///
/// A rate that can't be evaluated produces [`Split::ZERO`].
pub fn split(principal: Decimal, rate: &Percent) -> Split {
    let Some(rate) = rate.rate() else {
        return Split::ZERO;
    };
    let Some(portion) = principal
        .checked_mul(rate)
        .and_then(|p| p.checked_div(Decimal::ONE_HUNDRED))
    else {
        return Split::ZERO;
    };
    let percent_portion = round2(portion);
    Split {
        gross_plus_percent: round2(principal + percent_portion),
        percent_portion,
    }
}
