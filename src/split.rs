//! Turning an expense request into per-borrower shares.
//!
//! Sums are compared with exact float equality against the stated totals, so
//! values such as `0.1 + 0.2` do not add up to `0.3` here.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fanout::DirectedDebt;
use crate::schemas::UserId;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SplitPolicy {
    /// Everyone listed pays `amount / users.len()`.
    Equal,
    /// One percentage per user, summing to exactly 100.
    Percent { percents: Vec<f64> },
    /// One value per user, summing to exactly the expense amount.
    Exact { values: Vec<f64> },
}

impl SplitPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SplitPolicy::Equal => "equal",
            SplitPolicy::Percent { .. } => "percent",
            SplitPolicy::Exact { .. } => "exact",
        }
    }

    fn min_users(&self) -> usize {
        match self {
            SplitPolicy::Equal => 2,
            SplitPolicy::Percent { .. } | SplitPolicy::Exact { .. } => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRequest {
    #[serde(flatten)]
    pub policy: SplitPolicy,
    pub payer_id: UserId,
    pub amount: f64,
    /// Defaults to the policy name.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Everyone taking part, possibly including the payer.
    pub users: Vec<UserId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowerShare {
    pub borrower_id: UserId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("expense amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error("payer id is malformed")]
    NilPayer,

    #[error("at least {min} users are required to split by {policy}, got {found}")]
    TooFewUsers {
        policy: &'static str,
        min: usize,
        found: usize,
    },

    #[error("user id is malformed")]
    NilUser,

    #[error("user {0} is listed more than once")]
    DuplicateUser(UserId),

    #[error("{policy} split needs one value per user: expected {expected}, got {found}")]
    LengthMismatch {
        policy: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid percent value {0}")]
    PercentOutOfRange(f64),

    #[error("summation of percents should be 100, got {0}")]
    PercentSum(f64),

    #[error("invalid exact value {0}")]
    NegativeValue(f64),

    #[error("summation of values should be equal to amount lent: expected {expected}, got {found}")]
    ExactSum { expected: f64, found: f64 },
}

impl ExpenseRequest {
    pub fn category(&self) -> String {
        self.category
            .clone()
            .unwrap_or_else(|| self.policy.name().to_string())
    }

    pub fn validate(&self) -> Result<(), SplitError> {
        if !(self.amount > 0.0 && self.amount.is_finite()) {
            return Err(SplitError::InvalidAmount(self.amount));
        }
        if self.payer_id.is_nil() {
            return Err(SplitError::NilPayer);
        }

        let policy = self.policy.name();
        let min = self.policy.min_users();
        if self.users.len() < min {
            return Err(SplitError::TooFewUsers {
                policy,
                min,
                found: self.users.len(),
            });
        }

        let mut seen = HashSet::with_capacity(self.users.len());
        for user in &self.users {
            if user.is_nil() {
                return Err(SplitError::NilUser);
            }
            if !seen.insert(*user) {
                return Err(SplitError::DuplicateUser(*user));
            }
        }

        match &self.policy {
            SplitPolicy::Equal => Ok(()),
            SplitPolicy::Percent { percents } => {
                self.check_len(percents)?;
                if let Some(bad) = percents.iter().find(|p| !(0.0..=100.0).contains(*p)) {
                    return Err(SplitError::PercentOutOfRange(*bad));
                }
                let sum: f64 = percents.iter().sum();
                if sum != 100.0 {
                    return Err(SplitError::PercentSum(sum));
                }
                Ok(())
            }
            SplitPolicy::Exact { values } => {
                self.check_len(values)?;
                if let Some(bad) = values.iter().find(|v| !(**v >= 0.0)) {
                    return Err(SplitError::NegativeValue(*bad));
                }
                let sum: f64 = values.iter().sum();
                if sum != self.amount {
                    return Err(SplitError::ExactSum {
                        expected: self.amount,
                        found: sum,
                    });
                }
                Ok(())
            }
        }
    }

    fn check_len(&self, values: &[f64]) -> Result<(), SplitError> {
        if values.len() != self.users.len() {
            return Err(SplitError::LengthMismatch {
                policy: self.policy.name(),
                expected: self.users.len(),
                found: values.len(),
            });
        }
        Ok(())
    }

    /// Validates the request and computes what each borrower owes the payer.
    ///
    /// The payer's own portion and zero-valued portions produce no share.
    pub fn split(&self) -> Result<Vec<BorrowerShare>, SplitError> {
        self.validate()?;

        let amounts: Vec<f64> = match &self.policy {
            SplitPolicy::Equal => {
                let amount_per_user = self.amount / self.users.len() as f64;
                vec![amount_per_user; self.users.len()]
            }
            SplitPolicy::Percent { percents } => percents
                .iter()
                .map(|percent| percent * self.amount / 100.0)
                .collect(),
            SplitPolicy::Exact { values } => values.clone(),
        };

        Ok(self
            .users
            .iter()
            .zip(amounts)
            .filter(|(user, amount)| **user != self.payer_id && *amount > 0.0)
            .map(|(user, amount)| BorrowerShare {
                borrower_id: *user,
                amount,
            })
            .collect())
    }
}

impl BorrowerShare {
    /// The borrower owes the payer their share.
    pub fn debt_to(&self, payer_id: UserId) -> DirectedDebt {
        DirectedDebt {
            creditor_id: payer_id,
            debtor_id: self.borrower_id,
            amount: self.amount,
        }
    }
}
