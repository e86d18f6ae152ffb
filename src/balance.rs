use std::collections::HashMap;

use serde::Serialize;

use crate::schemas::{Lend, UserId};

/// What each counterparty owes one user; negative when the user owes them.
pub type Balance = HashMap<UserId, f64>;

pub fn compute_balance_from_lends(user: UserId, lends: &[Lend]) -> Balance {
    let mut balance = Balance::new();
    for (counterparty, amount) in lends.iter().filter_map(|lend| lend.counterparty_of(user)) {
        balance
            .entry(counterparty)
            .and_modify(|v| *v += amount)
            .or_insert(amount);
    }
    balance
}

/// Overall position of a user across all pairs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub user_id: UserId,
    /// Total owed to the user.
    pub receivable: f64,
    /// Total the user owes.
    pub payable: f64,
    pub balance: Balance,
}

impl Position {
    pub fn from_lends(user_id: UserId, lends: &[Lend]) -> Self {
        let balance = compute_balance_from_lends(user_id, lends);
        let receivable = balance.values().filter(|v| **v > 0.0).sum();
        let payable = -balance.values().filter(|v| **v < 0.0).sum::<f64>();
        Self {
            user_id,
            receivable,
            payable,
            balance,
        }
    }

    pub fn net(&self) -> f64 {
        self.receivable - self.payable
    }
}
