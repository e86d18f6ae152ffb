use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{LedgerError, StoreError};
use crate::pair::pair_id;
use crate::schemas::{Lend, UserId};
use crate::store::{Filter, Store};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Net balances between pairs of users, backed by a [`Store`].
///
/// Cheap to clone; clones share the store.
pub struct Ledger<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Deadline applied to every store round-trip of one operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `operation` under the ledger deadline. Anything it holds, an open
    /// transaction included, is dropped when the deadline passes.
    pub(crate) async fn timed<T, F>(&self, name: &'static str, operation: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = name, timeout = ?self.timeout, "store operation timed out");
                Err(StoreError::Timeout(self.timeout).into())
            }
        }
    }

    /// Records that `debtor` owes `creditor` a further `amount`.
    ///
    /// Merged into the pair's row in one atomic write, so retrying after a
    /// failure and applying debts in any order give the same balance.
    #[instrument(skip(self))]
    pub async fn apply_debt(&self, creditor: UserId, debtor: UserId, amount: f64) -> Result<(), LedgerError> {
        validate_pair(creditor, debtor)?;
        if !(amount > 0.0 && amount.is_finite()) {
            return Err(LedgerError::Validation(format!(
                "debt amount must be a positive number, got {amount}"
            )));
        }

        let lend = Lend::new(creditor, debtor, amount);
        let stored = self
            .timed("apply_debt", async { self.store.upsert_lend(&lend).await.map_err(LedgerError::from) })
            .await?;
        debug!(pair_id = %stored.pair_id, balance = stored.amount, "debt applied");
        Ok(())
    }

    /// Current row of `{user1, user2}`, or a zero row labelled `user1 → user2`
    /// when the pair has no history.
    ///
    /// The row keeps the labels it was created with; a negative amount means
    /// `creditor_id` is the one who owes.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user1: UserId, user2: UserId) -> Result<Lend, LedgerError> {
        validate_pair(user1, user2)?;
        let filter = Filter::pair(pair_id(user1, user2));
        let lends = self
            .timed("get_balance", async { self.store.find_lends(&filter).await.map_err(LedgerError::from) })
            .await?;

        Ok(lends
            .into_iter()
            .find(|lend| lend.involves_pair(user1, user2))
            .unwrap_or_else(|| Lend::empty(user1, user2)))
    }

    /// Every row in which `user` is one of the parties.
    #[instrument(skip(self))]
    pub async fn get_summary(&self, user: UserId) -> Result<Vec<Lend>, LedgerError> {
        validate_user(user)?;
        let filter = Filter::involving(user);
        let lends = self
            .timed("get_summary", async { self.store.find_lends(&filter).await.map_err(LedgerError::from) })
            .await?;
        info!(records = lends.len(), "lend summary loaded");
        Ok(lends)
    }
}

pub(crate) fn validate_user(user: UserId) -> Result<(), LedgerError> {
    if user.is_nil() {
        return Err(LedgerError::Validation("user id is malformed".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_pair(user1: UserId, user2: UserId) -> Result<(), LedgerError> {
    validate_user(user1)?;
    validate_user(user2)?;
    if user1 == user2 {
        return Err(LedgerError::Validation(format!("user {user1} cannot owe themself")));
    }
    Ok(())
}
