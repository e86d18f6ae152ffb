use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::schemas::UserId;
use crate::store::Store;

/// `debtor_id` owes `creditor_id` `amount`, before it is merged into the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectedDebt {
    pub creditor_id: UserId,
    pub debtor_id: UserId,
    pub amount: f64,
}

impl<S: Store> Ledger<S> {
    /// Applies every debt on its own task and waits for all of them.
    ///
    /// Returns the error of the earliest failing debt in input order. Debts that
    /// succeeded stay applied; retrying the failed ones is safe since merges
    /// commute.
    #[instrument(skip_all, fields(debts = tracing::field::Empty))]
    pub async fn apply_all(&self, debts: impl IntoIterator<Item = DirectedDebt>) -> Result<(), LedgerError> {
        let handles: Vec<_> = debts
            .into_iter()
            .map(|debt| {
                let ledger = self.clone();
                tokio::spawn(async move {
                    ledger
                        .apply_debt(debt.creditor_id, debt.debtor_id, debt.amount)
                        .await
                })
            })
            .collect();
        tracing::Span::current().record("debts", handles.len());

        let mut first_error = None;
        let mut failed = 0usize;
        for outcome in join_all(handles).await {
            if let Err(err) = outcome.map_err(LedgerError::from).and_then(|applied| applied) {
                failed += 1;
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => {
                warn!(failed, error = %err, "fan-out finished with failures");
                Err(err)
            }
            None => Ok(()),
        }
    }
}
