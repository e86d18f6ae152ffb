//! Paying off a pair's balance.
//!
//! The zeroed ledger row and the paid flags of the shares behind it are written
//! in one store transaction. The row is read inside that transaction and the
//! zeroing write only applies if the amount is still the one that was checked,
//! so a debt merged concurrently fails the settlement instead of being wiped.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, StoreError};
use crate::ledger::{validate_pair, Ledger};
use crate::pair::pair_id;
use crate::schemas::{PairId, UserId};
use crate::store::{Store, StoreTransaction};

/// Receipt of a completed settlement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub pair_id: PairId,
    pub creditor_id: UserId,
    pub debtor_id: UserId,
    pub amount: f64,
    /// Expenses whose shares were flagged paid, in either direction.
    pub expenses_marked: u64,
}

impl<S: Store> Ledger<S> {
    /// `debtor` pays `creditor` the full outstanding balance of their pair.
    ///
    /// `claimed` must equal what `debtor` currently owes `creditor`, otherwise
    /// the call fails with [`LedgerError::AmountMismatch`] carrying the real
    /// figure and nothing is written.
    #[instrument(skip(self))]
    pub async fn settle(&self, creditor: UserId, debtor: UserId, claimed: f64) -> Result<Settlement, LedgerError> {
        validate_pair(creditor, debtor)?;
        if !(claimed > 0.0 && claimed.is_finite()) {
            return Err(LedgerError::Validation(format!(
                "settlement amount must be a positive number, got {claimed}"
            )));
        }

        let settlement = self
            .timed("settle", settle_tx(self.store().as_ref(), creditor, debtor, claimed))
            .await?;

        info!(
            pair_id = %settlement.pair_id,
            amount = settlement.amount,
            expenses_marked = settlement.expenses_marked,
            "balance settled"
        );
        Ok(settlement)
    }
}

async fn settle_tx<S: Store>(
    store: &S,
    creditor: UserId,
    debtor: UserId,
    claimed: f64,
) -> Result<Settlement, LedgerError> {
    let mut tx = store.begin().await?;
    match settle_in(tx.as_mut(), creditor, debtor, claimed).await {
        Ok(settlement) => {
            tx.commit().await?;
            Ok(settlement)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "settlement rollback failed");
            }
            Err(err)
        }
    }
}

async fn settle_in(
    tx: &mut dyn StoreTransaction,
    creditor: UserId,
    debtor: UserId,
    claimed: f64,
) -> Result<Settlement, LedgerError> {
    let pair_id = pair_id(creditor, debtor);
    let lend = tx
        .find_lend(pair_id)
        .await?
        .filter(|lend| lend.involves_pair(creditor, debtor))
        .ok_or_else(|| LedgerError::NotFound(format!("no balance between {creditor} and {debtor}")))?;

    let outstanding = lend.outstanding(creditor, debtor).unwrap_or_default();
    if outstanding <= 0.0 || claimed != outstanding {
        return Err(LedgerError::AmountMismatch { claimed, outstanding });
    }

    if !tx.update_lend_amount(pair_id, lend.amount, 0.0).await? {
        return Err(StoreError::Conflict(format!("balance of pair {pair_id} changed during settlement")).into());
    }

    // Shares in the reverse direction were netted into the same balance.
    let forward = tx.mark_shares_paid(creditor, debtor).await?;
    let reverse = tx.mark_shares_paid(debtor, creditor).await?;

    Ok(Settlement {
        pair_id,
        creditor_id: creditor,
        debtor_id: debtor,
        amount: outstanding,
        expenses_marked: forward + reverse,
    })
}
