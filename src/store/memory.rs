use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{Filter, Store, StoreTransaction};
use crate::error::StoreError;
use crate::schemas::{Expense, ExpenseField, ExpenseId, Lend, LendField, PairId, UserId};

#[derive(Debug, Default, Clone)]
struct Tables {
    lends: HashMap<PairId, Lend>,
    expenses: BTreeMap<ExpenseId, Expense>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every operation takes one lock over all tables, and a
/// transaction keeps holding it until it commits or rolls back.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.expenses.contains_key(&expense.id) {
            return Err(StoreError::Conflict(format!("expense {} already exists", expense.id)));
        }
        tables.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    async fn find_expenses(&self, filter: &Filter<ExpenseField>) -> Result<Vec<Expense>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .expenses
            .values()
            .filter(|expense| filter.matches(*expense))
            .cloned()
            .collect())
    }

    async fn upsert_lend(&self, lend: &Lend) -> Result<Lend, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = match tables.lends.entry(lend.pair_id) {
            Entry::Vacant(slot) => slot.insert(lend.clone()),
            Entry::Occupied(slot) => {
                let row = slot.into_mut();
                if !row.fold(lend.creditor_id, lend.debtor_id, lend.amount) {
                    return Err(StoreError::Conflict(format!(
                        "pair key {} is held by another pair",
                        lend.pair_id
                    )));
                }
                row
            }
        };
        debug!(pair_id = %stored.pair_id, amount = stored.amount, "lend upserted");
        Ok(stored.clone())
    }

    async fn find_lends(&self, filter: &Filter<LendField>) -> Result<Vec<Lend>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .lends
            .values()
            .filter(|lend| filter.matches(*lend))
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        let snapshot = Some(tables.clone());
        Ok(Box::new(InMemoryTransaction { tables, snapshot }))
    }
}

/// Holds the store lock for its whole lifetime; restores the snapshot taken at
/// `begin` unless committed.
pub struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    snapshot: Option<Tables>,
}

impl InMemoryTransaction {
    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables = snapshot;
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.restore();
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_lend(&mut self, pair_id: PairId) -> Result<Option<Lend>, StoreError> {
        Ok(self.tables.lends.get(&pair_id).cloned())
    }

    async fn update_lend_amount(
        &mut self,
        pair_id: PairId,
        expected: f64,
        amount: f64,
    ) -> Result<bool, StoreError> {
        match self.tables.lends.get_mut(&pair_id) {
            Some(lend) if lend.amount == expected => {
                lend.amount = amount;
                lend.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_shares_paid(&mut self, payer_id: UserId, borrower_id: UserId) -> Result<u64, StoreError> {
        let touched = self
            .tables
            .expenses
            .values_mut()
            .map(|expense| expense.mark_paid(payer_id, borrower_id))
            .filter(|marked| *marked > 0)
            .count();
        Ok(touched as u64)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.restore();
        Ok(())
    }
}
