#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opensplit_ledger::schemas::{Expense, ExpenseField, Lend, LendField, PairId, UserId};
use opensplit_ledger::store::{Filter, InMemoryStore, Store, StoreTransaction};
use opensplit_ledger::{ExpenseRequest, ExpenseService, Ledger, SplitPolicy, StoreError};
use uuid::Uuid;

pub fn users<const N: usize>() -> [UserId; N] {
    std::array::from_fn(|_| Uuid::now_v7())
}

pub fn memory_ledger() -> Ledger<InMemoryStore> {
    Ledger::new(Arc::new(InMemoryStore::new()))
}

pub fn equal_split(payer_id: UserId, amount: f64, users: Vec<UserId>) -> ExpenseRequest {
    ExpenseRequest {
        policy: SplitPolicy::Equal,
        payer_id,
        amount,
        category: None,
        description: "test".to_string(),
        users,
    }
}

pub async fn expense<S: Store>(service: &ExpenseService<S>, id: Uuid) -> Expense {
    service.get(id).await.unwrap()
}

pub fn share_paid(expense: &Expense, borrower: UserId) -> bool {
    expense
        .borrowers
        .iter()
        .find(|share| share.borrower_id == borrower)
        .map(|share| share.is_paid)
        .unwrap_or_else(|| panic!("no share for {borrower}"))
}

/// In-memory store with switchable failures and delays.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    failing_debtors: Mutex<HashSet<UserId>>,
    fail_share_updates: AtomicBool,
    share_update_delay_ms: AtomicU64,
    balance_moved: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_debts_of(&self, debtor: UserId) {
        self.failing_debtors.lock().unwrap().insert(debtor);
    }

    pub fn heal(&self) {
        self.failing_debtors.lock().unwrap().clear();
        self.fail_share_updates.store(false, Ordering::SeqCst);
        self.share_update_delay_ms.store(0, Ordering::SeqCst);
        self.balance_moved.store(false, Ordering::SeqCst);
    }

    /// Conditional balance writes find the row changed, as when a debt is
    /// merged between the read and the write of a settlement.
    pub fn move_balance_under_settlement(&self) {
        self.balance_moved.store(true, Ordering::SeqCst);
    }

    pub fn fail_share_updates(&self) {
        self.fail_share_updates.store(true, Ordering::SeqCst);
    }

    pub fn delay_share_updates(&self, delay: Duration) {
        self.share_update_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.inner.insert_expense(expense).await
    }

    async fn find_expenses(&self, filter: &Filter<ExpenseField>) -> Result<Vec<Expense>, StoreError> {
        self.inner.find_expenses(filter).await
    }

    async fn upsert_lend(&self, lend: &Lend) -> Result<Lend, StoreError> {
        let failing = self.failing_debtors.lock().unwrap().contains(&lend.debtor_id);
        if failing {
            return Err(StoreError::Unavailable(format!(
                "debts of {} are failing",
                lend.debtor_id
            )));
        }
        self.inner.upsert_lend(lend).await
    }

    async fn find_lends(&self, filter: &Filter<LendField>) -> Result<Vec<Lend>, StoreError> {
        self.inner.find_lends(filter).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            fail_share_updates: self.fail_share_updates.load(Ordering::SeqCst),
            share_update_delay: Duration::from_millis(self.share_update_delay_ms.load(Ordering::SeqCst)),
            balance_moved: self.balance_moved.load(Ordering::SeqCst),
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn StoreTransaction>,
    fail_share_updates: bool,
    share_update_delay: Duration,
    balance_moved: bool,
}

#[async_trait]
impl StoreTransaction for FaultyTransaction {
    async fn find_lend(&mut self, pair_id: PairId) -> Result<Option<Lend>, StoreError> {
        self.inner.find_lend(pair_id).await
    }

    async fn update_lend_amount(
        &mut self,
        pair_id: PairId,
        expected: f64,
        amount: f64,
    ) -> Result<bool, StoreError> {
        if self.balance_moved {
            return Ok(false);
        }
        self.inner.update_lend_amount(pair_id, expected, amount).await
    }

    async fn mark_shares_paid(&mut self, payer_id: UserId, borrower_id: UserId) -> Result<u64, StoreError> {
        if !self.share_update_delay.is_zero() {
            tokio::time::sleep(self.share_update_delay).await;
        }
        if self.fail_share_updates {
            return Err(StoreError::Unavailable("share update failed".to_string()));
        }
        self.inner.mark_shares_paid(payer_id, borrower_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}
