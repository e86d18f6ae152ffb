//! Persistence seam of the ledger.
//!
//! A [`Store`] offers create, read-by-filter, upsert-with-merge and
//! transactional updates over the two collections the ledger touches. The
//! merge rule of [`Store::upsert_lend`] must run as one atomic write on the
//! backend; concurrent upserts of the same pair must never lose an update.
//!
//! Dropping a [`StoreTransaction`] without committing rolls it back.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schemas::{Column, Entity, Expense, ExpenseField, Lend, LendField, PairId, UserId, Value};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

/// How the clauses of a [`Filter`] combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    All,
    Any,
}

/// Equality filter over the typed fields of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter<F: Column> {
    pub mode: Match,
    pub clauses: Vec<(F, Value)>,
}

impl<F: Column> Filter<F> {
    pub fn all(clauses: Vec<(F, Value)>) -> Self {
        Self {
            mode: Match::All,
            clauses,
        }
    }

    pub fn any(clauses: Vec<(F, Value)>) -> Self {
        Self {
            mode: Match::Any,
            clauses,
        }
    }

    pub fn matches<E>(&self, entity: &E) -> bool
    where
        E: Entity<Field = F>,
    {
        let hit = |(field, value): &(F, Value)| entity.value_of(*field).as_ref() == Some(value);
        match self.mode {
            Match::All => self.clauses.iter().all(hit),
            Match::Any => self.clauses.iter().any(hit),
        }
    }
}

impl Filter<LendField> {
    pub fn pair(pair_id: PairId) -> Self {
        Self::all(vec![(LendField::PairId, Value::Id(pair_id))])
    }

    /// Rows where `user` is either party.
    pub fn involving(user: UserId) -> Self {
        Self::any(vec![
            (LendField::CreditorId, Value::Id(user)),
            (LendField::DebtorId, Value::Id(user)),
        ])
    }
}

impl Filter<ExpenseField> {
    pub fn expense(id: uuid::Uuid) -> Self {
        Self::all(vec![(ExpenseField::Id, Value::Id(id))])
    }

    pub fn paid_by(payer_id: UserId) -> Self {
        Self::all(vec![(ExpenseField::PayerId, Value::Id(payer_id))])
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError>;

    async fn find_expenses(&self, filter: &Filter<ExpenseField>) -> Result<Vec<Expense>, StoreError>;

    /// Inserts `lend` if its pair has no row yet, otherwise folds
    /// `lend.amount` into the existing row (see [`Lend::fold`]). Returns the row
    /// as stored after the write.
    async fn upsert_lend(&self, lend: &Lend) -> Result<Lend, StoreError>;

    async fn find_lends(&self, filter: &Filter<LendField>) -> Result<Vec<Lend>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Writes that commit or roll back together.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_lend(&mut self, pair_id: PairId) -> Result<Option<Lend>, StoreError>;

    /// Sets the amount of a row if it still holds `expected`. Returns `false`
    /// when the row is missing or has changed.
    async fn update_lend_amount(
        &mut self,
        pair_id: PairId,
        expected: f64,
        amount: f64,
    ) -> Result<bool, StoreError>;

    /// Flags unpaid shares of `borrower_id` in expenses paid by `payer_id`.
    /// Returns the number of expenses touched.
    async fn mark_shares_paid(&mut self, payer_id: UserId, borrower_id: UserId) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
