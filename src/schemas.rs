use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::pair::pair_id;

pub type UserId = Uuid;
pub type PairId = Uuid;
pub type ExpenseId = Uuid;

/// Ids are stored in their hyphenated text form for every serializer; bson's
/// serializer is not human readable and would otherwise write raw bytes.
mod uuid_string {
    use super::*;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let text = String::deserialize(deserializer)?;
        Uuid::parse_str(&text).map_err(serde::de::Error::custom)
    }
}

/// A typed field of a persisted entity, mapped to its storage column.
///
/// Each implementation keeps its mapping in a constant table, ordered like the
/// enum's variants, so lookups are plain indexing.
pub trait Column: Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const COLUMNS: &'static [(Self, &'static str)];

    fn column(self) -> &'static str;
}

/// Scalar values that filters compare against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Id(Uuid),
    Amount(f64),
    Flag(bool),
}

/// A persisted record that can be matched field by field.
pub trait Entity {
    type Field: Column;
    const COLLECTION: &'static str;

    /// Current value of `field`, or `None` for fields filters can't compare.
    fn value_of(&self, field: Self::Field) -> Option<Value>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LendField {
    PairId,
    CreditorId,
    DebtorId,
    Amount,
    UpdatedAt,
}

impl Column for LendField {
    const COLUMNS: &'static [(Self, &'static str)] = &[
        (LendField::PairId, "_id"),
        (LendField::CreditorId, "creditorId"),
        (LendField::DebtorId, "debtorId"),
        (LendField::Amount, "amount"),
        (LendField::UpdatedAt, "updatedAt"),
    ];

    fn column(self) -> &'static str {
        Self::COLUMNS[self as usize].1
    }
}

/// Net balance between two users.
///
/// `amount` is what `debtor_id` owes `creditor_id`. The labels are fixed when the
/// row is first written; when the debt flips direction `amount` goes negative.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lend {
    #[serde(rename = "_id", with = "uuid_string")]
    pub pair_id: PairId,
    #[serde(with = "uuid_string")]
    pub creditor_id: UserId,
    #[serde(with = "uuid_string")]
    pub debtor_id: UserId,
    pub amount: f64,
    pub updated_at: DateTime<Utc>,
}

impl Lend {
    pub fn new(creditor_id: UserId, debtor_id: UserId, amount: f64) -> Self {
        Self {
            pair_id: pair_id(creditor_id, debtor_id),
            creditor_id,
            debtor_id,
            amount,
            updated_at: Utc::now(),
        }
    }

    /// Zero balance for a pair with no history yet.
    pub fn empty(user1: UserId, user2: UserId) -> Self {
        Self::new(user1, user2, 0.0)
    }

    /// Whether this row is the ledger entry of `{a, b}` in either labelling.
    pub fn involves_pair(&self, a: UserId, b: UserId) -> bool {
        (self.creditor_id == a && self.debtor_id == b)
            || (self.creditor_id == b && self.debtor_id == a)
    }

    /// Folds a directional debt into the row. Returns `false`, leaving the row
    /// untouched, when the debt belongs to a different pair.
    pub fn fold(&mut self, creditor_id: UserId, debtor_id: UserId, amount: f64) -> bool {
        if !self.involves_pair(creditor_id, debtor_id) {
            return false;
        }
        if self.creditor_id == creditor_id {
            self.amount += amount;
        } else {
            self.amount -= amount;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Signed amount `debtor_id` owes `creditor_id` according to this row.
    /// Negative means the debt runs the other way.
    pub fn outstanding(&self, creditor_id: UserId, debtor_id: UserId) -> Option<f64> {
        if !self.involves_pair(creditor_id, debtor_id) {
            return None;
        }
        if self.creditor_id == creditor_id {
            Some(self.amount)
        } else {
            Some(-self.amount)
        }
    }

    /// The other party and what they owe `user` (negative: `user` owes them).
    pub fn counterparty_of(&self, user: UserId) -> Option<(UserId, f64)> {
        if self.creditor_id == user {
            Some((self.debtor_id, self.amount))
        } else if self.debtor_id == user {
            Some((self.creditor_id, -self.amount))
        } else {
            None
        }
    }
}

impl Entity for Lend {
    type Field = LendField;
    const COLLECTION: &'static str = "lends";

    fn value_of(&self, field: LendField) -> Option<Value> {
        match field {
            LendField::PairId => Some(Value::Id(self.pair_id)),
            LendField::CreditorId => Some(Value::Id(self.creditor_id)),
            LendField::DebtorId => Some(Value::Id(self.debtor_id)),
            LendField::Amount => Some(Value::Amount(self.amount)),
            LendField::UpdatedAt => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShareField {
    ExpenseId,
    BorrowerId,
    Amount,
    IsPaid,
}

impl Column for ShareField {
    const COLUMNS: &'static [(Self, &'static str)] = &[
        (ShareField::ExpenseId, "expenseId"),
        (ShareField::BorrowerId, "borrowerId"),
        (ShareField::Amount, "amount"),
        (ShareField::IsPaid, "isPaid"),
    ];

    fn column(self) -> &'static str {
        Self::COLUMNS[self as usize].1
    }
}

/// One borrower's portion of an expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseShare {
    #[serde(with = "uuid_string")]
    pub expense_id: ExpenseId,
    #[serde(with = "uuid_string")]
    pub borrower_id: UserId,
    pub amount: f64,
    #[serde(default)]
    pub is_paid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpenseField {
    Id,
    Category,
    Amount,
    Description,
    PayerId,
    CreatedAt,
    Borrowers,
}

impl Column for ExpenseField {
    const COLUMNS: &'static [(Self, &'static str)] = &[
        (ExpenseField::Id, "_id"),
        (ExpenseField::Category, "category"),
        (ExpenseField::Amount, "amount"),
        (ExpenseField::Description, "description"),
        (ExpenseField::PayerId, "payerId"),
        (ExpenseField::CreatedAt, "createdAt"),
        (ExpenseField::Borrowers, "borrowers"),
    ];

    fn column(self) -> &'static str {
        Self::COLUMNS[self as usize].1
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(rename = "_id", with = "uuid_string")]
    pub id: ExpenseId,
    pub category: String,
    pub amount: f64,
    pub description: String,
    #[serde(with = "uuid_string")]
    pub payer_id: UserId,
    pub created_at: DateTime<Utc>,
    pub borrowers: Vec<ExpenseShare>,
}

impl Expense {
    /// Builds a new expense, stamping every share with the generated id.
    pub fn new(
        category: String,
        amount: f64,
        description: String,
        payer_id: UserId,
        shares: impl IntoIterator<Item = (UserId, f64)>,
    ) -> Self {
        let id = Uuid::now_v7();
        let borrowers = shares
            .into_iter()
            .map(|(borrower_id, amount)| ExpenseShare {
                expense_id: id,
                borrower_id,
                amount,
                is_paid: false,
            })
            .collect();
        Self {
            id,
            category,
            amount,
            description,
            payer_id,
            created_at: Utc::now(),
            borrowers,
        }
    }

    /// Marks unpaid shares of `borrower_id` as paid when this expense was paid
    /// by `payer_id`. Returns how many shares changed.
    pub fn mark_paid(&mut self, payer_id: UserId, borrower_id: UserId) -> usize {
        if self.payer_id != payer_id {
            return 0;
        }
        let mut marked = 0;
        for share in self
            .borrowers
            .iter_mut()
            .filter(|share| share.borrower_id == borrower_id && !share.is_paid)
        {
            share.is_paid = true;
            marked += 1;
        }
        marked
    }
}

impl Entity for Expense {
    type Field = ExpenseField;
    const COLLECTION: &'static str = "expenses";

    fn value_of(&self, field: ExpenseField) -> Option<Value> {
        match field {
            ExpenseField::Id => Some(Value::Id(self.id)),
            ExpenseField::Amount => Some(Value::Amount(self.amount)),
            ExpenseField::PayerId => Some(Value::Id(self.payer_id)),
            ExpenseField::Category
            | ExpenseField::Description
            | ExpenseField::CreatedAt
            | ExpenseField::Borrowers => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_columns_match<F: Column>(value: serde_json::Value) {
        let object = value.as_object().expect("entities serialize to objects");
        for (index, (field, column)) in F::COLUMNS.iter().enumerate() {
            assert_eq!(F::COLUMNS[index].0, *field);
            assert_eq!(field.column(), *column);
            assert!(object.contains_key(*column), "missing column {column}");
        }
        assert_eq!(object.len(), F::COLUMNS.len());
    }

    #[test]
    fn lend_columns_match_serialized_keys() {
        let lend = Lend::new(Uuid::now_v7(), Uuid::now_v7(), 10.0);
        assert_columns_match::<LendField>(serde_json::to_value(lend).unwrap());
    }

    #[test]
    fn expense_columns_match_serialized_keys() {
        let expense = Expense::new(
            "equal".into(),
            20.0,
            "lunch".into(),
            Uuid::now_v7(),
            [(Uuid::now_v7(), 10.0)],
        );
        let share = serde_json::to_value(&expense.borrowers[0]).unwrap();
        assert_columns_match::<ExpenseField>(serde_json::to_value(expense).unwrap());
        assert_columns_match::<ShareField>(share);
    }

    #[test]
    fn fold_adds_same_direction_and_subtracts_reverse() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let mut lend = Lend::new(a, b, 45.0);

        assert!(lend.fold(a, b, 5.0));
        assert_eq!(lend.amount, 50.0);
        assert!(lend.fold(b, a, 80.0));
        assert_eq!(lend.amount, -30.0);
        assert_eq!((lend.creditor_id, lend.debtor_id), (a, b));
    }

    #[test]
    fn fold_rejects_foreign_pair() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let mut lend = Lend::new(a, b, 45.0);
        assert!(!lend.fold(a, Uuid::now_v7(), 5.0));
        assert_eq!(lend.amount, 45.0);
    }

    #[test]
    fn outstanding_follows_sign_convention() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let lend = Lend::new(a, b, -12.5);
        assert_eq!(lend.outstanding(a, b), Some(-12.5));
        assert_eq!(lend.outstanding(b, a), Some(12.5));
        assert_eq!(lend.outstanding(a, Uuid::now_v7()), None);
        assert_eq!(lend.counterparty_of(b), Some((a, 12.5)));
    }

    #[test]
    fn mark_paid_only_touches_matching_payer_and_borrower() {
        let payer = Uuid::now_v7();
        let b = Uuid::now_v7();
        let c = Uuid::now_v7();
        let mut expense = Expense::new("equal".into(), 90.0, String::new(), payer, [(b, 45.0), (c, 45.0)]);

        assert_eq!(expense.mark_paid(b, c), 0);
        assert_eq!(expense.mark_paid(payer, b), 1);
        assert_eq!(expense.mark_paid(payer, b), 0);
        assert!(expense.borrowers[0].is_paid);
        assert!(!expense.borrowers[1].is_paid);
    }
}
