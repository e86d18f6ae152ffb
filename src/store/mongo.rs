//! MongoDB-backed ledger store.
//!
//! Expenses embed their shares, so flagging shares paid is a single
//! `update_many` with an array filter. The lend merge is an aggregation
//! pipeline update, which the server applies to the matched (or freshly
//! upserted) document atomically.
//!
//! Transactions need a replica set or sharded deployment.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tracing::{debug, info};

use super::{Filter, Match, Store, StoreTransaction};
use crate::error::StoreError;
use crate::schemas::{
    Column, Entity, Expense, ExpenseField, Lend, LendField, PairId, ShareField, UserId, Value,
};

impl From<Value> for Bson {
    fn from(value: Value) -> Self {
        match value {
            Value::Id(id) => Bson::String(id.to_string()),
            Value::Amount(amount) => Bson::Double(amount),
            Value::Flag(flag) => Bson::Boolean(flag),
        }
    }
}

impl<F: Column> Filter<F> {
    pub fn to_document(&self) -> Document {
        match self.mode {
            Match::All => {
                let mut filter = Document::new();
                for (field, value) in &self.clauses {
                    filter.insert(field.column(), Bson::from(*value));
                }
                filter
            }
            Match::Any if self.clauses.is_empty() => Document::new(),
            Match::Any => {
                let branches: Vec<Document> = self
                    .clauses
                    .iter()
                    .map(|(field, value)| {
                        let mut branch = Document::new();
                        branch.insert(field.column(), Bson::from(*value));
                        branch
                    })
                    .collect();
                doc! { "$or": branches }
            }
        }
    }
}

fn field_path(column: &str) -> String {
    format!("${column}")
}

fn ascending(column: &str) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(column, 1);
    IndexModel::builder().keys(keys).build()
}

/// Server code for a write that lost a race with another transaction.
const WRITE_CONFLICT: i32 = 112;

/// Write conflicts inside a transaction become [`StoreError::Conflict`]; the
/// transaction is aborted either way.
fn transaction_error(err: mongodb::error::Error) -> StoreError {
    let code = match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    };
    if code == Some(WRITE_CONFLICT) || err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        StoreError::Conflict(err.to_string())
    } else {
        StoreError::Database(err)
    }
}

fn now() -> Result<Bson, StoreError> {
    Ok(bson::to_bson(&Utc::now())?)
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connects and verifies the deployment answers a ping.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let store = Self::with_client(client, db_name);
        store.ping().await?;
        info!("Connected to MongoDB database '{}'", db_name);
        Ok(store)
    }

    pub fn with_client(client: Client, db_name: &str) -> Self {
        let database = client.database(db_name);
        Self { client, database }
    }

    fn lends(&self) -> Collection<Lend> {
        self.database.collection(Lend::COLLECTION)
    }

    fn expenses(&self) -> Collection<Expense> {
        self.database.collection(Expense::COLLECTION)
    }

    /// Secondary indexes for the summary and settlement lookups.
    pub async fn create_indexes(&self) -> Result<(), StoreError> {
        self.lends()
            .create_indexes(
                [
                    ascending(LendField::CreditorId.column()),
                    ascending(LendField::DebtorId.column()),
                ],
                None,
            )
            .await?;
        let share_borrower = format!(
            "{}.{}",
            ExpenseField::Borrowers.column(),
            ShareField::BorrowerId.column()
        );
        self.expenses()
            .create_indexes(
                [ascending(ExpenseField::PayerId.column()), ascending(&share_borrower)],
                None,
            )
            .await?;
        Ok(())
    }

    /// Pipeline that inserts or merges `lend` into its pair's row.
    ///
    /// Labels are only written when missing. The amount grows when the debt
    /// runs the way the row is labelled and shrinks when it runs the other way;
    /// a row held by a different pair keeps its amount.
    fn merge_pipeline(lend: &Lend) -> Result<Vec<Document>, StoreError> {
        let creditor = Bson::from(Value::Id(lend.creditor_id));
        let debtor = Bson::from(Value::Id(lend.debtor_id));
        let creditor_col = LendField::CreditorId.column();
        let debtor_col = LendField::DebtorId.column();
        let amount_col = LendField::Amount.column();

        let mut set = Document::new();
        set.insert(
            amount_col,
            doc! {
                "$switch": {
                    "branches": [
                        {
                            "case": { "$eq": [ { "$ifNull": [ field_path(creditor_col), creditor.clone() ] }, creditor.clone() ] },
                            "then": { "$add": [ { "$ifNull": [ field_path(amount_col), 0.0 ] }, lend.amount ] },
                        },
                        {
                            "case": { "$eq": [ field_path(creditor_col), debtor.clone() ] },
                            "then": { "$subtract": [ field_path(amount_col), lend.amount ] },
                        },
                    ],
                    "default": field_path(amount_col),
                }
            },
        );
        set.insert(creditor_col, doc! { "$ifNull": [ field_path(creditor_col), creditor ] });
        set.insert(debtor_col, doc! { "$ifNull": [ field_path(debtor_col), debtor ] });
        set.insert(LendField::UpdatedAt.column(), now()?);

        Ok(vec![doc! { "$set": set }])
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.expenses().insert_one(expense, None).await?;
        debug!(expense_id = %expense.id, "expense inserted");
        Ok(())
    }

    async fn find_expenses(&self, filter: &Filter<ExpenseField>) -> Result<Vec<Expense>, StoreError> {
        let cursor = self.expenses().find(filter.to_document(), None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn upsert_lend(&self, lend: &Lend) -> Result<Lend, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let stored = self
            .lends()
            .find_one_and_update(
                Filter::pair(lend.pair_id).to_document(),
                Self::merge_pipeline(lend)?,
                options,
            )
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("upsert of pair {} returned no row", lend.pair_id)))?;

        if !stored.involves_pair(lend.creditor_id, lend.debtor_id) {
            return Err(StoreError::Conflict(format!(
                "pair key {} is held by another pair",
                lend.pair_id
            )));
        }
        debug!(pair_id = %stored.pair_id, amount = stored.amount, "lend upserted");
        Ok(stored)
    }

    async fn find_lends(&self, filter: &Filter<LendField>) -> Result<Vec<Lend>, StoreError> {
        let cursor = self.lends().find(filter.to_document(), None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(Box::new(MongoTransaction {
            session,
            lends: self.lends(),
            expenses: self.expenses(),
        }))
    }
}

/// A `ClientSession` with a transaction in progress. The driver aborts the
/// transaction if the session is dropped before commit.
pub struct MongoTransaction {
    session: ClientSession,
    lends: Collection<Lend>,
    expenses: Collection<Expense>,
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    async fn find_lend(&mut self, pair_id: PairId) -> Result<Option<Lend>, StoreError> {
        Ok(self
            .lends
            .find_one_with_session(Filter::pair(pair_id).to_document(), None, &mut self.session)
            .await
            .map_err(transaction_error)?)
    }

    async fn update_lend_amount(
        &mut self,
        pair_id: PairId,
        expected: f64,
        amount: f64,
    ) -> Result<bool, StoreError> {
        let filter = Filter::all(vec![
            (LendField::PairId, Value::Id(pair_id)),
            (LendField::Amount, Value::Amount(expected)),
        ]);
        let mut set = Document::new();
        set.insert(LendField::Amount.column(), amount);
        set.insert(LendField::UpdatedAt.column(), now()?);

        let result = self
            .lends
            .update_one_with_session(filter.to_document(), doc! { "$set": set }, None, &mut self.session)
            .await
            .map_err(transaction_error)?;
        Ok(result.matched_count == 1)
    }

    async fn mark_shares_paid(&mut self, payer_id: UserId, borrower_id: UserId) -> Result<u64, StoreError> {
        let borrowers_col = ExpenseField::Borrowers.column();
        let borrower_col = ShareField::BorrowerId.column();
        let is_paid_col = ShareField::IsPaid.column();
        let borrower = Bson::from(Value::Id(borrower_id));
        let unpaid = Bson::from(Value::Flag(false));

        let mut share = Document::new();
        share.insert(borrower_col, borrower.clone());
        share.insert(is_paid_col, unpaid.clone());
        let mut filter = Filter::paid_by(payer_id).to_document();
        filter.insert(borrowers_col, doc! { "$elemMatch": share });

        let mut array_filter = Document::new();
        array_filter.insert(format!("share.{borrower_col}"), borrower);
        array_filter.insert(format!("share.{is_paid_col}"), unpaid);

        let mut set = Document::new();
        set.insert(format!("{borrowers_col}.$[share].{is_paid_col}"), true);

        let options = UpdateOptions::builder().array_filters(vec![array_filter]).build();
        let result = self
            .expenses
            .update_many_with_session(filter, doc! { "$set": set }, options, &mut self.session)
            .await
            .map_err(transaction_error)?;
        Ok(result.modified_count)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session
            .commit_transaction()
            .await
            .map_err(transaction_error)?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
