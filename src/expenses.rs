use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::schemas::{Expense, ExpenseId};
use crate::split::ExpenseRequest;
use crate::store::{Filter, Store};

/// Records expenses and feeds their shares into the ledger.
pub struct ExpenseService<S> {
    ledger: Ledger<S>,
}

impl<S> Clone for ExpenseService<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: Store> ExpenseService<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    /// Splits the request, stores the expense with its shares and applies one
    /// debt per share.
    ///
    /// If applying the debts fails part-way the expense stays recorded and the
    /// debts that went through stay applied.
    #[instrument(skip_all, fields(payer_id = %request.payer_id, amount = request.amount))]
    pub async fn create(&self, request: ExpenseRequest) -> Result<Expense, LedgerError> {
        let shares = request.split()?;
        let expense = Expense::new(
            request.category(),
            request.amount,
            request.description.clone(),
            request.payer_id,
            shares.iter().map(|share| (share.borrower_id, share.amount)),
        );

        let store = self.ledger.store();
        self.ledger
            .timed("insert_expense", async {
                store.insert_expense(&expense).await.map_err(LedgerError::from)
            })
            .await?;

        self.ledger
            .apply_all(shares.iter().map(|share| share.debt_to(request.payer_id)))
            .await?;

        info!(expense_id = %expense.id, borrowers = expense.borrowers.len(), "expense added");
        Ok(expense)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: ExpenseId) -> Result<Expense, LedgerError> {
        if id == Uuid::nil() {
            return Err(LedgerError::Validation("expense id is malformed".to_string()));
        }
        let store = self.ledger.store();
        let filter = Filter::expense(id);
        let expenses = self
            .ledger
            .timed("get_expense", async {
                store.find_expenses(&filter).await.map_err(LedgerError::from)
            })
            .await?;

        expenses
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound(format!("expense {id}")))
    }
}
