mod common;

use std::sync::Arc;

use opensplit_ledger::store::Filter;
use opensplit_ledger::{DirectedDebt, ExpenseService, Ledger, LedgerError, Store, StoreError, UserId};

use common::{equal_split, memory_ledger, users, FaultyStore};

fn owes(debtor_id: UserId, creditor_id: UserId, amount: f64) -> DirectedDebt {
    DirectedDebt {
        creditor_id,
        debtor_id,
        amount,
    }
}

#[tokio::test]
async fn test_apply_all_applies_every_debt() {
    let [a, b, c, d] = users::<4>();
    let ledger = memory_ledger();

    ledger
        .apply_all([owes(b, a, 10.0), owes(c, a, 20.0), owes(d, a, 30.0), owes(b, a, 5.0)])
        .await
        .unwrap();

    assert_eq!(ledger.get_balance(a, b).await.unwrap().amount, 15.0);
    assert_eq!(ledger.get_balance(a, c).await.unwrap().amount, 20.0);
    assert_eq!(ledger.get_balance(a, d).await.unwrap().amount, 30.0);
}

#[tokio::test]
async fn test_apply_all_with_nothing_to_do() {
    let ledger = memory_ledger();
    ledger.apply_all(Vec::new()).await.unwrap();
}

#[tokio::test]
async fn test_partial_failure_keeps_applied_debts() {
    let [a, b, c, d] = users::<4>();
    let store = Arc::new(FaultyStore::new());
    store.fail_debts_of(c);
    let ledger = Ledger::new(store.clone());

    let err = ledger
        .apply_all([owes(b, a, 10.0), owes(c, a, 20.0), owes(d, a, 30.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(StoreError::Unavailable(_))));

    assert_eq!(ledger.get_balance(a, b).await.unwrap().amount, 10.0);
    assert_eq!(ledger.get_balance(a, c).await.unwrap().amount, 0.0);
    assert_eq!(ledger.get_balance(a, d).await.unwrap().amount, 30.0);
}

#[tokio::test]
async fn test_first_error_follows_input_order() {
    let [a, b, c, d] = users::<4>();
    let store = Arc::new(FaultyStore::new());
    store.fail_debts_of(d);
    store.fail_debts_of(c);
    let ledger = Ledger::new(store);

    let err = ledger
        .apply_all([owes(b, a, 1.0), owes(c, a, 2.0), owes(d, a, 3.0)])
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains(&c.to_string()), "{message}");
    assert!(!message.contains(&d.to_string()), "{message}");
}

#[tokio::test]
async fn test_retrying_failed_subset_matches_clean_run() {
    let [a, b, c, d] = users::<4>();
    let debts = [owes(b, a, 10.0), owes(c, a, 20.0), owes(a, c, 5.0), owes(d, b, 7.5)];

    let clean = memory_ledger();
    clean.apply_all(debts).await.unwrap();

    let store = Arc::new(FaultyStore::new());
    store.fail_debts_of(c);
    let flaky = Ledger::new(store.clone());
    assert!(flaky.apply_all(debts).await.is_err());

    store.heal();
    let failed: Vec<_> = debts.iter().copied().filter(|debt| debt.debtor_id == c).collect();
    flaky.apply_all(failed).await.unwrap();

    for (x, y) in [(a, b), (a, c), (b, d)] {
        assert_eq!(
            flaky.get_balance(x, y).await.unwrap().outstanding(x, y),
            clean.get_balance(x, y).await.unwrap().outstanding(x, y),
        );
    }
}

#[tokio::test]
async fn test_expense_stays_recorded_when_a_share_fails() {
    let [a, b, c] = users::<3>();
    let store = Arc::new(FaultyStore::new());
    store.fail_debts_of(c);
    let service = ExpenseService::new(Ledger::new(store.clone()));

    let err = service
        .create(equal_split(a, 90.0, vec![b, c]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Store(StoreError::Unavailable(_))));

    assert_eq!(service.ledger().get_balance(a, b).await.unwrap().amount, 45.0);
    assert_eq!(service.ledger().get_balance(a, c).await.unwrap().amount, 0.0);
    let recorded = store.inner.find_expenses(&Filter::paid_by(a)).await.unwrap();
    assert_eq!(recorded.len(), 1);
}
