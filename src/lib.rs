//! Net balances between pairs of users who share expenses, and settlement of
//! those balances.
//!
//! [`Ledger`] keeps one row per unordered pair of users and merges every new
//! debt into it atomically. [`ExpenseService`] turns a split expense into such
//! debts, and [`Ledger::settle`] pays a balance off while flagging the expense
//! shares behind it as paid.

pub mod balance;
pub mod config;
pub mod error;
pub mod expenses;
pub mod fanout;
pub mod ledger;
pub mod logging;
pub mod pair;
pub mod routes;
pub mod schemas;
pub mod settlement;
pub mod split;
pub mod store;

pub use error::{LedgerError, StoreError};
pub use expenses::ExpenseService;
pub use fanout::DirectedDebt;
pub use ledger::Ledger;
pub use pair::pair_id;
pub use schemas::{Expense, ExpenseShare, Lend, PairId, UserId};
pub use settlement::Settlement;
pub use split::{ExpenseRequest, SplitPolicy};
pub use store::{InMemoryStore, MongoStore, Store, StoreTransaction};
