//! Data models shared by the session core and the domain clients.
//!
//! - `User`: profile returned alongside the credential at login
//! - `Transaction` and its request payloads and list filters
//! - `summary`: totals, balance and per-category figures over transactions

pub mod summary;
pub mod transaction;
pub mod user;

pub use summary::Summary;
pub use transaction::{
    CreateTransaction, Transaction, TransactionEnvelope, TransactionFilters, TransactionType,
    UpdateTransaction,
};
pub use user::User;
