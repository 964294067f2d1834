//! Totals over a list of transactions.
//!
//! Amounts that are not finite (unparsable values from the backend) are
//! skipped everywhere.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};

use super::{Transaction, TransactionType};

fn finite(amount: f64) -> Option<f64> {
    amount.is_finite().then_some(amount)
}

/// Sum of the amounts of one direction
pub fn total(transactions: &[Transaction], kind: TransactionType) -> f64 {
    transactions
        .iter()
        .filter(|t| t.kind == kind)
        .filter_map(|t| finite(t.amount))
        .sum()
}

/// Income minus expenses
pub fn balance(transactions: &[Transaction]) -> f64 {
    transactions
        .iter()
        .filter_map(|t| finite(t.signed_amount()))
        .sum()
}

/// Totals per category, optionally restricted to one direction
pub fn by_category(
    transactions: &[Transaction],
    kind: Option<TransactionType>,
) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for t in transactions.iter().filter(|t| kind.map_or(true, |k| t.kind == k)) {
        if let Some(amount) = finite(t.amount) {
            *totals.entry(t.category.clone()).or_insert(0.0) += amount;
        }
    }
    totals
}

/// Transactions dated within `start..=end`
pub fn in_period<'a>(
    transactions: &'a [Transaction],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<&'a Transaction> {
    transactions
        .iter()
        .filter(|t| t.date >= start && t.date <= end)
        .collect()
}

/// Transactions dated in the given calendar month (1-12), in UTC
pub fn in_month(transactions: &[Transaction], month: u32, year: i32) -> Vec<&Transaction> {
    transactions
        .iter()
        .filter(|t| t.date.month() == month && t.date.year() == year)
        .collect()
}

/// Dashboard figures for a set of transactions
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
    pub count: usize,
    /// Mean absolute amount per transaction; zero when there are none
    pub average: f64,
}

impl Summary {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let income = total(transactions, TransactionType::Income);
        let expenses = total(transactions, TransactionType::Expense);
        let count = transactions.len();
        let average = if count > 0 {
            (income + expenses) / count as f64
        } else {
            0.0
        };
        Self {
            income,
            expenses,
            balance: balance(transactions),
            count,
            average,
        }
    }
}
