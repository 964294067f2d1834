//! Transaction endpoints.

use serde::Deserialize;
use tracing::debug;

use crate::models::{
    CreateTransaction, Summary, Transaction, TransactionEnvelope, TransactionFilters,
    UpdateTransaction,
};

use super::{ApiClient, ApiError};

const TRANSACTIONS_PATH: &str = "/transactions";

/// List responses arrive either bare or wrapped like single results
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransactionList {
    Bare(Vec<Transaction>),
    Wrapped { data: Vec<Transaction> },
}

/// Client for `/transactions`. Every call goes through the shared transport,
/// so errors (including `SessionExpired`) reach the caller unchanged.
#[derive(Clone)]
pub struct TransactionService {
    api: ApiClient,
}

impl TransactionService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn item_path(id: &str) -> String {
        format!("{}/{}", TRANSACTIONS_PATH, id)
    }

    fn unwrap_envelope(envelope: TransactionEnvelope) -> Result<Transaction, ApiError> {
        envelope.into_result().map_err(ApiError::InvalidResponse)
    }

    /// Create a transaction and return it as stored by the backend
    pub async fn create(&self, payload: &CreateTransaction) -> Result<Transaction, ApiError> {
        debug!(kind = %payload.kind, category = %payload.category, "Creating transaction");
        let envelope: TransactionEnvelope = self.api.post(TRANSACTIONS_PATH, payload).await?;
        Self::unwrap_envelope(envelope)
    }

    /// Fetch a user's transactions, optionally filtered
    pub async fn list(
        &self,
        user_id: &str,
        filters: &TransactionFilters,
    ) -> Result<Vec<Transaction>, ApiError> {
        let query = filters.query_pairs(user_id);
        let list: TransactionList = self.api.get_with_query(TRANSACTIONS_PATH, &query).await?;
        let transactions = match list {
            TransactionList::Bare(items) => items,
            TransactionList::Wrapped { data } => data,
        };
        debug!(count = transactions.len(), "Transactions fetched");
        Ok(transactions)
    }

    /// Dashboard figures for the transactions `list` would return
    pub async fn summary(
        &self,
        user_id: &str,
        filters: &TransactionFilters,
    ) -> Result<Summary, ApiError> {
        let transactions = self.list(user_id, filters).await?;
        Ok(Summary::from_transactions(&transactions))
    }

    pub async fn get(&self, id: &str) -> Result<Transaction, ApiError> {
        let envelope: TransactionEnvelope = self.api.get(&Self::item_path(id)).await?;
        Self::unwrap_envelope(envelope)
    }

    /// Change only the fields set in `changes`
    pub async fn update(
        &self,
        id: &str,
        changes: &UpdateTransaction,
    ) -> Result<Transaction, ApiError> {
        let envelope: TransactionEnvelope = self.api.put(&Self::item_path(id), changes).await?;
        Self::unwrap_envelope(envelope)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete(&Self::item_path(id)).await
    }
}
