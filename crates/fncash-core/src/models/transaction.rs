use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Whether money left or entered the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Income => write!(f, "income"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Not-a-number when the backend sent something unparsable
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: f64,
    /// Category label as assigned by the backend; the taxonomy is not modeled here
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "audioUrl", default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Amounts arrive as JSON numbers or as decimal strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
    Null(()),
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n,
        RawAmount::Text(text) => text.trim().parse().unwrap_or(f64::NAN),
        RawAmount::Null(()) => f64::NAN,
    };
    Ok(amount)
}

impl Transaction {
    /// Amount with the sign of its direction (expenses negative)
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionType::Expense => -self.amount,
            TransactionType::Income => self.amount,
        }
    }
}

/// Body for creating a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransaction {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub amount: f64,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "audioFile", default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

/// Body for a partial update. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "audioFile", skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

/// Optional filters for listing transactions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilters {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
}

impl TransactionFilters {
    /// Query parameters for the list endpoint
    pub fn query_pairs(&self, user_id: &str) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("userId", user_id.to_string())];
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.to_rfc3339()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.to_rfc3339()));
        }
        if let Some(ref category) = self.category {
            pairs.push(("category", category.clone()));
        }
        pairs
    }
}

/// Wrapper the backend puts around single-transaction results
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEnvelope {
    pub success: bool,
    pub data: Option<Transaction>,
    pub error: Option<String>,
}

impl TransactionEnvelope {
    /// The wrapped transaction, or the server's error text
    pub fn into_result(self) -> Result<Transaction, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self
                .error
                .unwrap_or_else(|| "Unknown error in transaction response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TRANSACTION_JSON: &str = r#"{
        "id": "t1",
        "userId": "u1",
        "amount": 42.5,
        "category": "Transporte",
        "type": "expense",
        "description": "Uber",
        "date": "2025-03-01T12:00:00Z"
    }"#;

    #[test]
    fn test_parse_transaction() {
        let t: Transaction =
            serde_json::from_str(TRANSACTION_JSON).expect("Failed to parse transaction JSON");
        assert_eq!(t.user_id, "u1");
        assert_eq!(t.kind, TransactionType::Expense);
        assert_eq!(t.audio_url, None);
        assert_eq!(t.date, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(t.signed_amount(), -42.5);
    }

    #[test]
    fn test_create_payload_uses_backend_field_names() {
        let payload = CreateTransaction {
            user_id: "u1".to_string(),
            amount: 10.0,
            category: "Compras".to_string(),
            kind: TransactionType::Income,
            description: "Refund".to_string(),
            date: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            audio_file: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["type"], "income");
        assert!(value.get("audioFile").is_none());
    }

    #[test]
    fn test_amount_accepts_numeric_strings() {
        let t: Transaction = serde_json::from_str(
            &TRANSACTION_JSON.replace("42.5", "\" 12.50 \""),
        )
        .unwrap();
        assert_eq!(t.amount, 12.5);

        let bad: Transaction =
            serde_json::from_str(&TRANSACTION_JSON.replace("42.5", "\"abc\"")).unwrap();
        assert!(bad.amount.is_nan());

        let null: Transaction =
            serde_json::from_str(&TRANSACTION_JSON.replace("42.5", "null")).unwrap();
        assert!(null.amount.is_nan());
    }

    #[test]
    fn test_update_payload_sends_only_set_fields() {
        let update = UpdateTransaction {
            amount: Some(20.0),
            kind: Some(TransactionType::Income),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({"amount": 20.0, "type": "income"}));
    }

    #[test]
    fn test_filters_query_pairs() {
        let filters = TransactionFilters {
            category: Some("Saúde".to_string()),
            ..Default::default()
        };
        let pairs = filters.query_pairs("u1");
        assert_eq!(
            pairs,
            vec![("userId", "u1".to_string()), ("category", "Saúde".to_string())]
        );
    }

    #[test]
    fn test_envelope_failure_carries_server_error() {
        let envelope: TransactionEnvelope =
            serde_json::from_str(r#"{"success": false, "error": "amount required"}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap_err(), "amount required");

        let missing: TransactionEnvelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(
            missing.into_result().unwrap_err(),
            "Unknown error in transaction response"
        );
    }
}
