use serde::{Deserialize, Serialize};

/// Identity returned by the login endpoint. Held in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_with_missing_fields() {
        let user: User = serde_json::from_str(r#"{"id": "u1", "email": "ana@example.com"}"#)
            .expect("Failed to parse user JSON");
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "");
        assert_eq!(user.email, "ana@example.com");
    }
}
