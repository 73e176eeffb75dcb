use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::AppError;

const ANONYMOUS_KEY: &str = "anonymous";

/// Identifies the caller a conversation and purchase history belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserKey {
    Account(i64),
    Anonymous,
}

impl UserKey {
    pub fn from_account(id: Option<i64>) -> Self {
        match id {
            Some(id) => UserKey::Account(id),
            None => UserKey::Anonymous,
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        match self {
            UserKey::Account(id) => Some(*id),
            UserKey::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, UserKey::Anonymous)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::Account(id) => write!(f, "{}", id),
            UserKey::Anonymous => f.write_str(ANONYMOUS_KEY),
        }
    }
}

impl FromStr for UserKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(ANONYMOUS_KEY) {
            return Ok(UserKey::Anonymous);
        }
        trimmed
            .parse::<i64>()
            .map(UserKey::Account)
            .map_err(|_| AppError::ValidationError(format!("Invalid user key: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: String,
    pub query: String,
    pub response: String,
}

impl ConversationEntry {
    pub fn new(query: &str, response: &str) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            query: query.to_string(),
            response: response.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_display_and_parse() {
        assert_eq!(UserKey::Account(42).to_string(), "42");
        assert_eq!(UserKey::Anonymous.to_string(), "anonymous");
        assert_eq!("42".parse::<UserKey>().unwrap(), UserKey::Account(42));
        assert_eq!("Anonymous".parse::<UserKey>().unwrap(), UserKey::Anonymous);
        assert!("abc".parse::<UserKey>().is_err());
    }

    #[test]
    fn test_from_account() {
        assert_eq!(UserKey::from_account(Some(7)), UserKey::Account(7));
        assert!(UserKey::from_account(None).is_anonymous());
    }
}
