use serde::{Deserialize, Serialize};

/// PostgreSQL column types used by reference tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// Variable-length string with a maximum length
    Varchar(u32),
    /// Unlimited text
    Text,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// Boolean
    Boolean,
    /// Timestamp with timezone
    Timestamptz,
}

impl SqlType {
    /// Generate the SQL type declaration.
    pub fn to_sql(&self) -> String {
        match self {
            SqlType::Varchar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamptz => "TIMESTAMPTZ".to_string(),
        }
    }

    /// Maximum character length, if the type has one.
    pub fn max_length(&self) -> Option<usize> {
        match self {
            SqlType::Varchar(len) => Some(*len as usize),
            _ => None,
        }
    }
}

/// What happens to referencing rows when a referenced row is deleted or its
/// key is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Reject the change while references exist (checked at end of statement).
    #[default]
    NoAction,
    /// Reject the change immediately.
    Restrict,
}

impl ReferentialAction {
    pub fn to_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
        }
    }
}
