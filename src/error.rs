//! Error types for SimplDB
//!
//! Every layer returns [`Result`]; only [`crate::Database::execute`] turns an
//! [`Error`] into a failed `QueryResult`. [`Error::kind`] gives the coarse
//! classification callers match on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for SimplDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexer Errors ==========
    #[error("Lexer error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Lexer error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Lexer error: invalid number format at position {0}")]
    InvalidNumber(usize),

    // ========== Parser Errors ==========
    #[error("Parse error: unexpected token '{found}' at position {position}, expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Parse error: unexpected end of input at position {position}, expected {expected}")]
    UnexpectedEof { expected: String, position: usize },

    #[error("Parse error: {0}")]
    ParseError(String),

    // ========== Schema Errors ==========
    #[error("Schema error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Schema error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Schema error: column '{0}' defined more than once in table '{1}'")]
    DuplicateColumn(String, String),

    #[error("Schema error: index '{0}' already exists")]
    IndexAlreadyExists(String),

    #[error("Schema error: {0}")]
    InvalidSchema(String),

    #[error("Schema error: cannot convert {value} to {expected} for column '{column}'")]
    TypeMismatch {
        column: String,
        value: String,
        expected: String,
    },

    #[error("Schema error: null value not allowed for column '{0}'")]
    NullNotAllowed(String),

    #[error("Schema error: value for column '{column}' exceeds maximum length {max}")]
    ValueTooLarge { column: String, max: usize },

    // ========== Constraint Errors ==========
    #[error("Unique constraint violation: duplicate key {key} in index '{index}'")]
    UniqueViolation { index: String, key: String },

    // ========== Lookup Errors ==========
    #[error("Not found: table '{0}'")]
    TableNotFound(String),

    #[error("Not found: index '{0}'")]
    IndexNotFound(String),

    #[error("Not found: row {1} in table '{0}'")]
    RowNotFound(String, u64),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("I/O error: malformed data file: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== Transaction Errors ==========
    #[error("Transaction error: transaction {0} not found")]
    TransactionNotFound(u64),

    #[error("Transaction error: transaction {0} is not active")]
    TransactionNotActive(u64),

    #[error("Transaction error: a transaction is already in progress ({0})")]
    TransactionInProgress(u64),

    #[error("Transaction error: no transaction in progress")]
    NoActiveTransaction,

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification surfaced on failed query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ParseError,
    SchemaError,
    UniqueConstraintError,
    NotFoundError,
    IOError,
    TransactionError,
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnexpectedCharacter(..)
            | Error::UnterminatedString(_)
            | Error::InvalidNumber(_)
            | Error::UnexpectedToken { .. }
            | Error::UnexpectedEof { .. }
            | Error::ParseError(_) => ErrorKind::ParseError,

            Error::TableAlreadyExists(_)
            | Error::ColumnNotFound(..)
            | Error::DuplicateColumn(..)
            | Error::IndexAlreadyExists(_)
            | Error::InvalidSchema(_)
            | Error::TypeMismatch { .. }
            | Error::NullNotAllowed(_)
            | Error::ValueTooLarge { .. } => ErrorKind::SchemaError,

            Error::UniqueViolation { .. } => ErrorKind::UniqueConstraintError,

            Error::TableNotFound(_) | Error::IndexNotFound(_) | Error::RowNotFound(..) => {
                ErrorKind::NotFoundError
            }

            Error::IoError(_) | Error::Serialization(_) => ErrorKind::IOError,

            Error::TransactionNotFound(_)
            | Error::TransactionNotActive(_)
            | Error::TransactionInProgress(_)
            | Error::NoActiveTransaction => ErrorKind::TransactionError,

            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::SchemaError => "SchemaError",
            ErrorKind::UniqueConstraintError => "UniqueConstraintError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::IOError => "IOError",
            ErrorKind::TransactionError => "TransactionError",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Result type alias for SimplDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Not found: table 'users'");

        let err = Error::UnexpectedCharacter('@', 5);
        assert_eq!(
            err.to_string(),
            "Lexer error: unexpected character '@' at position 5"
        );
    }

    #[test]
    fn test_error_kind() {
        let err = Error::UniqueViolation {
            index: "pk_users".to_string(),
            key: "1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UniqueConstraintError);
        assert_eq!(Error::NullNotAllowed("id".into()).kind(), ErrorKind::SchemaError);
        assert_eq!(Error::TransactionNotFound(9).kind(), ErrorKind::TransactionError);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::IOError);
        assert_eq!(ErrorKind::NotFoundError.to_string(), "NotFoundError");
    }
}
