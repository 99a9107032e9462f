//! Error types shared by the ingestion pipeline and the DDL executor.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration missing or invalid
    E001InvalidConfig,
    /// E002: Execution date is not `YYYY-MM-DD`
    E002InvalidDate,
    /// E003: Source or service unreachable, or credentials rejected
    E003ConnectionFailed,
    /// E004: Query against the source failed
    E004QueryFailed,
    /// E005: File, folder or credentials path does not exist
    E005NotFound,
    /// E006: Input bytes could not be decoded
    E006DecodeFailure,
    /// E007: Encoding or writing the output failed
    E007WriteFailure,
    /// E008: Warehouse rejected a statement
    E008WarehouseFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidConfig => "E001",
            Self::E002InvalidDate => "E002",
            Self::E003ConnectionFailed => "E003",
            Self::E004QueryFailed => "E004",
            Self::E005NotFound => "E005",
            Self::E006DecodeFailure => "E006",
            Self::E007WriteFailure => "E007",
            Self::E008WarehouseFailure => "E008",
        }
    }
}

/// Errors that can occur while ingesting data or running warehouse DDL
#[derive(Debug, Error)]
pub enum IngestError {
    /// Invalid or missing configuration
    #[error("[{code}] Invalid configuration: {message}")]
    Config { code: &'static str, message: String },

    /// Execution date did not match `YYYY-MM-DD`
    #[error("[{code}] Invalid date format: {input}. Expected YYYY-MM-DD")]
    Validation { code: &'static str, input: String },

    /// Could not reach the source or authenticate
    #[error("[{code}] Connection to {target} failed: {reason}")]
    Connection {
        code: &'static str,
        target: String,
        reason: String,
    },

    /// Query against the source failed
    #[error("[{code}] Query failed: {reason}")]
    Query { code: &'static str, reason: String },

    /// Required path does not exist
    #[error("[{code}] {what} not found: {path}")]
    NotFound {
        code: &'static str,
        what: String,
        path: String,
    },

    /// Input could not be decoded with the configured encoding
    #[error("[{code}] Failed to decode '{path}' as {encoding}: {reason}")]
    Decode {
        code: &'static str,
        path: String,
        encoding: String,
        reason: String,
    },

    /// Encoding or writing the output failed
    #[error("[{code}] Write operation failed: {message}")]
    Write { code: &'static str, message: String },

    /// Warehouse rejected a statement
    #[error("[{code}] Warehouse error: {message}")]
    Warehouse { code: &'static str, message: String },
}

impl IngestError {
    /// Create an invalid config error with error code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::E001InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    /// Create a date validation error with error code
    pub fn validation(input: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::E002InvalidDate.as_str(),
            input: input.into(),
        }
    }

    /// Create a connection error with error code
    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            code: ErrorCode::E003ConnectionFailed.as_str(),
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a query error with error code
    pub fn query(reason: impl ToString) -> Self {
        Self::Query {
            code: ErrorCode::E004QueryFailed.as_str(),
            reason: reason.to_string(),
        }
    }

    /// Create a not-found error with error code
    pub fn not_found(what: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::E005NotFound.as_str(),
            what: what.into(),
            path: path.into(),
        }
    }

    /// Create a decode error with error code
    pub fn decode(
        path: impl Into<String>,
        encoding: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Decode {
            code: ErrorCode::E006DecodeFailure.as_str(),
            path: path.into(),
            encoding: encoding.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a write failure error with error code
    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::Write {
            code: ErrorCode::E007WriteFailure.as_str(),
            message: message.into(),
        }
    }

    /// Create a warehouse error with error code
    pub fn warehouse(message: impl Into<String>) -> Self {
        Self::Warehouse {
            code: ErrorCode::E008WarehouseFailure.as_str(),
            message: message.into(),
        }
    }

    /// The stable code attached to this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config { .. } => ErrorCode::E001InvalidConfig,
            Self::Validation { .. } => ErrorCode::E002InvalidDate,
            Self::Connection { .. } => ErrorCode::E003ConnectionFailed,
            Self::Query { .. } => ErrorCode::E004QueryFailed,
            Self::NotFound { .. } => ErrorCode::E005NotFound,
            Self::Decode { .. } => ErrorCode::E006DecodeFailure,
            Self::Write { .. } => ErrorCode::E007WriteFailure,
            Self::Warehouse { .. } => ErrorCode::E008WarehouseFailure,
        }
    }
}

/// Result type alias for IngestError
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_codes() {
        let err = IngestError::validation("2024-13-01");
        assert_eq!(err.code(), ErrorCode::E002InvalidDate);
        assert_eq!(
            err.to_string(),
            "[E002] Invalid date format: 2024-13-01. Expected YYYY-MM-DD"
        );

        let err = IngestError::not_found("CSV file", "data/users.csv");
        assert_eq!(err.to_string(), "[E005] CSV file not found: data/users.csv");
    }
}
