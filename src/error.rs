use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Member '{path}' not found on '{declaring_type}'")]
    MemberNotFound {
        path: String,
        declaring_type: String,
    },

    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    #[error("Argument out of range: {name} = {value}. {message}")]
    ArgumentOutOfRange {
        name: String,
        value: i64,
        message: String,
    },

    #[error("Compiled query planning failed: {0}")]
    PlanningFailure(String),

    #[error("Unmatched compiled query parameter: {0}")]
    UnmatchedParameter(String),

    #[error("Query execution error: {0}")]
    ExecutionError(String),

    #[error("Query execution was cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Errors raised because a query or compiled query template cannot be
    /// expressed. They are deterministic and never worth retrying.
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            DbError::MemberNotFound { .. }
                | DbError::UnsupportedQueryShape(_)
                | DbError::ArgumentOutOfRange { .. }
                | DbError::PlanningFailure(_)
                | DbError::UnmatchedParameter(_)
        )
    }

    pub(crate) fn page_number_out_of_range(value: i64) -> Self {
        DbError::ArgumentOutOfRange {
            name: "pageNumber".to_string(),
            value,
            message: "PageNumber cannot be below 1.".to_string(),
        }
    }

    pub(crate) fn page_offset_out_of_range(value: i64) -> Self {
        DbError::ArgumentOutOfRange {
            name: "pageNumber".to_string(),
            value,
            message: "The rows before this page exceed the largest row offset.".to_string(),
        }
    }

    pub(crate) fn page_size_out_of_range(value: i64) -> Self {
        DbError::ArgumentOutOfRange {
            name: "pageSize".to_string(),
            value,
            message: "PageSize cannot be below 1.".to_string(),
        }
    }
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DbError::MemberNotFound {
            path: "Address.Zip".to_string(),
            declaring_type: "Target".to_string(),
        };
        assert_eq!(err.to_string(), "Member 'Address.Zip' not found on 'Target'");

        let err = DbError::UnsupportedQueryShape("All() with a range predicate".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported query shape: All() with a range predicate"
        );

        let err = DbError::PlanningFailure("FindByNumber".to_string());
        assert_eq!(err.to_string(), "Compiled query planning failed: FindByNumber");

        let err = DbError::UnmatchedParameter("number".to_string());
        assert_eq!(err.to_string(), "Unmatched compiled query parameter: number");

        let err = DbError::Cancelled;
        assert_eq!(err.to_string(), "Query execution was cancelled");
    }

    #[test]
    fn test_page_error_wording() {
        let err = DbError::page_number_out_of_range(0);
        assert!(err
            .to_string()
            .contains("pageNumber = 0. PageNumber cannot be below 1."));

        let err = DbError::page_size_out_of_range(0);
        assert!(err
            .to_string()
            .contains("pageSize = 0. PageSize cannot be below 1."));
    }

    #[test]
    fn test_authoring_errors() {
        assert!(DbError::PlanningFailure("x".to_string()).is_authoring_error());
        assert!(DbError::UnsupportedQueryShape("x".to_string()).is_authoring_error());
        assert!(!DbError::ExecutionError("timeout".to_string()).is_authoring_error());
        assert!(!DbError::Cancelled.is_authoring_error());
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = DbError::UnmatchedParameter("name".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Unmatched compiled query parameter: name"));
    }
}
