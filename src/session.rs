//! Collaborators consumed by the query core: the executing session, the
//! document serializer and the per-call statistics holder.

use crate::error::{DbError, DbResult};
use crate::sql::Command;
use crate::value::SqlValue;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub type Row = Vec<SqlValue>;

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<&str>, rows: Vec<Row>) -> Self {
        Self {
            columns: columns.into_iter().map(str::to_string).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A database session able to run generated commands
#[async_trait]
pub trait Session: Send + Sync {
    /// Fresh temporary table name, unique within the session
    fn next_temp_table_name(&self) -> String;

    /// Tenant whose rows conjoined-tenancy documents are filtered to
    fn tenant_id(&self) -> &str;

    /// Run a command, returning one result set per row-producing statement
    async fn execute(&self, command: &Command) -> DbResult<Vec<ResultSet>>;
}

/// Generates `<prefix><n>` temporary table names for a session
#[derive(Debug)]
pub struct TempTableNames {
    prefix: String,
    counter: AtomicUsize,
}

impl TempTableNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn next_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, n)
    }
}

/// Decodes stored document columns
pub trait Serializer: Send + Sync {
    fn decode(&self, value: &SqlValue) -> DbResult<Value>;
}

/// Default serializer: `jsonb` columns pass through, text columns are parsed
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn decode(&self, value: &SqlValue) -> DbResult<Value> {
        match value {
            SqlValue::Json(json) => Ok(json.clone()),
            SqlValue::Text(text) => serde_json::from_str(text)
                .map_err(|e| DbError::Serialization(format!("Invalid document JSON: {}", e))),
            other => Ok(other.to_json()),
        }
    }
}

/// Receives the unpaged total row count of a query
#[derive(Debug, Default)]
pub struct QueryStatistics {
    total_results: AtomicU64,
}

impl QueryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_results(&self) -> u64 {
        self.total_results.load(Ordering::Relaxed)
    }

    pub fn set_total_results(&self, total: u64) {
        self.total_results.store(total, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_temp_table_names_are_unique() {
        let names = TempTableNames::new("mt_temp_id_list");
        assert_eq!(names.next_name(), "mt_temp_id_list1");
        assert_eq!(names.next_name(), "mt_temp_id_list2");
    }

    #[test]
    fn test_json_serializer() {
        let serializer = JsonSerializer;
        assert_eq!(
            serializer.decode(&SqlValue::Json(json!({"a": 1}))).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            serializer
                .decode(&SqlValue::Text(r#"{"b": "x"}"#.to_string()))
                .unwrap(),
            json!({"b": "x"})
        );
        assert_eq!(serializer.decode(&SqlValue::Int(4)).unwrap(), json!(4));
        assert!(matches!(
            serializer.decode(&SqlValue::Text("not json".to_string())),
            Err(DbError::Serialization(_))
        ));
    }

    #[test]
    fn test_statistics_last_value_wins() {
        let stats = QueryStatistics::new();
        assert_eq!(stats.total_results(), 0);
        stats.set_total_results(10);
        stats.set_total_results(42);
        assert_eq!(stats.total_results(), 42);
    }
}
