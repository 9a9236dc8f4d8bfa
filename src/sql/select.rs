//! Select clauses
//!
//! A select clause decides the output columns of a statement. The
//! statistics wrapper appends the `total_rows` side-channel column, either
//! computing it with a window function or carrying it from a staged
//! temporary table that already computed it.

use super::command::CommandBuilder;
use crate::schema::{DATA_COLUMN, DOCUMENT_ALIAS};

/// Name of the side-channel column holding the unpaged result count
pub const STATS_COLUMN_NAME: &str = "total_rows";

/// Column every single-value select is aliased to
const RESULT_COLUMN: &str = "data";

/// Where the statistics column of a wrapped clause comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    /// `count(*) OVER() as total_rows`
    Compute,
    /// Already present in the source table
    Carry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectClause {
    /// The stored JSON document
    Documents,
    /// Every column of the source, used to stage rows in a temporary table
    AllColumns,
    /// A single located value
    Projection { locator: String },
    Count,
    Any,
    WithStatistics {
        inner: Box<SelectClause>,
        source: StatsSource,
    },
}

impl SelectClause {
    pub fn with_statistics(self, source: StatsSource) -> Self {
        match self {
            SelectClause::WithStatistics { inner, .. } => SelectClause::WithStatistics { inner, source },
            other => SelectClause::WithStatistics {
                inner: Box::new(other),
                source,
            },
        }
    }

    /// Output columns in order
    pub fn select_fields(&self) -> Vec<String> {
        match self {
            SelectClause::Documents => vec![format!("{}.{}", DOCUMENT_ALIAS, DATA_COLUMN)],
            SelectClause::AllColumns => vec![format!("{}.*", DOCUMENT_ALIAS)],
            SelectClause::Projection { locator } => vec![format!("{} as {}", locator, RESULT_COLUMN)],
            SelectClause::Count => vec![format!("count(*) as {}", RESULT_COLUMN)],
            SelectClause::Any => vec![format!("(count(*) > 0) as {}", RESULT_COLUMN)],
            SelectClause::WithStatistics { inner, source } => {
                let mut fields = inner.select_fields();
                match source {
                    StatsSource::Compute => {
                        fields.push(format!("count(*) OVER() as {}", STATS_COLUMN_NAME))
                    }
                    StatsSource::Carry => fields.push(STATS_COLUMN_NAME.to_string()),
                }
                fields
            }
        }
    }

    /// Index of the statistics column in each row, if any
    pub fn stats_column(&self) -> Option<usize> {
        match self {
            SelectClause::WithStatistics { inner, .. } => Some(inner.select_fields().len()),
            _ => None,
        }
    }

    /// Aggregates produce exactly one row and cannot be ordered or paged
    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectClause::Count | SelectClause::Any)
    }

    pub fn apply(&self, sql: &mut CommandBuilder) {
        sql.append("select ");
        sql.append(&self.select_fields().join(", "));
    }
}
