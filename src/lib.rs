pub mod compiled;
pub mod config;
pub mod error;
pub mod query;
pub mod schema;
pub mod session;
pub mod sql;
pub mod store;
pub mod value;

pub use compiled::{CompiledQuery, CompiledQueryPlan, PlanCache, ProbeValues, QueryMembers, TemplateValue};
pub use config::{EnumStorage, StoreOptions};
pub use error::{DbError, DbResult};
pub use query::{elem, field, matches_sql, Expr, PagedResult, Query, QueryDefinition};
pub use schema::{Document, DocumentMapping, DocumentMappingBuilder, DocumentRegistry};
pub use session::{JsonSerializer, QueryStatistics, ResultSet, Row, Serializer, Session, TempTableNames};
pub use sql::{Command, PARAMETER_PLACEHOLDER, STATS_COLUMN_NAME};
pub use store::{DocumentStore, QuerySession};
pub use value::{QueryEnum, SqlValue, ValueType};
