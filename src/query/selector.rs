//! Selectors and result handlers
//!
//! A selector maps one row to a typed value. Handlers drive a selector over
//! the result set of the terminal statement and shape the final output
//! (list, single element, count...). Both are immutable and shared by every
//! execution of a compiled plan; the statistics holder is handed in per call.

use crate::error::{DbError, DbResult};
use crate::session::{QueryStatistics, ResultSet, Row, Serializer};
use crate::value::SqlValue;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Per-execution collaborators
pub struct HandlerContext<'a> {
    pub serializer: &'a dyn Serializer,
    pub statistics: Option<&'a QueryStatistics>,
}

pub trait Selector<T>: Send + Sync {
    fn select(&self, row: &Row, context: &HandlerContext<'_>) -> DbResult<T>;
}

fn column(row: &Row, index: usize) -> DbResult<&SqlValue> {
    row.get(index).ok_or_else(|| {
        DbError::ExecutionError(format!(
            "Expected at least {} column(s), row has {}",
            index + 1,
            row.len()
        ))
    })
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> DbResult<T> {
    serde_json::from_value(value).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Decodes the stored document in the first column
pub struct DocumentSelector<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DocumentSelector<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DocumentSelector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Selector<T> for DocumentSelector<T> {
    fn select(&self, row: &Row, context: &HandlerContext<'_>) -> DbResult<T> {
        let json = context.serializer.decode(column(row, 0)?)?;
        from_json(json)
    }
}

/// Converts a projected column value
pub struct ScalarSelector<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScalarSelector<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ScalarSelector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Selector<T> for ScalarSelector<T> {
    fn select(&self, row: &Row, _context: &HandlerContext<'_>) -> DbResult<T> {
        from_json(column(row, 0)?.to_json())
    }
}

/// Reads the trailing `total_rows` column into the statistics holder
pub struct StatisticsSelector<T> {
    inner: Arc<dyn Selector<T>>,
    column: usize,
}

impl<T> StatisticsSelector<T> {
    pub fn new(inner: Arc<dyn Selector<T>>, column: usize) -> Self {
        Self { inner, column }
    }
}

impl<T> Selector<T> for StatisticsSelector<T> {
    fn select(&self, row: &Row, context: &HandlerContext<'_>) -> DbResult<T> {
        if let Some(statistics) = context.statistics {
            statistics.set_total_results(read_total(row, self.column)?);
        }
        self.inner.select(row, context)
    }
}

pub(crate) fn read_total(row: &Row, index: usize) -> DbResult<u64> {
    match column(row, index)? {
        SqlValue::Int(total) if *total >= 0 => Ok(*total as u64),
        other => Err(DbError::ExecutionError(format!(
            "Invalid total_rows value {}",
            other
        ))),
    }
}

/// Shapes the terminal result set into the query output
pub trait QueryHandler<O>: Send + Sync {
    fn handle(&self, results: &ResultSet, context: &HandlerContext<'_>) -> DbResult<O>;
}

pub struct ListHandler<T> {
    selector: Arc<dyn Selector<T>>,
}

impl<T> ListHandler<T> {
    pub fn new(selector: Arc<dyn Selector<T>>) -> Self {
        Self { selector }
    }
}

impl<T> QueryHandler<Vec<T>> for ListHandler<T> {
    fn handle(&self, results: &ResultSet, context: &HandlerContext<'_>) -> DbResult<Vec<T>> {
        results
            .rows
            .iter()
            .map(|row| self.selector.select(row, context))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneResultKind {
    First,
    Single,
}

fn one_result<T>(
    selector: &dyn Selector<T>,
    kind: OneResultKind,
    results: &ResultSet,
    context: &HandlerContext<'_>,
) -> DbResult<Option<T>> {
    if kind == OneResultKind::Single && results.rows.len() > 1 {
        return Err(DbError::ExecutionError(
            "Sequence contains more than one element".to_string(),
        ));
    }
    results
        .rows
        .first()
        .map(|row| selector.select(row, context))
        .transpose()
}

/// `first` / `single`: the element must exist
pub struct OneResultHandler<T> {
    selector: Arc<dyn Selector<T>>,
    kind: OneResultKind,
}

impl<T> OneResultHandler<T> {
    pub fn new(selector: Arc<dyn Selector<T>>, kind: OneResultKind) -> Self {
        Self { selector, kind }
    }
}

impl<T> QueryHandler<T> for OneResultHandler<T> {
    fn handle(&self, results: &ResultSet, context: &HandlerContext<'_>) -> DbResult<T> {
        one_result(self.selector.as_ref(), self.kind, results, context)?
            .ok_or_else(|| DbError::ExecutionError("Sequence contains no elements".to_string()))
    }
}

/// `first_or_default` / `single_or_default`
pub struct OptionalResultHandler<T> {
    selector: Arc<dyn Selector<T>>,
    kind: OneResultKind,
}

impl<T> OptionalResultHandler<T> {
    pub fn new(selector: Arc<dyn Selector<T>>, kind: OneResultKind) -> Self {
        Self { selector, kind }
    }
}

impl<T> QueryHandler<Option<T>> for OptionalResultHandler<T> {
    fn handle(&self, results: &ResultSet, context: &HandlerContext<'_>) -> DbResult<Option<T>> {
        one_result(self.selector.as_ref(), self.kind, results, context)
    }
}

fn single_value(results: &ResultSet) -> DbResult<&SqlValue> {
    let row = results
        .rows
        .first()
        .ok_or_else(|| DbError::ExecutionError("Aggregate query returned no rows".to_string()))?;
    column(row, 0)
}

pub struct CountHandler;

impl QueryHandler<i64> for CountHandler {
    fn handle(&self, results: &ResultSet, _context: &HandlerContext<'_>) -> DbResult<i64> {
        match single_value(results)? {
            SqlValue::Int(count) => Ok(*count),
            other => Err(DbError::ExecutionError(format!("Invalid count value {}", other))),
        }
    }
}

pub struct AnyHandler;

impl QueryHandler<bool> for AnyHandler {
    fn handle(&self, results: &ResultSet, _context: &HandlerContext<'_>) -> DbResult<bool> {
        match single_value(results)? {
            SqlValue::Bool(any) => Ok(*any),
            SqlValue::Int(count) => Ok(*count > 0),
            other => Err(DbError::ExecutionError(format!("Invalid any value {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::JsonSerializer;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Target {
        number: i32,
    }

    fn doc(number: i32) -> Row {
        vec![SqlValue::Json(json!({ "number": number }))]
    }

    fn context<'a>(statistics: Option<&'a QueryStatistics>) -> HandlerContext<'a> {
        HandlerContext {
            serializer: &JsonSerializer,
            statistics,
        }
    }

    fn documents() -> Arc<dyn Selector<Target>> {
        Arc::new(DocumentSelector::new())
    }

    #[test]
    fn test_list_handler() {
        let results = ResultSet::new(vec!["data"], vec![doc(1), doc(2)]);
        let list = ListHandler::new(documents()).handle(&results, &context(None)).unwrap();
        assert_eq!(list, vec![Target { number: 1 }, Target { number: 2 }]);
    }

    #[test]
    fn test_statistics_selector_fills_holder() {
        let rows = vec![
            vec![SqlValue::Json(json!({"number": 1})), SqlValue::Int(57)],
            vec![SqlValue::Json(json!({"number": 2})), SqlValue::Int(57)],
        ];
        let results = ResultSet::new(vec!["data", "total_rows"], rows);
        let stats = QueryStatistics::new();
        let selector: Arc<dyn Selector<Target>> = Arc::new(StatisticsSelector::new(documents(), 1));
        let list = ListHandler::new(selector).handle(&results, &context(Some(&stats))).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(stats.total_results(), 57);
    }

    #[test]
    fn test_one_result_handlers() {
        let empty = ResultSet::default();
        let err = OneResultHandler::new(documents(), OneResultKind::First)
            .handle(&empty, &context(None))
            .unwrap_err();
        assert!(err.to_string().contains("no elements"));

        let none = OptionalResultHandler::new(documents(), OneResultKind::First)
            .handle(&empty, &context(None))
            .unwrap();
        assert!(none.is_none());

        let two = ResultSet::new(vec!["data"], vec![doc(1), doc(2)]);
        let err = OptionalResultHandler::new(documents(), OneResultKind::Single)
            .handle(&two, &context(None))
            .unwrap_err();
        assert!(err.to_string().contains("more than one"));

        let first = OneResultHandler::new(documents(), OneResultKind::First)
            .handle(&two, &context(None))
            .unwrap();
        assert_eq!(first, Target { number: 1 });
    }

    #[test]
    fn test_scalar_selector() {
        let results = ResultSet::new(vec!["data"], vec![vec![SqlValue::Text("a".into())]]);
        let selector: Arc<dyn Selector<String>> = Arc::new(ScalarSelector::new());
        let names = ListHandler::new(selector).handle(&results, &context(None)).unwrap();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn test_aggregate_handlers() {
        let count = ResultSet::new(vec!["data"], vec![vec![SqlValue::Int(12)]]);
        assert_eq!(CountHandler.handle(&count, &context(None)).unwrap(), 12);

        let any = ResultSet::new(vec!["data"], vec![vec![SqlValue::Bool(true)]]);
        assert!(AnyHandler.handle(&any, &context(None)).unwrap());

        assert!(CountHandler.handle(&ResultSet::default(), &context(None)).is_err());
    }
}
