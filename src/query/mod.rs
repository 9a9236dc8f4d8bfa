//! Query building
//!
//! `Query<T, E>` records filters, orderings and paging over documents of
//! type `T` producing elements of type `E`. A terminal operator (`to_list`,
//! `count`, `to_paged_list`...) turns it into a `QueryDefinition` carrying
//! the untyped `QueryModel` plus the handler that shapes the results.

pub mod compiler;
pub mod expr;
pub mod pagination;
pub mod selector;
pub mod translator;

pub use expr::{elem, field, matches_sql, Expr};
pub use pagination::PagedResult;
pub use translator::QueryTranslator;

use crate::error::DbResult;
use crate::schema::{Document, DocumentMapping, DocumentRegistry};
use crate::session::{QueryStatistics, ResultSet, Serializer, Session};
use crate::sql::{Command, Statement};
use crate::value::SqlValue;
use parking_lot::Mutex;
use selector::{
    AnyHandler, CountHandler, DocumentSelector, ListHandler, OneResultHandler, OneResultKind,
    OptionalResultHandler, QueryHandler, ScalarSelector, Selector, StatisticsSelector,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Column index of `total_rows`: every row-returning select has one field
const STATS_COLUMN: usize = 1;

/// Handling of soft-deleted rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteMode {
    /// `d.mt_deleted = False`
    #[default]
    Exclude,
    /// No filter on the deleted flag
    Include,
    /// `d.mt_deleted = True`
    Only,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub target: Expr,
    pub descending: bool,
}

/// Filters, orderings and paging applied at one level of the query
#[derive(Debug, Clone, Default)]
pub struct QueryStage {
    pub wheres: Vec<Expr>,
    pub orderings: Vec<OrderBy>,
    pub skip: Option<SqlValue>,
    pub take: Option<SqlValue>,
    pub projection: Option<Expr>,
}

/// Query over the elements of a collection member (`select_many`)
#[derive(Debug, Clone)]
pub struct ChildStage {
    pub collection: String,
    pub stage: QueryStage,
}

/// Decodes related documents of an include into the caller's target
pub trait IncludeReader: Send + Sync {
    fn read(&self, results: &ResultSet, serializer: &dyn Serializer) -> DbResult<()>;
}

struct IncludeList<R> {
    target: Arc<Mutex<Vec<R>>>,
}

impl<R: DeserializeOwned + Send> IncludeReader for IncludeList<R> {
    fn read(&self, results: &ResultSet, serializer: &dyn Serializer) -> DbResult<()> {
        let mut target = self.target.lock();
        for row in &results.rows {
            let json = match row.first() {
                Some(value) => serializer.decode(value)?,
                None => continue,
            };
            target.push(serde_json::from_value(json)?);
        }
        Ok(())
    }
}

/// Related documents fetched alongside the main query
#[derive(Clone)]
pub struct Include {
    /// Member of the main document holding the related id(s)
    pub path: String,
    pub related: Arc<DocumentMapping>,
    pub reader: Arc<dyn IncludeReader>,
}

impl fmt::Debug for Include {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Include")
            .field("path", &self.path)
            .field("related", &self.related.document_type)
            .finish()
    }
}

/// Untyped description of a query
#[derive(Debug, Clone, Default)]
pub struct QueryModel {
    pub parent: QueryStage,
    pub child: Option<ChildStage>,
    pub soft_delete: SoftDeleteMode,
    pub statistics: Option<Arc<QueryStatistics>>,
    pub includes: Vec<Include>,
    /// Set when the builder was used in a way no statement can express
    pub unsupported: Option<String>,
}

impl QueryModel {
    fn current_stage(&mut self) -> &mut QueryStage {
        match &mut self.child {
            Some(child) => &mut child.stage,
            None => &mut self.parent,
        }
    }

    /// Whether rows hold a projected value instead of a whole document
    pub fn is_projected(&self) -> bool {
        self.child.is_some() || self.parent.projection.is_some()
    }
}

/// How the rows of the terminal statement become the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOperator {
    ToList,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Count,
    Any,
    Paged { page_number: i64, page_size: i64 },
}

impl ResultOperator {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ResultOperator::Count | ResultOperator::Any)
    }
}

/// A complete query: model, result operator and result handler
pub struct QueryDefinition<O> {
    pub(crate) registry: Arc<DocumentRegistry>,
    pub(crate) mapping: Arc<DocumentMapping>,
    pub(crate) model: QueryModel,
    pub(crate) operator: ResultOperator,
    pub(crate) handler: Arc<dyn QueryHandler<O>>,
}

impl<O> QueryDefinition<O> {
    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn operator(&self) -> ResultOperator {
        self.operator
    }

    pub fn mapping(&self) -> &DocumentMapping {
        &self.mapping
    }

    pub fn statement(&self, session: &dyn Session) -> DbResult<Statement> {
        QueryTranslator::new(&self.mapping, self.registry.options().enum_storage, session)
            .translate(&self.model, self.operator)
    }

    pub fn command(&self, session: &dyn Session) -> DbResult<Command> {
        Ok(self.statement(session)?.to_command())
    }
}

/// Query builder over documents `T` yielding elements `E`
pub struct Query<T, E = T> {
    registry: Arc<DocumentRegistry>,
    mapping: Arc<DocumentMapping>,
    model: QueryModel,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T: Document> Query<T> {
    pub fn new(registry: Arc<DocumentRegistry>) -> Self {
        let mapping = registry.mapping_for::<T>();
        Self {
            registry,
            mapping,
            model: QueryModel::default(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document, E> Query<T, E> {
    fn retype<R>(self) -> Query<T, R> {
        Query {
            registry: self.registry,
            mapping: self.mapping,
            model: self.model,
            _marker: PhantomData,
        }
    }

    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.model.current_stage().wheres.push(predicate);
        self
    }

    pub fn order_by(self, path: &str) -> Self {
        self.order_by_expr(field(path), false)
    }

    pub fn order_by_descending(self, path: &str) -> Self {
        self.order_by_expr(field(path), true)
    }

    /// Order by a member or by `elem()` inside `select_many`
    pub fn order_by_expr(mut self, target: Expr, descending: bool) -> Self {
        self.model
            .current_stage()
            .orderings
            .push(OrderBy { target, descending });
        self
    }

    pub fn skip(mut self, count: impl Into<SqlValue>) -> Self {
        self.model.current_stage().skip = Some(count.into());
        self
    }

    pub fn take(mut self, count: impl Into<SqlValue>) -> Self {
        self.model.current_stage().take = Some(count.into());
        self
    }

    /// Report the unpaged row count into `statistics`
    pub fn stats(mut self, statistics: Arc<QueryStatistics>) -> Self {
        self.model.statistics = Some(statistics);
        self
    }

    /// Include soft-deleted documents
    pub fn maybe_deleted(mut self) -> Self {
        self.model.soft_delete = SoftDeleteMode::Include;
        self
    }

    /// Only soft-deleted documents
    pub fn is_deleted(mut self) -> Self {
        self.model.soft_delete = SoftDeleteMode::Only;
        self
    }

    /// Fetch the `R` documents referenced by `path` into `target`
    pub fn include<R: Document>(mut self, path: &str, target: Arc<Mutex<Vec<R>>>) -> Self {
        let related = self.registry.mapping_for::<R>();
        self.model.includes.push(Include {
            path: path.to_string(),
            related,
            reader: Arc::new(IncludeList { target }),
        });
        self
    }

    /// Project a single member
    pub fn select<R>(mut self, path: &str) -> Query<T, R> {
        self.model.current_stage().projection = Some(field(path));
        self.retype()
    }

    /// Continue the query over the elements of a collection member
    pub fn select_many<R>(mut self, collection: &str) -> Query<T, R> {
        if self.model.child.is_some() {
            self.model.unsupported = Some(format!(
                "nested select_many over '{}'",
                collection
            ));
        } else {
            self.model.child = Some(ChildStage {
                collection: collection.to_string(),
                stage: QueryStage::default(),
            });
        }
        self.retype()
    }
}

impl<T: Document, E: DeserializeOwned + Send + Sync + 'static> Query<T, E> {
    fn definition<O, H>(self, operator: ResultOperator, handler: H) -> QueryDefinition<O>
    where
        H: QueryHandler<O> + 'static,
    {
        QueryDefinition {
            registry: self.registry,
            mapping: self.mapping,
            model: self.model,
            operator,
            handler: Arc::new(handler),
        }
    }

    fn element_selector(&self) -> Arc<dyn Selector<E>> {
        if self.model.is_projected() {
            Arc::new(ScalarSelector::<E>::new())
        } else {
            Arc::new(DocumentSelector::<E>::new())
        }
    }

    fn selector(&self) -> Arc<dyn Selector<E>> {
        let selector = self.element_selector();
        if self.model.statistics.is_some() {
            Arc::new(StatisticsSelector::new(selector, STATS_COLUMN))
        } else {
            selector
        }
    }

    pub fn to_list(self) -> QueryDefinition<Vec<E>> {
        let handler = ListHandler::new(self.selector());
        self.definition(ResultOperator::ToList, handler)
    }

    pub fn first(self) -> QueryDefinition<E> {
        let handler = OneResultHandler::new(self.selector(), OneResultKind::First);
        self.definition(ResultOperator::First, handler)
    }

    pub fn first_or_default(self) -> QueryDefinition<Option<E>> {
        let handler = OptionalResultHandler::new(self.selector(), OneResultKind::First);
        self.definition(ResultOperator::FirstOrDefault, handler)
    }

    pub fn single(self) -> QueryDefinition<E> {
        let handler = OneResultHandler::new(self.selector(), OneResultKind::Single);
        self.definition(ResultOperator::Single, handler)
    }

    pub fn single_or_default(self) -> QueryDefinition<Option<E>> {
        let handler = OptionalResultHandler::new(self.selector(), OneResultKind::Single);
        self.definition(ResultOperator::SingleOrDefault, handler)
    }

    pub fn count(self) -> QueryDefinition<i64> {
        self.definition(ResultOperator::Count, CountHandler)
    }

    pub fn any(self) -> QueryDefinition<bool> {
        self.definition(ResultOperator::Any, AnyHandler)
    }

    /// One page of results plus page metadata, in a single round trip
    pub fn to_paged_list(self, page_number: i64, page_size: i64) -> DbResult<QueryDefinition<PagedResult<E>>> {
        pagination::validate_page(page_number, page_size)?;
        let handler = pagination::PagedListHandler::new(
            self.element_selector(),
            STATS_COLUMN,
            page_number,
            page_size,
        );
        Ok(self.definition(
            ResultOperator::Paged {
                page_number,
                page_size,
            },
            handler,
        ))
    }
}
