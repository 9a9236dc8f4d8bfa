//! Document store
//!
//! `DocumentStore` owns what every query shares: options, the document
//! registry, the serializer and the compiled plan cache. A `QuerySession`
//! pairs the store with one executing `Session` and runs both ad-hoc query
//! definitions and compiled query templates.

use crate::compiled::{CacheStats, CompiledQuery, CompiledQueryPlan, PlanCache};
use crate::config::StoreOptions;
use crate::error::{DbError, DbResult};
use crate::query::selector::{HandlerContext, QueryHandler};
use crate::query::{Include, PagedResult, Query, QueryDefinition};
use crate::schema::{Document, DocumentRegistry};
use crate::session::{JsonSerializer, QueryStatistics, ResultSet, Serializer, Session};
use crate::sql::Command;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct DocumentStore {
    options: Arc<StoreOptions>,
    registry: Arc<DocumentRegistry>,
    plans: PlanCache,
    serializer: Arc<dyn Serializer>,
}

impl DocumentStore {
    pub fn new(options: StoreOptions) -> Self {
        Self::with_serializer(options, Arc::new(JsonSerializer))
    }

    pub fn with_serializer(options: StoreOptions, serializer: Arc<dyn Serializer>) -> Self {
        let options = Arc::new(options);
        tracing::info!(
            "Document store created (schema: {}, enum storage: {:?})",
            options.schema_name,
            options.enum_storage
        );
        Self {
            registry: Arc::new(DocumentRegistry::new(options.clone())),
            options,
            plans: PlanCache::new(),
            serializer,
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    pub fn plans(&self) -> &PlanCache {
        &self.plans
    }

    pub fn plan_cache_stats(&self) -> CacheStats {
        self.plans.stats()
    }

    /// Start querying through `session`
    pub fn query_session(self: &Arc<Self>, session: Arc<dyn Session>) -> QuerySession {
        QuerySession {
            store: self.clone(),
            session,
        }
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.plans.clear();
    }
}

pub struct QuerySession {
    store: Arc<DocumentStore>,
    session: Arc<dyn Session>,
}

impl QuerySession {
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn query<T: Document>(&self) -> Query<T> {
        Query::new(self.store.registry.clone())
    }

    /// The command `definition` would run, without running it
    pub fn command_for<O>(&self, definition: &QueryDefinition<O>) -> DbResult<Command> {
        definition.command(self.session.as_ref())
    }

    pub async fn fetch<O>(&self, definition: &QueryDefinition<O>) -> DbResult<O> {
        let statement = definition.statement(self.session.as_ref())?;
        let command = statement.to_command();
        let results = self.execute(&command).await?;

        let model = definition.model();
        self.read_results(
            results,
            statement.result_set_count(),
            &model.includes,
            definition.handler.as_ref(),
            model.statistics.as_deref(),
        )
    }

    pub async fn fetch_with_cancel<O>(
        &self,
        definition: &QueryDefinition<O>,
        cancel: CancellationToken,
    ) -> DbResult<O> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!("Query against {} cancelled", definition.mapping().document_type);
                Err(DbError::Cancelled)
            }
            result = self.fetch(definition) => result,
        }
    }

    /// One page of `query` plus page metadata, in a single round trip
    pub async fn paginate<T, E>(
        &self,
        query: Query<T, E>,
        page_number: i64,
        page_size: i64,
    ) -> DbResult<PagedResult<E>>
    where
        T: Document,
        E: DeserializeOwned + Send + Sync + 'static,
    {
        let definition = query.to_paged_list(page_number, page_size)?;
        self.fetch(&definition).await
    }

    /// Plan for template type `Q`, built from `query` on first use
    pub fn plan_for<Q: CompiledQuery>(&self, query: &Q) -> DbResult<Arc<CompiledQueryPlan<Q>>> {
        self.store.plans.get_or_build(|| {
            CompiledQueryPlan::build(query, self.store.registry.clone(), self.session.as_ref())
        })
    }

    /// The command a compiled query would run, without running it
    pub fn compiled_command<Q: CompiledQuery>(&self, query: &Q) -> DbResult<Command> {
        let plan = self.plan_for(query)?;
        Ok(plan.command_for(query, self.session.as_ref()))
    }

    pub async fn query_compiled<Q: CompiledQuery>(&self, query: &Q) -> DbResult<Q::Output> {
        let plan = self.plan_for(query)?;
        let command = plan.command_for(query, self.session.as_ref());
        let results = self.execute(&command).await?;

        let statistics = plan.statistics_for(query);
        self.read_results(
            results,
            plan.result_set_count(),
            &[],
            plan.handler(),
            statistics.as_deref(),
        )
    }

    pub async fn query_compiled_with_cancel<Q: CompiledQuery>(
        &self,
        query: &Q,
        cancel: CancellationToken,
    ) -> DbResult<Q::Output> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!("Compiled query {} cancelled", std::any::type_name::<Q>());
                Err(DbError::Cancelled)
            }
            result = self.query_compiled(query) => result,
        }
    }

    async fn execute(&self, command: &Command) -> DbResult<Vec<ResultSet>> {
        if self.store.options.log_commands {
            tracing::trace!("Executing command: {}", command.text);
        }
        tracing::debug!("Executing command with {} parameter(s)", command.parameters.len());
        self.session.execute(command).await
    }

    /// Includes read the leading result sets, the handler reads the last one
    fn read_results<O>(
        &self,
        mut results: Vec<ResultSet>,
        expected: usize,
        includes: &[Include],
        handler: &dyn QueryHandler<O>,
        statistics: Option<&QueryStatistics>,
    ) -> DbResult<O> {
        if results.len() != expected {
            return Err(DbError::ExecutionError(format!(
                "Expected {} result set(s), session returned {}",
                expected,
                results.len()
            )));
        }
        let last = results.pop().ok_or_else(|| {
            DbError::ExecutionError("Command produced no result set".to_string())
        })?;

        let serializer = self.store.serializer.as_ref();
        for (include, related) in includes.iter().zip(results.iter()) {
            include.reader.read(related, serializer)?;
        }

        let context = HandlerContext {
            serializer,
            statistics,
        };
        handler.handle(&last, &context)
    }
}
