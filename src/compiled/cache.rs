//! Compiled Plan Cache
//!
//! One plan per template type, built on first use and shared afterwards.
//! Concurrent first uses may each build a plan; the first one published
//! wins and the others are discarded.

use super::plan::CompiledQueryPlan;
use super::CompiledQuery;
use crate::error::DbResult;
use dashmap::DashMap;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type AnyPlan = Arc<dyn Any + Send + Sync>;

pub struct PlanCache {
    plans: DashMap<TypeId, AnyPlan>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            plans: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached plan for `Q`, if one was published
    pub fn get<Q: CompiledQuery>(&self) -> Option<Arc<CompiledQueryPlan<Q>>> {
        let plan = self.plans.get(&TypeId::of::<Q>())?.value().clone();
        plan.downcast::<CompiledQueryPlan<Q>>().ok()
    }

    /// Get the plan for `Q` or build and publish it.
    ///
    /// Build errors are returned as-is and never cached, so the next call
    /// builds again.
    pub fn get_or_build<Q, F>(&self, build: F) -> DbResult<Arc<CompiledQueryPlan<Q>>>
    where
        Q: CompiledQuery,
        F: FnOnce() -> DbResult<CompiledQueryPlan<Q>>,
    {
        if let Some(plan) = self.get::<Q>() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(plan);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let plan = Arc::new(build()?);
        Ok(self.publish(plan))
    }

    /// Publish `plan` unless another caller got there first; returns the
    /// plan every caller should use
    pub fn publish<Q: CompiledQuery>(&self, plan: Arc<CompiledQueryPlan<Q>>) -> Arc<CompiledQueryPlan<Q>> {
        let candidate: AnyPlan = plan.clone();
        let published = self
            .plans
            .entry(TypeId::of::<Q>())
            .or_insert(candidate)
            .value()
            .clone();

        if Arc::as_ptr(&published) as *const () != Arc::as_ptr(&plan) as *const () {
            tracing::debug!(
                "Discarding concurrently built plan for {}",
                plan.template_type()
            );
        } else {
            tracing::info!("Cached compiled query plan for {}", plan.template_type());
        }

        published.downcast::<CompiledQueryPlan<Q>>().unwrap_or(plan)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.plans.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
