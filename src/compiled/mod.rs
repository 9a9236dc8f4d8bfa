//! Compiled queries
//!
//! A compiled query is a reusable template type whose registered members act
//! as the parameters of one query. The first use of a template type builds a
//! `CompiledQueryPlan`: command text with placeholders plus a map from each
//! placeholder to the member (or constant, or tenant) feeding it. Later uses
//! read the member values of the new instance and substitute them
//! positionally, skipping translation entirely.

pub mod cache;
pub mod members;
pub mod plan;
pub mod probe;

pub use cache::{CacheStats, PlanCache};
pub use members::{MemberKind, QueryMember, QueryMembers, TemplateValue};
pub use plan::{CompiledQueryPlan, PlaceholderSlot};
pub use probe::ProbeValues;

use crate::error::DbResult;
use crate::query::{Query, QueryDefinition};
use crate::schema::Document;

/// A query template type
///
/// ```ignore
/// #[derive(Clone)]
/// struct IssuesByNumber {
///     number: i32,
/// }
///
/// impl CompiledQuery for IssuesByNumber {
///     type Document = Issue;
///     type Output = Vec<Issue>;
///
///     fn query_is(&self, query: Query<Issue>) -> DbResult<QueryDefinition<Vec<Issue>>> {
///         Ok(query.filter(field("Number").eq(self.number)).to_list())
///     }
///
///     fn register(members: &mut QueryMembers<Self>) {
///         members.value("number", |q| q.number, |q, v| q.number = v);
///     }
/// }
/// ```
pub trait CompiledQuery: Clone + Send + Sync + Sized + 'static {
    type Document: Document;
    type Output: Send + 'static;

    /// Build the query from this instance's member values
    fn query_is(&self, query: Query<Self::Document>) -> DbResult<QueryDefinition<Self::Output>>;

    /// Register every data member of the template
    fn register(members: &mut QueryMembers<Self>);

    /// A fresh instance holding distinct probe values, used when two members
    /// of the supplied instance share a value
    fn planning_instance(_probe: &mut ProbeValues) -> Option<Self> {
        None
    }

    /// Set every filter member to a unique value. Returns false when the
    /// template does not implement this hook.
    fn set_unique_values_for_planning(&mut self) -> bool {
        false
    }
}
