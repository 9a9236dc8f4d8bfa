//! Query template members
//!
//! A compiled query template registers each of its fields once, with
//! accessor functions. Registration classifies the field: a parameter
//! feeding the command, the statistics holder, an include target, or an
//! invalid member that can never be compiled.

use super::probe::ProbeValues;
use crate::config::EnumStorage;
use crate::session::QueryStatistics;
use crate::value::{QueryEnum, SqlValue};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A field type usable as a compiled query parameter
pub trait TemplateValue: Clone + Send + Sync + 'static {
    fn to_sql(&self) -> SqlValue;

    fn probe(values: &mut ProbeValues) -> Self;

    /// Why this type can never be a parameter, if it cannot
    fn unsupported_reason() -> Option<&'static str> {
        None
    }
}

impl TemplateValue for i32 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(*self as i64)
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_i32()
    }
}

impl TemplateValue for i64 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(*self)
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_i64()
    }
}

impl TemplateValue for f64 {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Float(*self)
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_f64()
    }
}

impl TemplateValue for String {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_text()
    }
}

impl TemplateValue for Uuid {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Uuid(*self)
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_uuid()
    }
}

impl TemplateValue for DateTime<Utc> {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Timestamp(*self)
    }

    fn probe(values: &mut ProbeValues) -> Self {
        values.next_timestamp()
    }
}

impl TemplateValue for Vec<String> {
    fn to_sql(&self) -> SqlValue {
        SqlValue::TextArray(self.clone())
    }

    fn probe(values: &mut ProbeValues) -> Self {
        vec![values.next_text()]
    }
}

impl TemplateValue for bool {
    fn to_sql(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn probe(_values: &mut ProbeValues) -> Self {
        true
    }

    fn unsupported_reason() -> Option<&'static str> {
        Some("bool members cannot hold distinct probe values")
    }
}

impl<T: TemplateValue> TemplateValue for Option<T> {
    fn to_sql(&self) -> SqlValue {
        match self {
            Some(value) => value.to_sql(),
            None => SqlValue::Null,
        }
    }

    fn probe(values: &mut ProbeValues) -> Self {
        Some(T::probe(values))
    }

    fn unsupported_reason() -> Option<&'static str> {
        Some("nullable members are ambiguous between no filter and a null filter")
    }
}

type ReadFn<Q> = Box<dyn Fn(&Q, EnumStorage) -> SqlValue + Send + Sync>;
type ProbeFn<Q> = Box<dyn Fn(&mut Q, &mut ProbeValues) + Send + Sync>;

/// Accessors of a member feeding the command
pub struct ParameterMember<Q> {
    read: ReadFn<Q>,
    assign_probe: ProbeFn<Q>,
}

impl<Q> ParameterMember<Q> {
    pub fn read(&self, query: &Q, storage: EnumStorage) -> SqlValue {
        (self.read)(query, storage)
    }

    pub fn assign_probe(&self, query: &mut Q, probe: &mut ProbeValues) {
        (self.assign_probe)(query, probe)
    }
}

pub enum MemberKind<Q> {
    Parameter(ParameterMember<Q>),
    Statistics(fn(&Q) -> Arc<QueryStatistics>),
    /// Related-document target, not a SQL parameter
    Include,
    Invalid(String),
}

pub struct QueryMember<Q> {
    pub name: String,
    pub kind: MemberKind<Q>,
}

/// Registered members of one query template type
pub struct QueryMembers<Q> {
    members: Vec<QueryMember<Q>>,
}

impl<Q> Default for QueryMembers<Q> {
    fn default() -> Self {
        Self { members: Vec::new() }
    }
}

impl<Q: 'static> QueryMembers<Q> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, kind: MemberKind<Q>) -> &mut Self {
        self.members.push(QueryMember {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// A field of a recognized value type
    pub fn value<V: TemplateValue>(&mut self, name: &str, get: fn(&Q) -> V, set: fn(&mut Q, V)) -> &mut Self {
        if let Some(reason) = V::unsupported_reason() {
            return self.push(name, MemberKind::Invalid(reason.to_string()));
        }
        self.push(
            name,
            MemberKind::Parameter(ParameterMember {
                read: Box::new(move |query, _| get(query).to_sql()),
                assign_probe: Box::new(move |query, probe| set(query, V::probe(probe))),
            }),
        )
    }

    /// An enum field, written by name or ordinal per the store options
    pub fn enumeration<E: QueryEnum>(&mut self, name: &str, get: fn(&Q) -> E, set: fn(&mut Q, E)) -> &mut Self {
        self.push(
            name,
            MemberKind::Parameter(ParameterMember {
                read: Box::new(move |query, storage| get(query).to_sql(storage)),
                assign_probe: Box::new(move |query, probe| {
                    if let Some(value) = probe.next_enum::<E>() {
                        set(query, value)
                    }
                }),
            }),
        )
    }

    /// The holder receiving the total row count
    pub fn statistics(&mut self, name: &str, get: fn(&Q) -> Arc<QueryStatistics>) -> &mut Self {
        self.push(name, MemberKind::Statistics(get))
    }

    /// A list or callback receiving included documents
    pub fn include(&mut self, name: &str) -> &mut Self {
        self.push(name, MemberKind::Include)
    }

    /// A field whose type has no comparison strategy
    pub fn unsupported(&mut self, name: &str, type_name: &str) -> &mut Self {
        self.push(
            name,
            MemberKind::Invalid(format!("type {} cannot be a query parameter", type_name)),
        )
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryMember<Q>> {
        self.members.iter()
    }

    /// Parameter members in registration order
    pub fn parameters(&self) -> Vec<(&str, &ParameterMember<Q>)> {
        self.members
            .iter()
            .filter_map(|m| match &m.kind {
                MemberKind::Parameter(p) => Some((m.name.as_str(), p)),
                _ => None,
            })
            .collect()
    }

    /// `(name, reason)` of every member that can never be compiled
    pub fn invalid(&self) -> Vec<(&str, &str)> {
        self.members
            .iter()
            .filter_map(|m| match &m.kind {
                MemberKind::Invalid(reason) => Some((m.name.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn statistics_member(&self) -> Option<fn(&Q) -> Arc<QueryStatistics>> {
        self.members.iter().find_map(|m| match m.kind {
            MemberKind::Statistics(get) => Some(get),
            _ => None,
        })
    }

    pub fn include_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| matches!(m.kind, MemberKind::Include))
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Current value of every parameter member, in order
    pub fn read_values(&self, query: &Q, storage: EnumStorage) -> Vec<SqlValue> {
        self.parameters()
            .into_iter()
            .map(|(_, p)| p.read(query, storage))
            .collect()
    }
}

/// True when no two values are equal
pub fn values_are_unique(values: &[SqlValue]) -> bool {
    values
        .iter()
        .enumerate()
        .all(|(i, value)| !values[i + 1..].contains(value))
}
