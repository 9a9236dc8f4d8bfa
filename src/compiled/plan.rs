//! Compiled query plan building
//!
//! Building a plan translates the query through the normal path twice: once
//! from an instance whose parameter members hold pairwise distinct values,
//! and once more after every member has been given a fresh probe value.
//! A parameter belongs to a member only when its (untransformed) value
//! equals that member's value in both commands. Anything else, such as a
//! `take(10)` that happens to equal a member, stays a constant.

use super::members::{values_are_unique, QueryMembers};
use super::probe::ProbeValues;
use super::CompiledQuery;
use crate::config::EnumStorage;
use crate::error::{DbError, DbResult};
use crate::query::selector::QueryHandler;
use crate::query::{Query, QueryDefinition, ResultOperator};
use crate::schema::DocumentRegistry;
use crate::session::{QueryStatistics, Session};
use crate::sql::{Command, CommandParameter, CommandTemplate, ParameterOrigin, ValueTransform};
use crate::value::SqlValue;
use std::sync::Arc;

/// Source of the value bound to one placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceholderSlot {
    /// Index into the template's parameter members
    Member { member: usize, transform: ValueTransform },
    /// A value of the predicate itself, not owned by any member
    Constant(CommandParameter),
    /// The executing session's tenant id
    Tenant,
}

pub struct CompiledQueryPlan<Q: CompiledQuery> {
    template_type: &'static str,
    template: CommandTemplate,
    slots: Vec<PlaceholderSlot>,
    members: QueryMembers<Q>,
    handler: Arc<dyn QueryHandler<Q::Output>>,
    result_set_count: usize,
    enum_storage: EnumStorage,
}

impl<Q: CompiledQuery> std::fmt::Debug for CompiledQueryPlan<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQueryPlan")
            .field("template_type", &self.template_type)
            .field("template", &self.template)
            .field("slots", &self.slots)
            .finish()
    }
}

fn definition_for<Q: CompiledQuery>(
    query: &Q,
    registry: &Arc<DocumentRegistry>,
) -> DbResult<QueryDefinition<Q::Output>> {
    query.query_is(Query::<Q::Document>::new(registry.clone()))
}

impl<Q: CompiledQuery> CompiledQueryPlan<Q> {
    pub fn build(query: &Q, registry: Arc<DocumentRegistry>, session: &dyn Session) -> DbResult<Self> {
        let template_type = std::any::type_name::<Q>();
        let enum_storage = registry.options().enum_storage;
        tracing::debug!("Building compiled query plan for {}", template_type);

        let mut members = QueryMembers::new();
        Q::register(&mut members);

        let invalid = members.invalid();
        if !invalid.is_empty() {
            let listed: Vec<String> = invalid
                .iter()
                .map(|(name, reason)| format!("{} ({})", name, reason))
                .collect();
            return Err(DbError::PlanningFailure(format!(
                "{} has members that cannot be compiled: {}",
                template_type,
                listed.join(", ")
            )));
        }

        let definition = definition_for(query, &registry)?;
        if matches!(definition.operator(), ResultOperator::Paged { .. }) {
            return Err(DbError::UnsupportedQueryShape(format!(
                "{} uses paging, which compiled queries do not support",
                template_type
            )));
        }
        if !definition.model().includes.is_empty() {
            return Err(DbError::UnsupportedQueryShape(format!(
                "{} uses include(), which compiled queries do not support",
                template_type
            )));
        }

        let mut probe = ProbeValues::new();
        let (definition, planning) = if values_are_unique(&members.read_values(query, enum_storage)) {
            (definition, query.clone())
        } else {
            tracing::debug!("Member values of {} collide, probing", template_type);
            let probed = probe_unique_instance(query, &members, enum_storage, &mut probe).ok_or_else(|| {
                DbError::PlanningFailure(format!(
                    "Unable to give every member of {} a unique value",
                    template_type
                ))
            })?;
            (definition_for(&probed, &registry)?, probed)
        };

        let statement = definition.statement(session)?;
        let command = statement.to_command();
        let values = members.read_values(&planning, enum_storage);
        let mut slots = match_parameters(&command, &values);

        let check = reprobed_instance(&planning, &members, enum_storage, &mut probe);
        let check_values = members.read_values(&check, enum_storage);
        if values_are_unique(&check_values) {
            let check_command = definition_for(&check, &registry)?
                .statement(session)?
                .to_command();
            if check_command.template() != command.template() {
                return Err(DbError::PlanningFailure(format!(
                    "The command text of {} changes with its member values",
                    template_type
                )));
            }
            let check_slots = match_parameters(&check_command, &check_values);
            keep_agreeing_members(&mut slots, &check_slots, &command);
        } else {
            tracing::debug!(
                "Probe values of {} collide, keeping single-pass parameter matching",
                template_type
            );
        }

        let parameters = members.parameters();
        for (index, (name, _)) in parameters.iter().enumerate() {
            let used = slots
                .iter()
                .any(|slot| matches!(slot, PlaceholderSlot::Member { member, .. } if *member == index));
            if !used {
                return Err(DbError::UnmatchedParameter(format!(
                    "Member '{}' of {} does not reach any parameter of the command",
                    name, template_type
                )));
            }
        }

        let plan = Self {
            template_type,
            template: command.template(),
            slots,
            handler: definition.handler.clone(),
            result_set_count: statement.result_set_count(),
            members,
            enum_storage,
        };
        tracing::debug!(
            "Compiled query plan for {}: {} placeholder(s)",
            template_type,
            plan.slots.len()
        );
        Ok(plan)
    }

    pub fn template_type(&self) -> &'static str {
        self.template_type
    }

    /// Command text with every parameter shown as `^`
    pub fn command_text(&self) -> String {
        self.template.text()
    }

    pub fn slots(&self) -> &[PlaceholderSlot] {
        &self.slots
    }

    pub fn handler(&self) -> &dyn QueryHandler<Q::Output> {
        self.handler.as_ref()
    }

    pub fn result_set_count(&self) -> usize {
        self.result_set_count
    }

    pub fn include_members(&self) -> Vec<&str> {
        self.members.include_members()
    }

    /// Name of the member owning each placeholder, `None` for constant and tenant slots
    pub fn slot_members(&self) -> Vec<Option<&str>> {
        let parameters = self.members.parameters();
        self.slots
            .iter()
            .map(|slot| match slot {
                PlaceholderSlot::Member { member, .. } => parameters.get(*member).map(|(name, _)| *name),
                _ => None,
            })
            .collect()
    }

    /// Bind the member values of `query` into the compiled text
    pub fn command_for(&self, query: &Q, session: &dyn Session) -> Command {
        let values = self.members.read_values(query, self.enum_storage);
        let parameters = self
            .slots
            .iter()
            .map(|slot| match slot {
                PlaceholderSlot::Member { member, transform } => {
                    let raw = values.get(*member).cloned().unwrap_or(SqlValue::Null);
                    match transform {
                        ValueTransform::Identity => CommandParameter::literal(raw),
                        transform => CommandParameter {
                            value: transform.apply(&raw),
                            origin: ParameterOrigin::Transformed {
                                raw,
                                transform: *transform,
                            },
                        },
                    }
                }
                PlaceholderSlot::Constant(parameter) => parameter.clone(),
                PlaceholderSlot::Tenant => CommandParameter {
                    value: SqlValue::Text(session.tenant_id().to_string()),
                    origin: ParameterOrigin::Tenant,
                },
            })
            .collect();
        self.template.bind(parameters)
    }

    /// Statistics holder of `query`, if the template registered one
    pub fn statistics_for(&self, query: &Q) -> Option<Arc<QueryStatistics>> {
        self.members.statistics_member().map(|get| get(query))
    }
}

/// Produce an instance whose parameter members hold pairwise distinct values.
///
/// Starts from the template's own planning instance (or a copy of `query`),
/// then tries the template's hook, then assigns probes member by member.
fn probe_unique_instance<Q: CompiledQuery>(
    query: &Q,
    members: &QueryMembers<Q>,
    storage: EnumStorage,
    probe: &mut ProbeValues,
) -> Option<Q> {
    let unique = |instance: &Q| values_are_unique(&members.read_values(instance, storage));

    let mut instance = Q::planning_instance(probe).unwrap_or_else(|| query.clone());
    if unique(&instance) {
        return Some(instance);
    }

    if instance.set_unique_values_for_planning() && unique(&instance) {
        return Some(instance);
    }

    for (_, parameter) in members.parameters() {
        parameter.assign_probe(&mut instance, probe);
        if unique(&instance) {
            return Some(instance);
        }
    }
    None
}

/// Copy of `planning` with a fresh probe value in every parameter member
fn reprobed_instance<Q: CompiledQuery>(
    planning: &Q,
    members: &QueryMembers<Q>,
    storage: EnumStorage,
    probe: &mut ProbeValues,
) -> Q {
    let mut instance = planning.clone();
    for (_, parameter) in members.parameters() {
        let before = parameter.read(&instance, storage);
        parameter.assign_probe(&mut instance, probe);
        // Enum probes wrap around their variants
        if parameter.read(&instance, storage) == before {
            parameter.assign_probe(&mut instance, probe);
        }
    }
    instance
}

/// Demote member slots the second command does not attribute to the same member
fn keep_agreeing_members(slots: &mut [PlaceholderSlot], check: &[PlaceholderSlot], command: &Command) {
    for ((slot, check), parameter) in slots.iter_mut().zip(check).zip(&command.parameters) {
        if matches!(slot, PlaceholderSlot::Member { .. }) && *slot != *check {
            *slot = PlaceholderSlot::Constant(parameter.clone());
        }
    }
}

/// Assign each command parameter to the member holding its source value
fn match_parameters(command: &Command, values: &[SqlValue]) -> Vec<PlaceholderSlot> {
    command
        .parameters
        .iter()
        .map(|parameter| {
            if parameter.origin == ParameterOrigin::Tenant {
                return PlaceholderSlot::Tenant;
            }
            let owner = parameter
                .source_value()
                .and_then(|source| values.iter().position(|value| value == source));
            match owner {
                Some(member) => PlaceholderSlot::Member {
                    member,
                    transform: parameter.transform(),
                },
                None => PlaceholderSlot::Constant(parameter.clone()),
            }
        })
        .collect()
}
