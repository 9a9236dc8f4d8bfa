//! Composable SQL fragments.
//!
//! Fragments are immutable values. Each one renders itself into a
//! `CommandBuilder` and can report whether its text contains a substring.

use super::command::{CommandBuilder, ValueTransform};
use crate::schema::{DELETED_COLUMN, DOCUMENT_ALIAS, TENANT_COLUMN};
use crate::value::{SqlValue, ValueType};
use std::fmt;
use std::sync::Arc;

/// Anything that can render into a command
pub trait SqlFragment: Send + Sync + fmt::Debug {
    fn apply(&self, sql: &mut CommandBuilder);

    fn contains(&self, sql_text: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    /// Operator to use when the operands are swapped (`5 < x` => `x > 5`)
    pub fn reverse(&self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    And,
    Or,
}

impl CompoundOp {
    fn sql(&self) -> &'static str {
        match self {
            CompoundOp::And => " and ",
            CompoundOp::Or => " or ",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(SqlValue),
    Locator(String),
}

/// Node of a predicate / clause tree
#[derive(Debug, Clone)]
pub enum Fragment {
    Comparison {
        locator: String,
        op: CompareOp,
        operand: Operand,
        value_type: ValueType,
    },
    IsNull {
        locator: String,
        negated: bool,
    },
    Compound {
        op: CompoundOp,
        parts: Vec<Fragment>,
    },
    Not(Box<Fragment>),
    /// Raw SQL, `?` marks each argument
    Where {
        sql: String,
        arguments: Vec<SqlValue>,
    },
    Like {
        locator: String,
        value: SqlValue,
        transform: ValueTransform,
    },
    IsOneOf {
        locator: String,
        values: SqlValue,
    },
    ExcludeSoftDeleted,
    SoftDeletedOnly,
    Tenant(String),
    /// Some exploded element satisfies the nested filter
    CollectionAny {
        source: String,
        filter: Box<Fragment>,
    },
    CollectionContains {
        array_locator: String,
        value: SqlValue,
    },
    AllValuesEqual {
        array_locator: String,
        value: SqlValue,
    },
    AllValuesAreNull {
        array_locator: String,
    },
    Custom(Arc<dyn SqlFragment>),
}

impl Fragment {
    pub fn comparison(locator: &str, op: CompareOp, value: SqlValue, value_type: ValueType) -> Self {
        if value.is_null() {
            return match op {
                CompareOp::NotEq => Fragment::IsNull {
                    locator: locator.to_string(),
                    negated: true,
                },
                _ => Fragment::IsNull {
                    locator: locator.to_string(),
                    negated: false,
                },
            };
        }
        Fragment::Comparison {
            locator: locator.to_string(),
            op,
            operand: Operand::Value(value),
            value_type,
        }
    }

    pub fn raw(sql: impl Into<String>, arguments: Vec<SqlValue>) -> Self {
        Fragment::Where {
            sql: sql.into(),
            arguments,
        }
    }

    /// Combine two fragments with AND, flattening nested conjunctions
    pub fn and(self, other: Fragment) -> Fragment {
        Self::combine(CompoundOp::And, self, other)
    }

    pub fn or(self, other: Fragment) -> Fragment {
        Self::combine(CompoundOp::Or, self, other)
    }

    fn combine(op: CompoundOp, left: Fragment, right: Fragment) -> Fragment {
        let mut parts = Vec::new();
        for side in [left, right] {
            match side {
                Fragment::Compound { op: inner, parts: inner_parts } if inner == op => {
                    parts.extend(inner_parts)
                }
                other => parts.push(other),
            }
        }
        Fragment::Compound { op, parts }
    }

    /// AND together a list of filters; `None` when the list is empty
    pub fn conjoin(filters: Vec<Fragment>) -> Option<Fragment> {
        let mut filters = filters.into_iter();
        let first = filters.next()?;
        Some(filters.fold(first, Fragment::and))
    }

    /// Depth-first visit of this fragment and all of its children
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Fragment)) {
        visit(self);
        match self {
            Fragment::Compound { parts, .. } => parts.iter().for_each(|p| p.walk(visit)),
            Fragment::Not(inner) => inner.walk(visit),
            Fragment::CollectionAny { filter, .. } => filter.walk(visit),
            _ => {}
        }
    }

    fn render_value(sql: &mut CommandBuilder, value: &SqlValue, value_type: ValueType) {
        if value_type.is_json() {
            sql.append("CAST(");
            match value {
                SqlValue::Json(_) => sql.append_parameter(value.clone()),
                other => sql.append_transformed_parameter(other, ValueTransform::ToJson),
            };
            sql.append(" as jsonb)");
        } else {
            sql.append_parameter(value.clone());
        }
    }
}

impl SqlFragment for Fragment {
    fn apply(&self, sql: &mut CommandBuilder) {
        match self {
            Fragment::Comparison {
                locator,
                op,
                operand,
                value_type,
            } => {
                sql.append(locator);
                sql.append(" ");
                sql.append(op.sql());
                sql.append(" ");
                match operand {
                    Operand::Value(value) => Fragment::render_value(sql, value, *value_type),
                    Operand::Locator(other) => sql.append(other),
                }
            }
            Fragment::IsNull { locator, negated } => {
                sql.append(locator);
                sql.append(if *negated { " is not null" } else { " is null" });
            }
            Fragment::Compound { op, parts } => {
                if parts.len() == 1 {
                    parts[0].apply(sql);
                    return;
                }
                sql.append("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        sql.append(op.sql());
                    }
                    part.apply(sql);
                }
                sql.append(")");
            }
            Fragment::Not(inner) => {
                sql.append("NOT(");
                inner.apply(sql);
                sql.append(")");
            }
            Fragment::Where { sql: text, arguments } => sql.append_with_arguments(text, arguments),
            Fragment::Like {
                locator,
                value,
                transform,
            } => {
                sql.append(locator);
                sql.append(" LIKE ");
                sql.append_transformed_parameter(value, *transform);
            }
            Fragment::IsOneOf { locator, values } => {
                sql.append(locator);
                sql.append(" = ANY(");
                sql.append_parameter(values.clone());
                sql.append(")");
            }
            Fragment::ExcludeSoftDeleted => {
                sql.append(&format!("{}.{} = False", DOCUMENT_ALIAS, DELETED_COLUMN));
            }
            Fragment::SoftDeletedOnly => {
                sql.append(&format!("{}.{} = True", DOCUMENT_ALIAS, DELETED_COLUMN));
            }
            Fragment::Tenant(tenant_id) => {
                sql.append(&format!("{}.{} = ", DOCUMENT_ALIAS, TENANT_COLUMN));
                sql.append_tenant_parameter(tenant_id);
            }
            Fragment::CollectionAny { source, filter } => {
                sql.append("exists (select 1 from ");
                sql.append(source);
                sql.append(" where ");
                filter.apply(sql);
                sql.append(")");
            }
            Fragment::CollectionContains {
                array_locator,
                value,
            } => {
                sql.append_parameter(value.clone());
                sql.append(" = ANY(");
                sql.append(array_locator);
                sql.append(")");
            }
            Fragment::AllValuesEqual {
                array_locator,
                value,
            } => {
                sql.append_parameter(value.clone());
                sql.append(" = ALL(");
                sql.append(array_locator);
                sql.append(")");
            }
            Fragment::AllValuesAreNull { array_locator } => {
                sql.append("true = ALL(select unnest(");
                sql.append(array_locator);
                sql.append(") is null)");
            }
            Fragment::Custom(fragment) => fragment.apply(sql),
        }
    }

    fn contains(&self, sql_text: &str) -> bool {
        match self {
            Fragment::Comparison {
                locator, operand, ..
            } => {
                locator.contains(sql_text)
                    || matches!(operand, Operand::Locator(other) if other.contains(sql_text))
            }
            Fragment::IsNull { locator, .. }
            | Fragment::Like { locator, .. }
            | Fragment::IsOneOf { locator, .. } => locator.contains(sql_text),
            Fragment::Compound { parts, .. } => parts.iter().any(|p| p.contains(sql_text)),
            Fragment::Not(inner) => inner.contains(sql_text),
            Fragment::Where { sql, .. } => sql.contains(sql_text),
            Fragment::ExcludeSoftDeleted | Fragment::SoftDeletedOnly => {
                DELETED_COLUMN.contains(sql_text)
            }
            Fragment::Tenant(_) => TENANT_COLUMN.contains(sql_text),
            Fragment::CollectionAny { source, filter } => {
                source.contains(sql_text) || filter.contains(sql_text)
            }
            Fragment::CollectionContains { array_locator, .. }
            | Fragment::AllValuesEqual { array_locator, .. }
            | Fragment::AllValuesAreNull { array_locator } => array_locator.contains(sql_text),
            Fragment::Custom(fragment) => fragment.contains(sql_text),
        }
    }
}

impl PartialEq for Fragment {
    /// Structural equality by rendered text and parameters
    fn eq(&self, other: &Self) -> bool {
        let mut left = CommandBuilder::new();
        self.apply(&mut left);
        let mut right = CommandBuilder::new();
        other.apply(&mut right);
        left.build() == right.build()
    }
}

/// Render a single fragment into a fresh command (handy for logging and tests)
pub fn render(fragment: &dyn SqlFragment) -> super::command::Command {
    let mut sql = CommandBuilder::new();
    fragment.apply(&mut sql);
    sql.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_gt(value: i64) -> Fragment {
        Fragment::comparison(
            "CAST(d.data ->> 'Number' as integer)",
            CompareOp::Gt,
            SqlValue::Int(value),
            ValueType::Int,
        )
    }

    #[test]
    fn test_comparison() {
        let command = render(&number_gt(5));
        assert_eq!(command.text, "CAST(d.data ->> 'Number' as integer) > $1");
        assert_eq!(command.values(), vec![&SqlValue::Int(5)]);
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let fragment = Fragment::comparison("d.data ->> 'Name'", CompareOp::Eq, SqlValue::Null, ValueType::Text);
        assert_eq!(render(&fragment).text, "d.data ->> 'Name' is null");

        let fragment =
            Fragment::comparison("d.data ->> 'Name'", CompareOp::NotEq, SqlValue::Null, ValueType::Text);
        assert_eq!(render(&fragment).text, "d.data ->> 'Name' is not null");
    }

    #[test]
    fn test_and_flattens() {
        let fragment = number_gt(1).and(number_gt(2)).and(number_gt(3));
        match &fragment {
            Fragment::Compound { op, parts } => {
                assert_eq!(*op, CompoundOp::And);
                assert_eq!(parts.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            render(&fragment).text,
            "(CAST(d.data ->> 'Number' as integer) > $1 and CAST(d.data ->> 'Number' as integer) > $2 and CAST(d.data ->> 'Number' as integer) > $3)"
        );
    }

    #[test]
    fn test_or_inside_and_keeps_grouping() {
        let fragment = number_gt(1).or(number_gt(2)).and(Fragment::ExcludeSoftDeleted);
        assert_eq!(
            render(&fragment).text,
            "((CAST(d.data ->> 'Number' as integer) > $1 or CAST(d.data ->> 'Number' as integer) > $2) and d.mt_deleted = False)"
        );
    }

    #[test]
    fn test_json_comparison_casts_parameter() {
        let fragment = Fragment::comparison(
            "d.data -> 'Tags'",
            CompareOp::Eq,
            SqlValue::Json(serde_json::json!(["a"])),
            ValueType::Json,
        );
        assert_eq!(render(&fragment).text, "d.data -> 'Tags' = CAST($1 as jsonb)");
    }

    #[test]
    fn test_json_comparison_keeps_raw_value() {
        let raw = SqlValue::TextArray(vec!["a".to_string()]);
        let fragment = Fragment::comparison("d.data -> 'Tags'", CompareOp::Eq, raw.clone(), ValueType::Json);
        let command = render(&fragment);
        assert_eq!(command.text, "d.data -> 'Tags' = CAST($1 as jsonb)");
        assert_eq!(command.parameters[0].value, SqlValue::Json(serde_json::json!(["a"])));
        assert_eq!(command.parameters[0].source_value(), Some(&raw));
        assert_eq!(command.parameters[0].transform(), ValueTransform::ToJson);
    }

    #[test]
    fn test_contains() {
        let fragment = number_gt(1).and(Fragment::ExcludeSoftDeleted);
        assert!(fragment.contains("mt_deleted"));
        assert!(fragment.contains("Number"));
        assert!(!fragment.contains("tenant_id"));
    }

    #[test]
    fn test_conjoin() {
        assert!(Fragment::conjoin(vec![]).is_none());
        let single = Fragment::conjoin(vec![Fragment::ExcludeSoftDeleted]).unwrap();
        assert_eq!(render(&single).text, "d.mt_deleted = False");
    }

    #[test]
    fn test_collection_fragments() {
        let contains = Fragment::CollectionContains {
            array_locator: "d.tags".to_string(),
            value: SqlValue::Text("red".into()),
        };
        assert_eq!(render(&contains).text, "$1 = ANY(d.tags)");

        let all_null = Fragment::AllValuesAreNull {
            array_locator: "d.tags".to_string(),
        };
        assert_eq!(render(&all_null).text, "true = ALL(select unnest(d.tags) is null)");
    }
}
