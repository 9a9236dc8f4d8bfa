//! Filter compiler: predicate expressions to SQL fragments.

use super::expr::Expr;
use crate::config::EnumStorage;
use crate::error::{DbError, DbResult};
use crate::schema::members::{CollectionMember, ElementMember, LocatedMember, MemberTable, ValueMember};
use crate::sql::fragments::{CompareOp, Fragment, Operand};
use crate::value::{SqlValue, ValueType};

/// A resolved comparison operand
enum Resolved<'a> {
    Value(&'a ValueMember),
    Collection(&'a CollectionMember),
    Constant(SqlValue),
}

/// Compiles predicates against one member table (a document, or the
/// elements of a collection inside `any`/`all`).
pub struct FilterCompiler<'a> {
    members: Option<&'a MemberTable>,
    element: Option<&'a ValueMember>,
    enum_storage: EnumStorage,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(members: &'a MemberTable, enum_storage: EnumStorage) -> Self {
        Self {
            members: Some(members),
            element: None,
            enum_storage,
        }
    }

    /// Compiler for predicates over the elements of `collection`
    pub fn for_elements(collection: &'a CollectionMember, enum_storage: EnumStorage) -> Self {
        match &collection.element {
            ElementMember::Scalar(element) => Self {
                members: None,
                element: Some(element),
                enum_storage,
            },
            ElementMember::Document(members) => Self {
                members: Some(members.as_ref()),
                element: None,
                enum_storage,
            },
        }
    }

    /// Compile and AND together every predicate
    pub fn compile_all(&self, exprs: &[Expr]) -> DbResult<Option<Fragment>> {
        let fragments = exprs
            .iter()
            .map(|expr| self.compile(expr))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Fragment::conjoin(fragments))
    }

    pub fn compile(&self, expr: &Expr) -> DbResult<Fragment> {
        match expr {
            Expr::Member(_) | Expr::Element => self.boolean_member(expr, true),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Member(_) | Expr::Element => self.boolean_member(inner, false),
                other => Ok(Fragment::Not(Box::new(self.compile(other)?))),
            },
            Expr::And(left, right) => Ok(self.compile(left)?.and(self.compile(right)?)),
            Expr::Or(left, right) => Ok(self.compile(left)?.or(self.compile(right)?)),
            Expr::Compare { left, op, right } => self.comparison(left, *op, right),
            Expr::Any {
                collection,
                predicate,
            } => {
                let collection = self.collection(collection)?;
                match predicate {
                    None => Ok(Fragment::raw(format!("{} > 0", collection.length.locator()), vec![])),
                    Some(predicate) => {
                        let filter = FilterCompiler::for_elements(collection, self.enum_storage)
                            .compile(predicate)?;
                        Ok(Fragment::CollectionAny {
                            source: collection.explode_source(),
                            filter: Box::new(filter),
                        })
                    }
                }
            }
            Expr::All {
                collection,
                predicate,
            } => self.all(collection, predicate),
            Expr::Contains { collection, value } => {
                let member = self.collection(collection)?;
                match &member.array_locator {
                    Some(array_locator) => Ok(Fragment::CollectionContains {
                        array_locator: array_locator.clone(),
                        value: value.clone(),
                    }),
                    None => Err(DbError::UnsupportedQueryShape(format!(
                        "Contains() on the document collection '{}'",
                        member.path
                    ))),
                }
            }
            Expr::Like {
                target,
                value,
                transform,
            } => {
                let member = self.value_member(target, "LIKE")?;
                Ok(Fragment::Like {
                    locator: member.locator().to_string(),
                    value: value.clone(),
                    transform: *transform,
                })
            }
            Expr::IsOneOf { target, values } => {
                let member = self.value_member(target, "IsOneOf()")?;
                Ok(Fragment::IsOneOf {
                    locator: member.locator().to_string(),
                    values: values.clone(),
                })
            }
            Expr::Sql { sql, arguments } => Ok(Fragment::raw(sql.clone(), arguments.clone())),
            Expr::Fragment(fragment) => Ok(fragment.clone()),
            Expr::Constant(_) | Expr::Enum { .. } => Err(DbError::UnsupportedQueryShape(
                "a constant used as a predicate".to_string(),
            )),
        }
    }

    /// Locator of a member or scalar element, for select lists and orderings
    pub fn locator(&self, expr: &Expr) -> DbResult<String> {
        match expr {
            Expr::Member(path) => Ok(self.locate(path)?.locator().to_string()),
            Expr::Element => match self.resolve(expr)? {
                Resolved::Value(element) => Ok(element.locator().to_string()),
                _ => Err(DbError::UnsupportedQueryShape(
                    "element reference outside of a scalar collection".to_string(),
                )),
            },
            other => Err(DbError::UnsupportedQueryShape(format!(
                "{:?} used as a projection or ordering",
                other
            ))),
        }
    }

    /// `flag` => `locator = True`, `!flag` => `locator = False`
    fn boolean_member(&self, expr: &Expr, expected: bool) -> DbResult<Fragment> {
        match self.resolve(expr)? {
            Resolved::Value(member) if member.value_type == ValueType::Bool => Ok(Fragment::raw(
                format!(
                    "{} = {}",
                    member.locator(),
                    if expected { "True" } else { "False" }
                ),
                vec![],
            )),
            _ => Err(DbError::UnsupportedQueryShape(format!(
                "non-boolean expression {:?} used as a predicate",
                expr
            ))),
        }
    }

    fn comparison(&self, left: &Expr, op: CompareOp, right: &Expr) -> DbResult<Fragment> {
        match (self.resolve(left)?, self.resolve(right)?) {
            (Resolved::Value(member), Resolved::Constant(value)) => {
                Ok(Fragment::comparison(member.locator(), op, value, member.value_type))
            }
            (Resolved::Constant(value), Resolved::Value(member)) => Ok(Fragment::comparison(
                member.locator(),
                op.reverse(),
                value,
                member.value_type,
            )),
            (Resolved::Value(left), Resolved::Value(right)) => Ok(Fragment::Comparison {
                locator: left.locator().to_string(),
                op,
                operand: Operand::Locator(right.locator().to_string()),
                value_type: left.value_type,
            }),
            (Resolved::Collection(collection), Resolved::Constant(value)) => {
                collection.whole_collection_fragment(op, value)
            }
            (Resolved::Constant(value), Resolved::Collection(collection)) => {
                collection.whole_collection_fragment(op.reverse(), value)
            }
            _ => Err(DbError::UnsupportedQueryShape(format!(
                "comparison {:?} {} {:?}",
                left,
                op.sql(),
                right
            ))),
        }
    }

    /// Only `elem() == value` is expressible under `all`
    fn all(&self, collection: &str, predicate: &Expr) -> DbResult<Fragment> {
        let member = self.collection(collection)?;
        let unsupported = || {
            DbError::UnsupportedQueryShape(format!(
                "All() on '{}' supports only equality against the element",
                member.path
            ))
        };
        let array_locator = member.array_locator.clone().ok_or_else(unsupported)?;

        let value = match predicate {
            Expr::Compare {
                left,
                op: CompareOp::Eq,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Element, other) | (other, Expr::Element) => self.constant(other),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(unsupported)?;

        if value.is_null() {
            Ok(Fragment::AllValuesAreNull { array_locator })
        } else {
            Ok(Fragment::AllValuesEqual {
                array_locator,
                value,
            })
        }
    }

    fn constant(&self, expr: &Expr) -> Option<SqlValue> {
        match expr {
            Expr::Constant(value) => Some(value.clone()),
            Expr::Enum { name, ordinal } => Some(self.enum_value(name, *ordinal)),
            _ => None,
        }
    }

    fn enum_value(&self, name: &str, ordinal: i64) -> SqlValue {
        match self.enum_storage {
            EnumStorage::AsString => SqlValue::Text(name.to_string()),
            EnumStorage::AsInteger => SqlValue::Int(ordinal),
        }
    }

    fn resolve(&self, expr: &Expr) -> DbResult<Resolved<'a>> {
        if let Some(value) = self.constant(expr) {
            return Ok(Resolved::Constant(value));
        }
        match expr {
            Expr::Element => self.element.map(Resolved::Value).ok_or_else(|| {
                DbError::UnsupportedQueryShape(
                    "element reference outside of a scalar collection".to_string(),
                )
            }),
            Expr::Member(path) => match self.locate(path)? {
                LocatedMember::Value(member) => Ok(Resolved::Value(member)),
                LocatedMember::Collection(member) => Ok(Resolved::Collection(member)),
                LocatedMember::Child(child) => Err(DbError::UnsupportedQueryShape(format!(
                    "comparison against the child object '{}'",
                    child.path
                ))),
            },
            other => Err(DbError::UnsupportedQueryShape(format!(
                "{:?} used as a comparison operand",
                other
            ))),
        }
    }

    fn locate(&self, path: &str) -> DbResult<LocatedMember<'a>> {
        match self.members {
            Some(members) => members.locate(path),
            None => Err(DbError::UnsupportedQueryShape(format!(
                "member '{}' on a scalar collection element",
                path
            ))),
        }
    }

    fn value_member(&self, expr: &Expr, operation: &str) -> DbResult<&'a ValueMember> {
        match self.resolve(expr)? {
            Resolved::Value(member) => Ok(member),
            _ => Err(DbError::UnsupportedQueryShape(format!(
                "{} on {:?}",
                operation, expr
            ))),
        }
    }

    fn collection(&self, path: &str) -> DbResult<&'a CollectionMember> {
        match self.locate(path)? {
            LocatedMember::Collection(member) => Ok(member),
            _ => Err(DbError::UnsupportedQueryShape(format!(
                "'{}' is not a collection",
                path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{elem, field, matches_sql};
    use crate::schema::members::MemberTableBuilder;
    use crate::sql::fragments::render;

    fn target_members() -> MemberTable {
        MemberTableBuilder::new("Target", "d.data", 0)
            .field("Number", ValueType::Int)
            .field("String", ValueType::Text)
            .field("Flag", ValueType::Bool)
            .field("Color", ValueType::Text)
            .duplicated("OtherId", ValueType::Uuid)
            .child("Inner", |c| c.field("Number", ValueType::Int))
            .collection("Tags", ValueType::Text)
            .document_collection("Children", |c| c.field("Number", ValueType::Int))
            .build()
    }

    fn compile(expr: Expr) -> DbResult<Fragment> {
        let members = target_members();
        FilterCompiler::new(&members, EnumStorage::AsString).compile(&expr)
    }

    fn text(expr: Expr) -> String {
        render(&compile(expr).unwrap()).text
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(text(field("Number").gt(3)), "CAST(d.data ->> 'Number' as integer) > $1");
        assert_eq!(text(field("String").ne("a")), "d.data ->> 'String' != $1");
        assert_eq!(text(field("Inner.Number").le(1)), "CAST(d.data -> 'Inner' ->> 'Number' as integer) <= $1");
    }

    #[test]
    fn test_constant_on_the_left_reverses_operator() {
        let expr = Expr::Compare {
            left: Box::new(Expr::Constant(SqlValue::Int(5))),
            op: CompareOp::Lt,
            right: Box::new(field("Number")),
        };
        assert_eq!(text(expr), "CAST(d.data ->> 'Number' as integer) > $1");
    }

    #[test]
    fn test_duplicated_member_uses_column() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(text(field("OtherId").eq(id)), "d.other_id = $1");
    }

    #[test]
    fn test_boolean_members() {
        assert_eq!(text(field("Flag")), "CAST(d.data ->> 'Flag' as boolean) = True");
        assert_eq!(text(field("Flag").not()), "CAST(d.data ->> 'Flag' as boolean) = False");
        assert!(matches!(compile(field("Number")), Err(DbError::UnsupportedQueryShape(_))));
    }

    #[test]
    fn test_null_comparisons() {
        assert_eq!(text(field("String").is_null()), "d.data ->> 'String' is null");
        assert_eq!(text(field("String").is_not_null()), "d.data ->> 'String' is not null");
    }

    #[test]
    fn test_logical_operators() {
        let expr = field("Number").gt(1).and(field("Number").lt(10)).or(field("String").eq("x").not());
        assert_eq!(
            text(expr),
            "((CAST(d.data ->> 'Number' as integer) > $1 and CAST(d.data ->> 'Number' as integer) < $2) or NOT(d.data ->> 'String' = $3))"
        );
    }

    #[test]
    fn test_member_to_member_comparison() {
        assert_eq!(
            text(field("Number").eq_member("Inner.Number")),
            "CAST(d.data ->> 'Number' as integer) = CAST(d.data -> 'Inner' ->> 'Number' as integer)"
        );
    }

    #[test]
    fn test_any_explodes_collection() {
        assert_eq!(
            text(field("Tags").any(elem().eq("red"))),
            "exists (select 1 from jsonb_array_elements_text(d.data -> 'Tags') as e1(data) where e1.data = $1)"
        );
        assert_eq!(
            text(field("Children").any(field("Number").gt(2))),
            "exists (select 1 from jsonb_array_elements(d.data -> 'Children') as e1(data) where CAST(e1.data ->> 'Number' as integer) > $1)"
        );
    }

    #[test]
    fn test_any_without_predicate_checks_length() {
        assert_eq!(text(field("Tags").is_not_empty()), "jsonb_array_length(d.data -> 'Tags') > 0");
    }

    #[test]
    fn test_contains_does_not_explode() {
        let sql = text(field("Tags").contains("red"));
        assert_eq!(
            sql,
            "$1 = ANY(CAST(ARRAY(SELECT jsonb_array_elements_text(d.data -> 'Tags')) as varchar[]))"
        );
        assert!(!sql.contains(" as e1(data)"));
    }

    #[test]
    fn test_all() {
        assert_eq!(
            text(field("Tags").all(elem().eq("red"))),
            "$1 = ALL(CAST(ARRAY(SELECT jsonb_array_elements_text(d.data -> 'Tags')) as varchar[]))"
        );
        assert!(text(field("Tags").all(elem().is_null())).starts_with("true = ALL(select unnest("));

        let err = compile(field("Tags").all(elem().gt("a"))).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedQueryShape(_)));
    }

    #[test]
    fn test_count_member() {
        assert_eq!(text(field("Tags").count().gt(2)), "jsonb_array_length(d.data -> 'Tags') > $1");
    }

    #[test]
    fn test_string_predicates() {
        let fragment = compile(field("String").starts_with("Al")).unwrap();
        let command = render(&fragment);
        assert_eq!(command.text, "d.data ->> 'String' LIKE $1");
        assert_eq!(command.values(), vec![&SqlValue::Text("Al%".to_string())]);

        assert_eq!(text(field("String").is_one_of(vec!["a", "b"])), "d.data ->> 'String' = ANY($1)");
    }

    #[test]
    fn test_raw_sql_escape() {
        let command = render(
            &compile(matches_sql("d.data ->> 'String' ilike ?", vec![SqlValue::from("%a%")])).unwrap(),
        );
        assert_eq!(command.text, "d.data ->> 'String' ilike $1");
    }

    #[test]
    fn test_enum_constants_follow_storage() {
        #[derive(Debug, Clone, Copy)]
        enum Color {
            Green,
        }
        impl crate::value::QueryEnum for Color {
            fn variants() -> &'static [Self] {
                &[Color::Green]
            }
            fn name(&self) -> &'static str {
                "Green"
            }
            fn ordinal(&self) -> i64 {
                0
            }
        }

        let members = target_members();
        let fragment = FilterCompiler::new(&members, EnumStorage::AsString)
            .compile(&field("Color").eq_enum(Color::Green))
            .unwrap();
        assert_eq!(render(&fragment).values(), vec![&SqlValue::Text("Green".to_string())]);

        let fragment = FilterCompiler::new(&members, EnumStorage::AsInteger)
            .compile(&field("Color").eq_enum(Color::Green))
            .unwrap();
        assert_eq!(render(&fragment).values(), vec![&SqlValue::Int(0)]);
    }

    #[test]
    fn test_locators_for_projection() {
        let members = target_members();
        let compiler = FilterCompiler::new(&members, EnumStorage::AsString);
        assert_eq!(compiler.locator(&field("Number")).unwrap(), "CAST(d.data ->> 'Number' as integer)");
        assert_eq!(compiler.locator(&field("Inner")).unwrap(), "d.data -> 'Inner'");
        assert!(compiler.locator(&elem()).is_err());

        let tags = members.locate("Tags").unwrap().as_collection().unwrap();
        let elements = FilterCompiler::for_elements(tags, EnumStorage::AsString);
        assert_eq!(elements.locator(&elem()).unwrap(), "e1.data");
    }

    #[test]
    fn test_unknown_member() {
        let err = compile(field("Missing").eq(1)).unwrap_err();
        assert!(matches!(err, DbError::MemberNotFound { .. }));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let build = || field("Number").gt(1).and(field("Tags").any(elem().eq("a")));
        let first = render(&compile(build()).unwrap());
        let second = render(&compile(build()).unwrap());
        assert_eq!(first, second);
    }
}
