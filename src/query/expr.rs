//! Predicate expressions
//!
//! Queries describe their filters as a small expression tree over member
//! paths. The tree is compiled into SQL fragments by the filter compiler.
//!
//! ```ignore
//! use docql::query::expr::{elem, field};
//!
//! let predicate = field("Number").gt(5)
//!     .and(field("Tags").any(elem().eq("red")))
//!     .or(field("Name").starts_with("Al"));
//! ```

use crate::sql::command::ValueTransform;
use crate::sql::fragments::{CompareOp, Fragment};
use crate::value::{QueryEnum, SqlValue};

#[derive(Debug, Clone)]
pub enum Expr {
    /// Dotted member path, e.g. `Address.City` or `Tags.Count`
    Member(String),
    /// The current element of a scalar collection inside `any`/`all`
    Element,
    Constant(SqlValue),
    /// Enum constant, written by name or ordinal per the store options
    Enum { name: &'static str, ordinal: i64 },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Any {
        collection: String,
        predicate: Option<Box<Expr>>,
    },
    All {
        collection: String,
        predicate: Box<Expr>,
    },
    Contains {
        collection: String,
        value: SqlValue,
    },
    Like {
        target: Box<Expr>,
        value: SqlValue,
        transform: ValueTransform,
    },
    IsOneOf {
        target: Box<Expr>,
        values: SqlValue,
    },
    /// Raw SQL with `?` argument markers
    Sql {
        sql: String,
        arguments: Vec<SqlValue>,
    },
    Fragment(Fragment),
}

/// Reference a document member by path
pub fn field(path: &str) -> Expr {
    Expr::Member(path.to_string())
}

/// Reference the current collection element
pub fn elem() -> Expr {
    Expr::Element
}

/// Escape to hand-written SQL: each `?` in `sql` binds the next argument
pub fn matches_sql(sql: &str, arguments: Vec<SqlValue>) -> Expr {
    Expr::Sql {
        sql: sql.to_string(),
        arguments,
    }
}

impl Expr {
    fn compare(self, op: CompareOp, right: Expr) -> Expr {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::Eq, Expr::Constant(value.into()))
    }

    pub fn ne(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::NotEq, Expr::Constant(value.into()))
    }

    pub fn gt(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::Gt, Expr::Constant(value.into()))
    }

    pub fn ge(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::GtEq, Expr::Constant(value.into()))
    }

    pub fn lt(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::Lt, Expr::Constant(value.into()))
    }

    pub fn le(self, value: impl Into<SqlValue>) -> Expr {
        self.compare(CompareOp::LtEq, Expr::Constant(value.into()))
    }

    pub fn is_null(self) -> Expr {
        self.compare(CompareOp::Eq, Expr::Constant(SqlValue::Null))
    }

    pub fn is_not_null(self) -> Expr {
        self.compare(CompareOp::NotEq, Expr::Constant(SqlValue::Null))
    }

    /// Compare against another member of the same document
    pub fn eq_member(self, path: &str) -> Expr {
        self.compare(CompareOp::Eq, field(path))
    }

    pub fn eq_enum<E: QueryEnum>(self, value: E) -> Expr {
        self.compare(
            CompareOp::Eq,
            Expr::Enum {
                name: value.name(),
                ordinal: value.ordinal(),
            },
        )
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn starts_with(self, value: impl Into<SqlValue>) -> Expr {
        self.like(value, ValueTransform::StartsWith)
    }

    pub fn ends_with(self, value: impl Into<SqlValue>) -> Expr {
        self.like(value, ValueTransform::EndsWith)
    }

    /// Substring match on a text member
    pub fn contains_text(self, value: impl Into<SqlValue>) -> Expr {
        self.like(value, ValueTransform::Contains)
    }

    fn like(self, value: impl Into<SqlValue>, transform: ValueTransform) -> Expr {
        Expr::Like {
            target: Box::new(self),
            value: value.into(),
            transform,
        }
    }

    pub fn is_one_of(self, values: impl Into<SqlValue>) -> Expr {
        Expr::IsOneOf {
            target: Box::new(self),
            values: values.into(),
        }
    }

    /// `Tags.Count` for a collection member
    pub fn count(self) -> Expr {
        match self {
            Expr::Member(path) => Expr::Member(format!("{}.Count", path)),
            other => other,
        }
    }

    /// Some element of the collection satisfies `predicate`
    pub fn any(self, predicate: Expr) -> Expr {
        Expr::Any {
            collection: self.member_path(),
            predicate: Some(Box::new(predicate)),
        }
    }

    /// The collection has at least one element
    pub fn is_not_empty(self) -> Expr {
        Expr::Any {
            collection: self.member_path(),
            predicate: None,
        }
    }

    /// Every element of the collection satisfies `predicate`
    pub fn all(self, predicate: Expr) -> Expr {
        Expr::All {
            collection: self.member_path(),
            predicate: Box::new(predicate),
        }
    }

    pub fn contains(self, value: impl Into<SqlValue>) -> Expr {
        Expr::Contains {
            collection: self.member_path(),
            value: value.into(),
        }
    }

    fn member_path(&self) -> String {
        match self {
            Expr::Member(path) => path.clone(),
            _ => String::new(),
        }
    }
}

impl From<Fragment> for Expr {
    fn from(fragment: Fragment) -> Self {
        Expr::Fragment(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        match field("Number").gt(5) {
            Expr::Compare { left, op, right } => {
                assert!(matches!(*left, Expr::Member(ref p) if p == "Number"));
                assert_eq!(op, CompareOp::Gt);
                assert!(matches!(*right, Expr::Constant(SqlValue::Int(5))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_count_suffix() {
        assert!(matches!(field("Tags").count(), Expr::Member(ref p) if p == "Tags.Count"));
    }

    #[test]
    fn test_collection_builders_keep_path() {
        match field("Tags").any(elem().eq("red")) {
            Expr::Any {
                collection,
                predicate,
            } => {
                assert_eq!(collection, "Tags");
                assert!(predicate.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            field("Tags").contains("red"),
            Expr::Contains { ref collection, .. } if collection == "Tags"
        ));
    }
}
