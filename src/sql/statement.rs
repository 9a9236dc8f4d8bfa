//! Statement pipeline
//!
//! Statements form a singly linked chain: each selector statement may point
//! at a `previous` statement that renders first, separated by `;`. The last
//! statement of the chain is the terminal selector whose columns define the
//! result shape. Every statement in `Select` mode produces one result set.

use super::command::{Command, CommandBuilder};
use super::fragments::{Fragment, SqlFragment};
use super::select::SelectClause;
use crate::schema::DOCUMENT_ALIAS;
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementMode {
    /// Produces a result set read by a handler
    #[default]
    Select,
    /// Embedded inside another statement
    Inner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub locator: String,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub enum FromSource {
    /// A document table, aliased `d`
    Table(String),
    /// A temporary table exported by an earlier statement, aliased `d`
    Export(String),
    /// A nested selection, e.g. an exploded collection
    Subquery {
        statement: Box<SelectorStatement>,
        alias: String,
    },
}

impl FromSource {
    fn apply(&self, sql: &mut CommandBuilder) {
        match self {
            FromSource::Table(name) | FromSource::Export(name) => {
                sql.append(name);
                sql.append(" as ");
                sql.append(DOCUMENT_ALIAS);
            }
            FromSource::Subquery { statement, alias } => {
                sql.append("(");
                statement.apply(sql);
                sql.append(") as ");
                sql.append(alias);
            }
        }
    }
}

/// select / from / where / order by / limit / offset
#[derive(Debug, Clone)]
pub struct SelectorStatement {
    pub select: SelectClause,
    pub from: FromSource,
    pub wheres: Vec<Fragment>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<SqlValue>,
    pub offset: Option<SqlValue>,
    pub mode: StatementMode,
    pub previous: Option<Box<Statement>>,
}

impl SelectorStatement {
    pub fn new(select: SelectClause, from: FromSource) -> Self {
        Self {
            select,
            from,
            wheres: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
            mode: StatementMode::Select,
            previous: None,
        }
    }

    pub fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Force this statement into nested mode
    pub fn into_inner(mut self) -> Self {
        self.mode = StatementMode::Inner;
        self
    }

    pub fn apply(&self, sql: &mut CommandBuilder) {
        if let Some(previous) = &self.previous {
            previous.apply(sql);
            sql.append(";\n");
        }

        self.select.apply(sql);
        sql.append(" from ");
        self.from.apply(sql);

        for (i, filter) in self.wheres.iter().enumerate() {
            sql.append(if i == 0 { " where " } else { " and " });
            filter.apply(sql);
        }

        if !self.orderings.is_empty() {
            sql.append(" order by ");
            for (i, ordering) in self.orderings.iter().enumerate() {
                if i > 0 {
                    sql.append(", ");
                }
                sql.append(&ordering.locator);
                if ordering.descending {
                    sql.append(" desc");
                }
            }
        }

        if let Some(limit) = &self.limit {
            sql.append(" LIMIT ");
            sql.append_parameter(limit.clone());
        }
        if let Some(offset) = &self.offset {
            sql.append(" OFFSET ");
            sql.append_parameter(offset.clone());
        }
    }
}

/// Stages the rows of an inner statement in a session temporary table
#[derive(Debug, Clone)]
pub struct TemporaryTableStatement {
    pub name: String,
    pub inner: Box<SelectorStatement>,
}

impl TemporaryTableStatement {
    pub fn new(name: impl Into<String>, inner: SelectorStatement) -> Self {
        Self {
            name: name.into(),
            inner: Box::new(inner.into_inner()),
        }
    }

    /// Source for statements reading the staged rows
    pub fn export(&self) -> FromSource {
        FromSource::Export(self.name.clone())
    }

    pub fn apply(&self, sql: &mut CommandBuilder) {
        sql.append("drop table if exists ");
        sql.append(&self.name);
        sql.append(";\ncreate temp table ");
        sql.append(&self.name);
        sql.append(" as (\n");
        self.inner.apply(sql);
        sql.append("\n)");
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectorStatement),
    TemporaryTable(TemporaryTableStatement),
}

impl Statement {
    pub fn apply(&self, sql: &mut CommandBuilder) {
        match self {
            Statement::Select(statement) => statement.apply(sql),
            Statement::TemporaryTable(statement) => statement.apply(sql),
        }
    }

    /// Number of result sets the whole chain produces
    pub fn result_set_count(&self) -> usize {
        match self {
            Statement::Select(statement) => {
                let own = usize::from(statement.mode == StatementMode::Select);
                own + statement
                    .previous
                    .as_ref()
                    .map(|p| p.result_set_count())
                    .unwrap_or(0)
            }
            Statement::TemporaryTable(_) => 0,
        }
    }

    /// The statement whose columns define the result shape
    pub fn terminal(&self) -> Option<&SelectorStatement> {
        match self {
            Statement::Select(statement) => Some(statement),
            Statement::TemporaryTable(_) => None,
        }
    }

    pub fn to_command(&self) -> Command {
        let mut sql = CommandBuilder::new();
        self.apply(&mut sql);
        sql.build()
    }
}

impl From<SelectorStatement> for Statement {
    fn from(statement: SelectorStatement) -> Self {
        Statement::Select(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::fragments::CompareOp;
    use crate::sql::select::StatsSource;
    use crate::value::ValueType;

    fn target_statement() -> SelectorStatement {
        let mut statement = SelectorStatement::new(
            SelectClause::Documents,
            FromSource::Table("public.mt_doc_target".to_string()),
        );
        statement.wheres.push(Fragment::comparison(
            "CAST(d.data ->> 'Number' as integer)",
            CompareOp::Gt,
            SqlValue::Int(3),
            ValueType::Int,
        ));
        statement
    }

    #[test]
    fn test_select_statement() {
        let mut statement = target_statement();
        statement.wheres.push(Fragment::ExcludeSoftDeleted);
        statement.orderings.push(Ordering {
            locator: "d.data ->> 'String'".to_string(),
            descending: true,
        });
        statement.limit = Some(SqlValue::Int(10));
        statement.offset = Some(SqlValue::Int(20));

        let command = Statement::from(statement).to_command();
        assert_eq!(
            command.text,
            "select d.data from public.mt_doc_target as d where CAST(d.data ->> 'Number' as integer) > $1 and d.mt_deleted = False order by d.data ->> 'String' desc LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            command.values(),
            vec![&SqlValue::Int(3), &SqlValue::Int(10), &SqlValue::Int(20)]
        );
    }

    #[test]
    fn test_temporary_table_forces_inner_mode() {
        let temp = TemporaryTableStatement::new("mt_temp_id_list1", target_statement());
        assert_eq!(temp.inner.mode, StatementMode::Inner);

        let mut outer = SelectorStatement::new(SelectClause::Documents, temp.export());
        outer.previous = Some(Box::new(Statement::TemporaryTable(temp)));
        let statement = Statement::from(outer);

        assert_eq!(statement.result_set_count(), 1);
        assert_eq!(
            statement.to_command().text,
            "drop table if exists mt_temp_id_list1;\ncreate temp table mt_temp_id_list1 as (\nselect d.data from public.mt_doc_target as d where CAST(d.data ->> 'Number' as integer) > $1\n);\nselect d.data from mt_temp_id_list1 as d"
        );
    }

    #[test]
    fn test_subquery_source() {
        let mut inner = SelectorStatement::new(
            SelectClause::Projection {
                locator: "jsonb_array_elements_text(d.data -> 'Tags')".to_string(),
            },
            FromSource::Table("public.mt_doc_target".to_string()),
        );
        inner.mode = StatementMode::Inner;

        let outer = SelectorStatement::new(
            SelectClause::Count,
            FromSource::Subquery {
                statement: Box::new(inner),
                alias: "e1".to_string(),
            },
        );
        assert_eq!(
            Statement::from(outer).to_command().text,
            "select count(*) as data from (select jsonb_array_elements_text(d.data -> 'Tags') as data from public.mt_doc_target as d) as e1"
        );
    }

    #[test]
    fn test_statistics_column() {
        let mut statement = target_statement();
        statement.select = statement.select.with_statistics(StatsSource::Compute);
        let command = Statement::from(statement).to_command();
        assert!(command.text.starts_with("select d.data, count(*) OVER() as total_rows from"));
    }
}
