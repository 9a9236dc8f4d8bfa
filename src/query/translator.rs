//! Query model to statement pipeline.

use super::compiler::FilterCompiler;
use super::pagination::page_offset;
use super::{ChildStage, Include, OrderBy, QueryModel, QueryStage, ResultOperator, SoftDeleteMode};
use crate::config::EnumStorage;
use crate::error::{DbError, DbResult};
use crate::schema::{DocumentMapping, LocatedMember, TenancyStyle, DOCUMENT_ALIAS};
use crate::session::Session;
use crate::sql::{
    Fragment, FromSource, Ordering, SelectClause, SelectorStatement, Statement, StatsSource,
    TemporaryTableStatement,
};
use crate::value::SqlValue;

pub struct QueryTranslator<'a> {
    mapping: &'a DocumentMapping,
    enum_storage: EnumStorage,
    session: &'a dyn Session,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(mapping: &'a DocumentMapping, enum_storage: EnumStorage, session: &'a dyn Session) -> Self {
        Self {
            mapping,
            enum_storage,
            session,
        }
    }

    pub fn translate(&self, model: &QueryModel, operator: ResultOperator) -> DbResult<Statement> {
        if let Some(reason) = &model.unsupported {
            return Err(DbError::UnsupportedQueryShape(reason.clone()));
        }

        let mut statement = match &model.child {
            None => self.document_statement(model)?,
            Some(child) => self.child_statement(model, child)?,
        };

        match operator {
            ResultOperator::First | ResultOperator::FirstOrDefault => {
                statement.limit = Some(SqlValue::Int(1));
            }
            ResultOperator::Single | ResultOperator::SingleOrDefault => {
                statement.limit = Some(SqlValue::Int(2));
            }
            ResultOperator::Paged {
                page_number,
                page_size,
            } => {
                statement.limit = Some(SqlValue::Int(page_size));
                statement.offset = Some(SqlValue::Int(page_offset(page_number, page_size)));
            }
            ResultOperator::ToList | ResultOperator::Count | ResultOperator::Any => {}
        }

        if operator.is_aggregate() {
            let aggregate = if operator == ResultOperator::Count {
                SelectClause::Count
            } else {
                SelectClause::Any
            };
            statement = Self::aggregate(statement, aggregate);
        } else if model.statistics.is_some() || matches!(operator, ResultOperator::Paged { .. }) {
            statement.select = statement.select.with_statistics(StatsSource::Compute);
        }

        if model.includes.is_empty() {
            return Ok(Statement::Select(statement));
        }
        if model.is_projected() || operator.is_aggregate() {
            return Err(DbError::UnsupportedQueryShape(
                "include() on a query that does not return documents".to_string(),
            ));
        }
        self.with_includes(statement, &model.includes)
    }

    /// Filters every query against this document type carries
    fn implicit_filters(mapping: &DocumentMapping, soft_delete: SoftDeleteMode, tenant_id: &str) -> Vec<Fragment> {
        let mut filters = Vec::new();
        if mapping.soft_deleted {
            match soft_delete {
                SoftDeleteMode::Exclude => filters.push(Fragment::ExcludeSoftDeleted),
                SoftDeleteMode::Only => filters.push(Fragment::SoftDeletedOnly),
                SoftDeleteMode::Include => {}
            }
        }
        if mapping.tenancy == TenancyStyle::Conjoined {
            filters.push(Fragment::Tenant(tenant_id.to_string()));
        }
        filters
    }

    fn apply_stage(
        &self,
        statement: &mut SelectorStatement,
        compiler: &FilterCompiler<'_>,
        stage: &QueryStage,
    ) -> DbResult<()> {
        if let Some(filter) = compiler.compile_all(&stage.wheres)? {
            statement.wheres.push(filter);
        }
        statement.orderings = Self::orderings(compiler, &stage.orderings)?;
        statement.limit = stage.take.clone();
        statement.offset = stage.skip.clone();
        Ok(())
    }

    fn orderings(compiler: &FilterCompiler<'_>, orderings: &[OrderBy]) -> DbResult<Vec<Ordering>> {
        orderings
            .iter()
            .map(|ordering| {
                Ok(Ordering {
                    locator: compiler.locator(&ordering.target)?,
                    descending: ordering.descending,
                })
            })
            .collect()
    }

    fn document_statement(&self, model: &QueryModel) -> DbResult<SelectorStatement> {
        let compiler = FilterCompiler::new(self.mapping.members(), self.enum_storage);
        let select = match &model.parent.projection {
            Some(target) => SelectClause::Projection {
                locator: compiler.locator(target)?,
            },
            None => SelectClause::Documents,
        };

        let mut statement = SelectorStatement::new(select, FromSource::Table(self.mapping.table_name.clone()));
        self.apply_stage(&mut statement, &compiler, &model.parent)?;
        statement.wheres.extend(Self::implicit_filters(
            self.mapping,
            model.soft_delete,
            self.session.tenant_id(),
        ));
        Ok(statement)
    }

    /// `select <element> from (select <explode> as data from <table> ...) as e1`
    fn child_statement(&self, model: &QueryModel, child: &ChildStage) -> DbResult<SelectorStatement> {
        let compiler = FilterCompiler::new(self.mapping.members(), self.enum_storage);
        let collection = match self.mapping.members().locate(&child.collection)? {
            LocatedMember::Collection(collection) => collection,
            _ => {
                return Err(DbError::UnsupportedQueryShape(format!(
                    "select_many over '{}', which is not a collection",
                    child.collection
                )))
            }
        };

        let mut parent = SelectorStatement::new(
            SelectClause::Projection {
                locator: collection.explode_locator.clone(),
            },
            FromSource::Table(self.mapping.table_name.clone()),
        );
        self.apply_stage(&mut parent, &compiler, &model.parent)?;
        parent.wheres.extend(Self::implicit_filters(
            self.mapping,
            model.soft_delete,
            self.session.tenant_id(),
        ));

        let elements = FilterCompiler::for_elements(collection, self.enum_storage);
        let locator = match &child.stage.projection {
            Some(target) => elements.locator(target)?,
            None if collection.is_scalar() => elements.locator(&super::elem())?,
            None => format!("{}.data", collection.element_alias),
        };

        let mut statement = SelectorStatement::new(
            SelectClause::Projection { locator },
            FromSource::Subquery {
                statement: Box::new(parent.into_inner()),
                alias: collection.element_alias.clone(),
            },
        );
        self.apply_stage(&mut statement, &elements, &child.stage)?;
        Ok(statement)
    }

    /// Narrow a statement to one aggregate value, wrapping it when paged
    fn aggregate(mut statement: SelectorStatement, aggregate: SelectClause) -> SelectorStatement {
        if statement.is_paged() {
            return SelectorStatement::new(
                aggregate,
                FromSource::Subquery {
                    statement: Box::new(statement.into_inner()),
                    alias: DOCUMENT_ALIAS.to_string(),
                },
            );
        }
        statement.select = aggregate;
        statement.orderings.clear();
        statement
    }

    /// Stage the main rows in a temp table, read the related documents,
    /// then select the staged rows
    fn with_includes(&self, statement: SelectorStatement, includes: &[Include]) -> DbResult<Statement> {
        let has_statistics = statement.select.stats_column().is_some();
        let orderings = statement.orderings.clone();

        let mut staged = statement;
        staged.select = if has_statistics {
            SelectClause::AllColumns.with_statistics(StatsSource::Compute)
        } else {
            SelectClause::AllColumns
        };
        let temp = TemporaryTableStatement::new(self.session.next_temp_table_name(), staged);
        let temp_name = temp.name.clone();
        let export = temp.export();

        let mut previous = Statement::TemporaryTable(temp);
        for include in includes {
            let ids = self.related_ids(&include.path, &temp_name)?;
            let related = &include.related;
            let mut select = SelectorStatement::new(
                SelectClause::Documents,
                FromSource::Table(related.table_name.clone()),
            );
            select.wheres.push(Fragment::raw(
                format!("{} in ({})", related.id_locator(), ids),
                vec![],
            ));
            select.wheres.extend(Self::implicit_filters(
                related,
                SoftDeleteMode::Exclude,
                self.session.tenant_id(),
            ));
            select.previous = Some(Box::new(previous));
            previous = Statement::Select(select);
        }

        let select = if has_statistics {
            SelectClause::Documents.with_statistics(StatsSource::Carry)
        } else {
            SelectClause::Documents
        };
        let mut last = SelectorStatement::new(select, export);
        last.orderings = orderings;
        last.previous = Some(Box::new(previous));
        Ok(Statement::Select(last))
    }

    /// Sub-select of the related ids held by the staged rows
    fn related_ids(&self, path: &str, temp_name: &str) -> DbResult<String> {
        match self.mapping.members().locate(path)? {
            LocatedMember::Value(member) => Ok(format!(
                "select {} from {} as {}",
                member.locator(),
                temp_name,
                DOCUMENT_ALIAS
            )),
            LocatedMember::Collection(collection) if collection.is_scalar() => {
                let element = FilterCompiler::for_elements(collection, self.enum_storage)
                    .locator(&super::elem())?;
                Ok(format!(
                    "select {} from {} as {}, {}",
                    element,
                    temp_name,
                    DOCUMENT_ALIAS,
                    collection.explode_source()
                ))
            }
            _ => Err(DbError::UnsupportedQueryShape(format!(
                "include() through '{}', which holds no document ids",
                path
            ))),
        }
    }
}
