pub mod command;
pub mod fragments;
pub mod select;
pub mod statement;

pub use command::{
    Command, CommandBuilder, CommandParameter, CommandTemplate, ParameterOrigin, ValueTransform,
    PARAMETER_PLACEHOLDER,
};
pub use fragments::{CompareOp, CompoundOp, Fragment, Operand, SqlFragment};
pub use select::{SelectClause, StatsSource, STATS_COLUMN_NAME};
pub use statement::{
    FromSource, Ordering, SelectorStatement, Statement, StatementMode, TemporaryTableStatement,
};
