//! Column references.

use crate::expression::{Expression, IntoExpression};
use crate::predicate::{Op, Predicate};
use crate::table::Table;

/// A column referenced by its *field* name; the builder resolves it to
/// the column name through the bound model (or through the table it
/// belongs to, for joined tables).
#[derive(Debug, Clone)]
pub struct Column {
    pub(crate) table: Option<Table>,
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
}

/// A column of the statement's base table.
pub fn col(name: &str) -> Column {
    Column {
        table: None,
        name: name.to_string(),
        alias: None,
    }
}

impl Column {
    pub(crate) fn in_table(table: Table, name: &str) -> Self {
        Column {
            table: Some(table),
            name: name.to_string(),
            alias: None,
        }
    }

    /// `AS alias` in projections; stripped inside WHERE.
    pub fn as_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn eq(self, rhs: impl IntoExpression) -> Predicate {
        self.compare(Op::Eq, rhs)
    }

    pub fn lt(self, rhs: impl IntoExpression) -> Predicate {
        self.compare(Op::Lt, rhs)
    }

    pub fn gt(self, rhs: impl IntoExpression) -> Predicate {
        self.compare(Op::Gt, rhs)
    }

    fn compare(self, op: Op, rhs: impl IntoExpression) -> Predicate {
        Predicate::binary(Expression::Column(self), op, rhs.into_expression())
    }
}
