//! The right-hand side of `SET`.

use crate::expression::{Expression, IntoExpression};
use crate::Column;

/// `column = <expression>`: the value may be a bound literal or another
/// column (a column-to-column copy).
#[derive(Debug, Clone)]
pub struct Assignment {
    pub(crate) column: String,
    pub(crate) value: Expression,
}

/// Builds an [`Assignment`]; `column` is a field name of the bound model.
pub fn assign(column: &str, value: impl IntoExpression) -> Assignment {
    Assignment {
        column: column.to_string(),
        value: value.into_expression(),
    }
}

/// What may appear in a SET list or an upsert clause. A bare [`Column`]
/// in an upsert means "take the inserted row's value for this column"
/// (`VALUES(col)` on MySQL, `excluded.col` on SQLite).
#[derive(Debug, Clone)]
pub enum Assignable {
    Assignment(Assignment),
    Column(Column),
}

impl From<Assignment> for Assignable {
    fn from(assignment: Assignment) -> Self {
        Assignable::Assignment(assignment)
    }
}

impl From<Column> for Assignable {
    fn from(column: Column) -> Self {
        Assignable::Column(column)
    }
}
