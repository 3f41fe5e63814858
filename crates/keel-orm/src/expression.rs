//! The expression sum type query builders assemble.

use crate::{Aggregate, Column, Predicate, Value};

/// Anything that can appear inside a statement: a column reference, a
/// bound value, a nested predicate, an aggregate call, or raw SQL.
#[derive(Debug, Clone)]
pub enum Expression {
    Column(Column),
    Value(Value),
    Predicate(Box<Predicate>),
    Aggregate(Aggregate),
    Raw(RawExpr),
}

/// Escape hatch: SQL emitted verbatim with its own bound arguments.
#[derive(Debug, Clone)]
pub struct RawExpr {
    pub(crate) sql: String,
    pub(crate) args: Vec<Value>,
}

/// Builds a [`RawExpr`].
pub fn raw(sql: &str, args: impl IntoIterator<Item = Value>) -> RawExpr {
    RawExpr {
        sql: sql.to_string(),
        args: args.into_iter().collect(),
    }
}

impl RawExpr {
    /// Lets raw SQL stand where a predicate is expected.
    pub fn as_predicate(self) -> Predicate {
        Predicate::from_raw(self)
    }
}

/// Conversion into [`Expression`], so comparison builders accept columns,
/// predicates, raw SQL and plain Rust values alike.
pub trait IntoExpression {
    fn into_expression(self) -> Expression;
}

impl IntoExpression for Expression {
    fn into_expression(self) -> Expression {
        self
    }
}

impl IntoExpression for Column {
    fn into_expression(self) -> Expression {
        Expression::Column(self)
    }
}

impl IntoExpression for Predicate {
    fn into_expression(self) -> Expression {
        Expression::Predicate(Box::new(self))
    }
}

impl IntoExpression for Aggregate {
    fn into_expression(self) -> Expression {
        Expression::Aggregate(self)
    }
}

impl IntoExpression for RawExpr {
    fn into_expression(self) -> Expression {
        Expression::Raw(self)
    }
}

impl IntoExpression for Value {
    fn into_expression(self) -> Expression {
        Expression::Value(self)
    }
}

macro_rules! scalar_into_expression {
    ($($ty:ty),*) => {
        $(
            impl IntoExpression for $ty {
                fn into_expression(self) -> Expression {
                    Expression::Value(Value::from(self))
                }
            }
        )*
    };
}

scalar_into_expression!(
    i8, i16, i32, i64, u8, u16, u32, bool, f32, f64, &str, String, Vec<u8>
);

impl<T> IntoExpression for Option<T>
where
    T: Into<Value>,
{
    fn into_expression(self) -> Expression {
        Expression::Value(Value::from(self))
    }
}
