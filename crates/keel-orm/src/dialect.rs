//! Dialect differences: identifier quoting and upsert emission.

use crate::assignment::Assignable;
use crate::builder::StatementBuilder;
use crate::expression::Expression;
use crate::insert::Upsert;
use crate::OrmError;

/// What varies between databases. Placeholders are `?` everywhere; only
/// quoting and the insert-or-update clause differ.
pub trait Dialect: Send + Sync {
    fn quoter(&self) -> char;

    fn build_upsert(
        &self,
        builder: &mut StatementBuilder,
        upsert: &Upsert,
    ) -> Result<(), OrmError>;
}

pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn quoter(&self) -> char {
        '`'
    }

    fn build_upsert(
        &self,
        builder: &mut StatementBuilder,
        upsert: &Upsert,
    ) -> Result<(), OrmError> {
        builder.push(" ON DUPLICATE KEY UPDATE ");
        for (i, assignable) in upsert.assigns.iter().enumerate() {
            if i > 0 {
                builder.push_char(',');
            }
            match assignable {
                Assignable::Assignment(assignment) => {
                    let column = builder.column_name(&assignment.column)?;
                    builder.quote(&column);
                    builder.push_char('=');
                    match &assignment.value {
                        Expression::Value(value) => {
                            builder.push_char('?');
                            builder.add_arg(value.clone());
                        }
                        _ => return Err(OrmError::UnsupportedAssignable),
                    }
                }
                Assignable::Column(col) => {
                    let column = builder.column_name(&col.name)?;
                    builder.quote(&column);
                    builder.push("=VALUES(");
                    builder.quote(&column);
                    builder.push_char(')');
                }
            }
        }
        Ok(())
    }
}

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn quoter(&self) -> char {
        '`'
    }

    fn build_upsert(
        &self,
        builder: &mut StatementBuilder,
        upsert: &Upsert,
    ) -> Result<(), OrmError> {
        builder.push(" ON CONFLICT(");
        for (i, field) in upsert.conflict_columns.iter().enumerate() {
            if i > 0 {
                builder.push_char(',');
            }
            let column = builder.column_name(field)?;
            builder.quote(&column);
        }
        builder.push(") DO UPDATE SET ");
        for (i, assignable) in upsert.assigns.iter().enumerate() {
            if i > 0 {
                builder.push_char(',');
            }
            match assignable {
                Assignable::Assignment(assignment) => {
                    let column = builder.column_name(&assignment.column)?;
                    builder.quote(&column);
                    builder.push_char('=');
                    match &assignment.value {
                        Expression::Value(value) => {
                            builder.push_char('?');
                            builder.add_arg(value.clone());
                        }
                        _ => return Err(OrmError::UnsupportedAssignable),
                    }
                }
                Assignable::Column(col) => {
                    let column = builder.column_name(&col.name)?;
                    builder.quote(&column);
                    builder.push("=excluded.");
                    builder.quote(&column);
                }
            }
        }
        Ok(())
    }
}

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quoter(&self) -> char {
        '"'
    }

    /// Postgres upsert emission is deliberately absent.
    fn build_upsert(
        &self,
        _builder: &mut StatementBuilder,
        _upsert: &Upsert,
    ) -> Result<(), OrmError> {
        Ok(())
    }
}
