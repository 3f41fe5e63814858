//! Shared emission machinery for the statement builders.

use crate::expression::Expression;
use crate::model::Model;
use crate::predicate::Predicate;
use crate::table::TableReference;
use crate::{Column, OrmError, Statement, Value};
use std::sync::Arc;

/// Accumulates SQL text and bound arguments against one model and one
/// dialect quoter. The concrete builders drive it; dialects receive it
/// mutably to emit their upsert clauses.
pub struct StatementBuilder {
    sql: String,
    args: Vec<Value>,
    quoter: char,
    model: Arc<Model>,
}

impl StatementBuilder {
    pub(crate) fn new(model: Arc<Model>, quoter: char) -> Self {
        Self {
            sql: String::new(),
            args: Vec::new(),
            quoter,
            model,
        }
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_char(&mut self, c: char) {
        self.sql.push(c);
    }

    pub fn quote(&mut self, name: &str) {
        self.sql.push(self.quoter);
        self.sql.push_str(name);
        self.sql.push(self.quoter);
    }

    pub fn add_arg(&mut self, value: Value) {
        self.args.push(value);
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Resolves a field name of the bound model to its column name.
    pub fn column_name(&self, field: &str) -> Result<String, OrmError> {
        self.model
            .by_name
            .get(field)
            .map(|f| f.column.clone())
            .ok_or_else(|| OrmError::UnknownField(field.to_string()))
    }

    /// Emits a column reference. Inside WHERE (`strip_alias`), aliases
    /// are dropped. Columns bound to a joined table resolve against that
    /// table's own metadata and take its alias prefix.
    pub fn build_column(&mut self, column: &Column, strip_alias: bool) -> Result<(), OrmError> {
        match &column.table {
            Some(table) => {
                let descriptor = table
                    .fields
                    .iter()
                    .find(|f| f.name == column.name)
                    .ok_or_else(|| OrmError::UnknownField(column.name.clone()))?;
                if let Some(alias) = table.alias.clone() {
                    self.quote(&alias);
                    self.push_char('.');
                }
                let name = descriptor.column;
                self.quote(name);
            }
            None => {
                let name = self.column_name(&column.name)?;
                self.quote(&name);
            }
        }
        if !strip_alias {
            if let Some(alias) = column.alias.clone() {
                self.push(" AS ");
                self.quote(&alias);
            }
        }
        Ok(())
    }

    pub(crate) fn build_expression(&mut self, expression: &Expression) -> Result<(), OrmError> {
        match expression {
            Expression::Column(column) => self.build_column(column, true),
            Expression::Value(value) => {
                self.push_char('?');
                self.add_arg(value.clone());
                Ok(())
            }
            Expression::Raw(raw) => {
                self.push(&raw.sql);
                self.args.extend(raw.args.iter().cloned());
                Ok(())
            }
            Expression::Predicate(predicate) => self.build_predicate(predicate),
            // Aggregates belong in projections, not in predicates.
            Expression::Aggregate(_) => Err(OrmError::UnsupportedExpression),
        }
    }

    /// Emits a predicate tree. Operands that are themselves predicates
    /// get parenthesized.
    pub(crate) fn build_predicate(&mut self, predicate: &Predicate) -> Result<(), OrmError> {
        if let Some(left) = &predicate.left {
            self.build_operand(left)?;
        }
        if let Some(op) = predicate.op {
            if predicate.left.is_some() {
                self.push_char(' ');
            }
            self.push(op.as_str());
            self.push_char(' ');
        }
        if let Some(right) = &predicate.right {
            self.build_operand(right)?;
        }
        Ok(())
    }

    fn build_operand(&mut self, operand: &Expression) -> Result<(), OrmError> {
        match operand {
            Expression::Predicate(predicate) => {
                self.push_char('(');
                self.build_predicate(predicate)?;
                self.push_char(')');
                Ok(())
            }
            other => self.build_expression(other),
        }
    }

    /// Emits ` WHERE <predicates AND-ed>` when any predicates exist.
    pub(crate) fn build_where(&mut self, predicates: &[Predicate]) -> Result<(), OrmError> {
        let Some(combined) = combine(predicates) else {
            return Ok(());
        };
        self.push(" WHERE ");
        self.build_predicate(&combined)
    }

    pub(crate) fn build_table_ref(&mut self, table_ref: &TableReference) -> Result<(), OrmError> {
        match table_ref {
            TableReference::Table(table) => {
                self.quote(table.name);
                if let Some(alias) = table.alias.clone() {
                    self.push(" AS ");
                    self.quote(&alias);
                }
                Ok(())
            }
            TableReference::Join(join) => {
                self.push_char('(');
                self.build_table_ref(&join.left)?;
                self.push_char(' ');
                self.push(join.kind.as_str());
                self.push_char(' ');
                self.build_table_ref(&join.right)?;
                if !join.using.is_empty() {
                    self.push(" USING (");
                    for (i, field) in join.using.iter().enumerate() {
                        if i > 0 {
                            self.push_char(',');
                        }
                        let name = self.column_name(field)?;
                        self.quote(&name);
                    }
                    self.push_char(')');
                } else if let Some(on) = combine(&join.on) {
                    self.push(" ON ");
                    self.build_predicate(&on)?;
                }
                self.push_char(')');
                Ok(())
            }
        }
    }

    pub(crate) fn into_statement(mut self) -> Statement {
        self.sql.push(';');
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }
}

/// AND-combines a predicate list; `None` when empty.
fn combine(predicates: &[Predicate]) -> Option<Predicate> {
    let mut iter = predicates.iter().cloned();
    let first = iter.next()?;
    Some(iter.fold(first, Predicate::and))
}
