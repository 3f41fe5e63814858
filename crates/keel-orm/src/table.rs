//! Table references for FROM clauses, including joins.

use crate::model::{Entity, FieldDescriptor};
use crate::{Column, Predicate};

/// A concrete table, optionally aliased. Carries its entity's field
/// metadata so columns referencing it resolve without the registry.
#[derive(Debug, Clone)]
pub struct Table {
    pub(crate) name: &'static str,
    pub(crate) fields: &'static [FieldDescriptor],
    pub(crate) alias: Option<String>,
}

impl Table {
    pub fn of<T: Entity>() -> Self {
        Self {
            name: T::table_name(),
            fields: T::fields(),
            alias: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// A column belonging to this table; emitted with the table's alias
    /// prefix when one is set.
    pub fn col(&self, name: &str) -> Column {
        Column::in_table(self.clone(), name)
    }

    pub fn join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Inner)
    }

    pub fn left_join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Left)
    }

    pub fn right_join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Right)
    }
}

/// What FROM accepts: a bare (possibly aliased) table or a join tree.
#[derive(Debug, Clone)]
pub enum TableReference {
    Table(Table),
    Join(Box<Join>),
}

impl From<Table> for TableReference {
    fn from(table: Table) -> Self {
        TableReference::Table(table)
    }
}

impl From<Join> for TableReference {
    fn from(join: Join) -> Self {
        TableReference::Join(Box::new(join))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// An unfinished join waiting for its `ON` or `USING`.
pub struct JoinBuilder {
    left: TableReference,
    right: TableReference,
    kind: JoinKind,
}

impl JoinBuilder {
    fn new(left: TableReference, right: TableReference, kind: JoinKind) -> Self {
        Self { left, right, kind }
    }

    /// Joins on predicates, AND-ed together.
    pub fn on(self, predicates: impl IntoIterator<Item = Predicate>) -> Join {
        Join {
            left: self.left,
            right: self.right,
            kind: self.kind,
            on: predicates.into_iter().collect(),
            using: Vec::new(),
        }
    }

    /// Joins on shared column names (field names of the base model).
    pub fn using(self, columns: impl IntoIterator<Item = &'static str>) -> Join {
        Join {
            left: self.left,
            right: self.right,
            kind: self.kind,
            on: Vec::new(),
            using: columns.into_iter().map(str::to_string).collect(),
        }
    }
}

/// A completed join; joins nest, so a join can be the left side of the
/// next one.
#[derive(Debug, Clone)]
pub struct Join {
    pub(crate) left: TableReference,
    pub(crate) right: TableReference,
    pub(crate) kind: JoinKind,
    pub(crate) on: Vec<Predicate>,
    pub(crate) using: Vec<String>,
}

impl Join {
    pub fn join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Inner)
    }

    pub fn left_join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Left)
    }

    pub fn right_join(self, right: impl Into<TableReference>) -> JoinBuilder {
        JoinBuilder::new(self.into(), right.into(), JoinKind::Right)
    }
}
