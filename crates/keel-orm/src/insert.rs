//! INSERT builder, with dialect-specific upsert.

use crate::builder::StatementBuilder;
use crate::middleware::{QueryContext, Statement, StatementType};
use crate::model::Entity;
use crate::session::{run_exec, Core, ExecResult, Session};
use crate::{Assignable, OrmError};
use std::marker::PhantomData;
use std::sync::Arc;

/// The insert-or-update clause attached to an insert. How (and whether)
/// it is emitted belongs to the dialect.
pub struct Upsert {
    pub(crate) assigns: Vec<Assignable>,
    pub(crate) conflict_columns: Vec<String>,
}

/// Builds `ON CONFLICT`/`ON DUPLICATE KEY` details before handing the
/// inserter back.
pub struct UpsertBuilder<T: Entity> {
    inserter: Inserter<T>,
    conflict_columns: Vec<String>,
}

impl<T: Entity> UpsertBuilder<T> {
    /// Conflict columns, as field names; only dialects that name the
    /// conflict target (SQLite) emit them.
    pub fn conflict_columns(mut self, columns: impl IntoIterator<Item = &'static str>) -> Self {
        self.conflict_columns = columns.into_iter().map(str::to_string).collect();
        self
    }

    /// The assignments applied on conflict.
    pub fn update(mut self, assigns: impl IntoIterator<Item = Assignable>) -> Inserter<T> {
        self.inserter.upsert = Some(Upsert {
            assigns: assigns.into_iter().collect(),
            conflict_columns: self.conflict_columns,
        });
        self.inserter
    }
}

/// Builds and runs `INSERT INTO <t>(cols) VALUES (?,...), ...`.
pub struct Inserter<T: Entity> {
    sess: Arc<dyn Session>,
    core: Core,
    values: Vec<T>,
    columns: Vec<String>,
    upsert: Option<Upsert>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Inserter<T> {
    pub fn new<S>(sess: &S) -> Self
    where
        S: Session + Clone + 'static,
    {
        let sess: Arc<dyn Session> = Arc::new(sess.clone());
        let core = sess.core().clone();
        Self {
            sess,
            core,
            values: Vec::new(),
            columns: Vec::new(),
            upsert: None,
            _marker: PhantomData,
        }
    }

    /// Rows to insert. Building with none is [`OrmError::InsertZeroRows`].
    pub fn values(mut self, rows: impl IntoIterator<Item = T>) -> Self {
        self.values = rows.into_iter().collect();
        self
    }

    /// Restricts the column list, by field name. The default is every
    /// field in declaration order: the column order is always explicit in
    /// the emitted SQL.
    pub fn columns(mut self, columns: impl IntoIterator<Item = &'static str>) -> Self {
        self.columns = columns.into_iter().map(str::to_string).collect();
        self
    }

    pub fn upsert(self) -> UpsertBuilder<T> {
        UpsertBuilder {
            inserter: self,
            conflict_columns: Vec::new(),
        }
    }

    pub fn build(&self) -> Result<Statement, OrmError> {
        if self.values.is_empty() {
            return Err(OrmError::InsertZeroRows);
        }
        let model = self.core.registry.get::<T>();
        let mut builder = StatementBuilder::new(Arc::clone(&model), self.core.dialect.quoter());

        builder.push("INSERT INTO ");
        let table = model.table.clone();
        builder.quote(&table);

        let fields = if self.columns.is_empty() {
            model.fields.clone()
        } else {
            self.columns
                .iter()
                .map(|name| {
                    model
                        .by_name
                        .get(name)
                        .cloned()
                        .ok_or_else(|| OrmError::UnknownField(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        builder.push_char('(');
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                builder.push_char(',');
            }
            builder.quote(&field.column);
        }
        builder.push_char(')');

        builder.push(" VALUES ");
        for (row_index, entity) in self.values.iter().enumerate() {
            if row_index > 0 {
                builder.push_char(',');
            }
            builder.push_char('(');
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    builder.push_char(',');
                }
                builder.push_char('?');
                let value = entity
                    .value(&field.name)
                    .ok_or_else(|| OrmError::UnknownField(field.name.clone()))?;
                builder.add_arg(value);
            }
            builder.push_char(')');
        }

        if let Some(upsert) = &self.upsert {
            let dialect = Arc::clone(&self.core.dialect);
            dialect.build_upsert(&mut builder, upsert)?;
        }

        Ok(builder.into_statement())
    }

    pub async fn exec(&self) -> Result<ExecResult, OrmError> {
        let qc = QueryContext {
            statement_type: StatementType::Insert,
            statement: self.build()?,
            model: self.core.registry.get::<T>(),
        };
        run_exec(&self.sess, qc).await
    }
}
