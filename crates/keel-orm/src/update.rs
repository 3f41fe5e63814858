//! UPDATE builder.

use crate::builder::StatementBuilder;
use crate::middleware::{QueryContext, Statement, StatementType};
use crate::model::Entity;
use crate::session::{run_exec, Core, ExecResult, Session};
use crate::{Assignable, OrmError, Predicate};
use std::marker::PhantomData;
use std::sync::Arc;

/// Builds and runs `UPDATE <t> SET <assigns> [WHERE <pred>]`.
pub struct Updater<T: Entity> {
    sess: Arc<dyn Session>,
    core: Core,
    assigns: Vec<Assignable>,
    predicates: Vec<Predicate>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Updater<T> {
    pub fn new<S>(sess: &S) -> Self
    where
        S: Session + Clone + 'static,
    {
        let sess: Arc<dyn Session> = Arc::new(sess.clone());
        let core = sess.core().clone();
        Self {
            sess,
            core,
            assigns: Vec::new(),
            predicates: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn set(mut self, assigns: impl IntoIterator<Item = Assignable>) -> Self {
        self.assigns = assigns.into_iter().collect();
        self
    }

    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(&self) -> Result<Statement, OrmError> {
        if self.assigns.is_empty() {
            return Err(OrmError::UnsupportedAssignable);
        }
        let model = self.core.registry.get::<T>();
        let mut builder = StatementBuilder::new(Arc::clone(&model), self.core.dialect.quoter());
        builder.push("UPDATE ");
        let table = model.table.clone();
        builder.quote(&table);
        builder.push(" SET ");
        for (i, assignable) in self.assigns.iter().enumerate() {
            if i > 0 {
                builder.push_char(',');
            }
            match assignable {
                Assignable::Assignment(assignment) => {
                    let column = builder.column_name(&assignment.column)?;
                    builder.quote(&column);
                    builder.push_char('=');
                    builder.build_expression(&assignment.value)?;
                }
                Assignable::Column(column) => {
                    let name = builder.column_name(&column.name)?;
                    builder.quote(&name);
                    builder.push_char('=');
                    builder.quote(&name);
                }
            }
        }
        builder.build_where(&self.predicates)?;
        Ok(builder.into_statement())
    }

    pub async fn exec(&self) -> Result<ExecResult, OrmError> {
        let qc = QueryContext {
            statement_type: StatementType::Update,
            statement: self.build()?,
            model: self.core.registry.get::<T>(),
        };
        run_exec(&self.sess, qc).await
    }
}
