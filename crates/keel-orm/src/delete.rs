//! DELETE builder.

use crate::builder::StatementBuilder;
use crate::middleware::{QueryContext, Statement, StatementType};
use crate::model::Entity;
use crate::session::{run_exec, Core, ExecResult, Session};
use crate::table::Table;
use crate::{OrmError, Predicate};
use std::marker::PhantomData;
use std::sync::Arc;

/// Builds and runs `DELETE FROM <t> [WHERE <pred>]`.
pub struct Deleter<T: Entity> {
    sess: Arc<dyn Session>,
    core: Core,
    table: Option<Table>,
    predicates: Vec<Predicate>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Deleter<T> {
    pub fn new<S>(sess: &S) -> Self
    where
        S: Session + Clone + 'static,
    {
        let sess: Arc<dyn Session> = Arc::new(sess.clone());
        let core = sess.core().clone();
        Self {
            sess,
            core,
            table: None,
            predicates: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Table override; the default is `T`'s own table.
    pub fn from(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(&self) -> Result<Statement, OrmError> {
        let model = self.core.registry.get::<T>();
        let mut builder = StatementBuilder::new(Arc::clone(&model), self.core.dialect.quoter());
        builder.push("DELETE FROM ");
        match &self.table {
            Some(table) => builder.quote(table.name),
            None => {
                let table = model.table.clone();
                builder.quote(&table);
            }
        }
        builder.build_where(&self.predicates)?;
        Ok(builder.into_statement())
    }

    pub async fn exec(&self) -> Result<ExecResult, OrmError> {
        let qc = QueryContext {
            statement_type: StatementType::Delete,
            statement: self.build()?,
            model: self.core.registry.get::<T>(),
        };
        run_exec(&self.sess, qc).await
    }
}
