//! SELECT builder.

use crate::accessor::scan_into;
use crate::builder::StatementBuilder;
use crate::expression::RawExpr;
use crate::middleware::{QueryContext, Statement, StatementType};
use crate::model::Entity;
use crate::session::{run_rows, Core, Session};
use crate::table::TableReference;
use crate::{Aggregate, Column, OrmError, Predicate};
use std::marker::PhantomData;
use std::sync::Arc;

/// What may appear in a projection.
#[derive(Debug, Clone)]
pub enum Selectable {
    Column(Column),
    Aggregate(Aggregate),
    Raw(RawExpr),
}

impl From<Column> for Selectable {
    fn from(column: Column) -> Self {
        Selectable::Column(column)
    }
}

impl From<Aggregate> for Selectable {
    fn from(aggregate: Aggregate) -> Self {
        Selectable::Aggregate(aggregate)
    }
}

impl From<RawExpr> for Selectable {
    fn from(raw: RawExpr) -> Self {
        Selectable::Raw(raw)
    }
}

/// Builds and runs `SELECT <cols> FROM <ref> [WHERE <pred>]` for one
/// entity type.
pub struct Selector<T: Entity> {
    sess: Arc<dyn Session>,
    core: Core,
    columns: Vec<Selectable>,
    table: Option<TableReference>,
    predicates: Vec<Predicate>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Selector<T> {
    pub fn new<S>(sess: &S) -> Self
    where
        S: Session + Clone + 'static,
    {
        let sess: Arc<dyn Session> = Arc::new(sess.clone());
        let core = sess.core().clone();
        Self {
            sess,
            core,
            columns: Vec::new(),
            table: None,
            predicates: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Projection; empty means `*`.
    pub fn select(mut self, columns: impl IntoIterator<Item = Selectable>) -> Self {
        self.columns = columns.into_iter().collect();
        self
    }

    /// FROM override; the default is `T`'s own table.
    pub fn from(mut self, table: impl Into<TableReference>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Adds a predicate; repeated calls AND together.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(&self) -> Result<Statement, OrmError> {
        let model = self.core.registry.get::<T>();
        let mut builder = StatementBuilder::new(Arc::clone(&model), self.core.dialect.quoter());
        builder.push("SELECT ");
        if self.columns.is_empty() {
            builder.push("*");
        } else {
            for (i, selectable) in self.columns.iter().enumerate() {
                if i > 0 {
                    builder.push_char(',');
                }
                match selectable {
                    Selectable::Column(column) => builder.build_column(column, false)?,
                    Selectable::Aggregate(aggregate) => {
                        builder.push(aggregate.func);
                        builder.push_char('(');
                        let name = builder.column_name(&aggregate.arg)?;
                        builder.quote(&name);
                        builder.push_char(')');
                        if let Some(alias) = aggregate.alias.clone() {
                            builder.push(" AS ");
                            builder.quote(&alias);
                        }
                    }
                    Selectable::Raw(raw) => {
                        builder.push(&raw.sql);
                        for arg in &raw.args {
                            builder.add_arg(arg.clone());
                        }
                    }
                }
            }
        }
        builder.push(" FROM ");
        match &self.table {
            None => {
                let table = model.table.clone();
                builder.quote(&table);
            }
            Some(table_ref) => builder.build_table_ref(table_ref)?,
        }
        builder.build_where(&self.predicates)?;
        Ok(builder.into_statement())
    }

    fn query_context(&self) -> Result<QueryContext, OrmError> {
        Ok(QueryContext {
            statement_type: StatementType::Select,
            statement: self.build()?,
            model: self.core.registry.get::<T>(),
        })
    }

    /// First row, scanned into a fresh `T`; [`OrmError::NoRows`] when the
    /// result set is empty.
    pub async fn get(&self) -> Result<T, OrmError> {
        let qc = self.query_context()?;
        let model = Arc::clone(&qc.model);
        let rows = run_rows(&self.sess, qc).await?;
        let row = rows.first().ok_or(OrmError::NoRows)?;
        scan_into(&model, row)
    }

    /// Every row, scanned.
    pub async fn get_multi(&self) -> Result<Vec<T>, OrmError> {
        let qc = self.query_context()?;
        let model = Arc::clone(&qc.model);
        let rows = run_rows(&self.sess, qc).await?;
        rows.iter().map(|row| scan_into(&model, row)).collect()
    }
}
