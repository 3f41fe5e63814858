//! Raw SQL escape hatch, still typed on the way out.

use crate::accessor::scan_into;
use crate::middleware::{QueryContext, Statement, StatementType};
use crate::model::Entity;
use crate::session::{run_exec, run_rows, Core, ExecResult, Session};
use crate::{OrmError, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Runs caller-written SQL through the same pipeline and scanning as the
/// built statements.
pub struct RawQuerier<T: Entity> {
    sess: Arc<dyn Session>,
    core: Core,
    sql: String,
    args: Vec<Value>,
    _marker: PhantomData<fn() -> T>,
}

/// Entry point mirroring the builders' constructors.
pub fn raw_query<T, S>(
    sess: &S,
    sql: &str,
    args: impl IntoIterator<Item = Value>,
) -> RawQuerier<T>
where
    T: Entity,
    S: Session + Clone + 'static,
{
    let sess: Arc<dyn Session> = Arc::new(sess.clone());
    let core = sess.core().clone();
    RawQuerier {
        sess,
        core,
        sql: sql.to_string(),
        args: args.into_iter().collect(),
        _marker: PhantomData,
    }
}

impl<T: Entity> RawQuerier<T> {
    pub fn build(&self) -> Result<Statement, OrmError> {
        Ok(Statement {
            sql: self.sql.clone(),
            args: self.args.clone(),
        })
    }

    fn query_context(&self) -> Result<QueryContext, OrmError> {
        Ok(QueryContext {
            statement_type: StatementType::Raw,
            statement: self.build()?,
            model: self.core.registry.get::<T>(),
        })
    }

    pub async fn get(&self) -> Result<T, OrmError> {
        let qc = self.query_context()?;
        let model = Arc::clone(&qc.model);
        let rows = run_rows(&self.sess, qc).await?;
        let row = rows.first().ok_or(OrmError::NoRows)?;
        scan_into(&model, row)
    }

    pub async fn get_multi(&self) -> Result<Vec<T>, OrmError> {
        let qc = self.query_context()?;
        let model = Arc::clone(&qc.model);
        let rows = run_rows(&self.sess, qc).await?;
        rows.iter().map(|row| scan_into(&model, row)).collect()
    }

    pub async fn exec(&self) -> Result<ExecResult, OrmError> {
        run_exec(&self.sess, self.query_context()?).await
    }
}
