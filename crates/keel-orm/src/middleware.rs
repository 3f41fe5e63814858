//! The execution pipeline around statements.
//!
//! Every entry point runs as a [`Handler`]; middlewares wrap it to
//! observe, veto or time the built statement before it reaches the
//! session. First-listed middleware sits outermost.

use crate::model::Model;
use crate::session::{ExecResult, Row};
use crate::{OrmError, Value};
use futures::future::BoxFuture;
use std::sync::Arc;

/// A built, parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Raw,
}

impl StatementType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementType::Select => "SELECT",
            StatementType::Insert => "INSERT",
            StatementType::Update => "UPDATE",
            StatementType::Delete => "DELETE",
            StatementType::Raw => "RAW",
        }
    }
}

/// What a handler receives: the statement kind, the statement itself and
/// the model it was built against.
#[derive(Clone)]
pub struct QueryContext {
    pub statement_type: StatementType,
    pub statement: Statement,
    pub model: Arc<Model>,
}

/// What flows back up the pipeline.
#[derive(Debug)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    Exec(ExecResult),
}

pub type Handler =
    Arc<dyn Fn(QueryContext) -> BoxFuture<'static, Result<QueryOutcome, OrmError>> + Send + Sync>;

pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Lifts a wrapping function into a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Composes `middlewares` around `base`, first listed outermost.
pub(crate) fn apply(middlewares: &[Middleware], base: Handler) -> Handler {
    let mut root = base;
    for mw in middlewares.iter().rev() {
        root = mw(root);
    }
    root
}
