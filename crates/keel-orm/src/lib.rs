//! A SQL query builder and executor.
//!
//! Statements are assembled from a small expression AST ([`col`],
//! predicates, aggregates, [`raw`] SQL, table references with joins) and
//! emitted as parameterized SQL against a [`Dialect`]. Model metadata
//! (table name, column names, value accessors) comes from
//! `#[derive(Entity)]` and is cached per type in a [`Registry`].
//! Execution flows through a middleware pipeline around a [`Session`],
//! which both the database handle and transactions implement.
//!
//! # Examples
//!
//! ```
//! use keel_orm::{col, Entity, Selector};
//!
//! #[derive(Debug, Default, Entity)]
//! struct TestModel {
//!     id: i64,
//!     first_name: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), keel_orm::OrmError> {
//! let db = keel_orm::Db::open("sqlite::memory:").await?;
//! let statement = Selector::<TestModel>::new(&db)
//!     .where_(col("id").eq(12))
//!     .build()?;
//! assert_eq!(statement.sql, "SELECT * FROM `test_model` WHERE `id` = ?;");
//! # Ok(())
//! # }
//! ```

// Lets the derive-generated `::keel_orm::...` paths resolve inside this
// crate's own tests.
extern crate self as keel_orm;

mod accessor;
mod aggregate;
mod assignment;
mod builder;
mod column;
mod delete;
mod dialect;
mod error;
mod expression;
mod insert;
mod middleware;
mod model;
mod predicate;
mod raw;
mod select;
mod session;
mod table;
mod update;
mod value;

pub use aggregate::{avg, count, max, min, sum, Aggregate};
pub use assignment::{assign, Assignable, Assignment};
pub use builder::StatementBuilder;
pub use column::{col, Column};
pub use delete::Deleter;
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect};
pub use error::OrmError;
pub use expression::{raw, Expression, IntoExpression, RawExpr};
pub use insert::{Inserter, Upsert, UpsertBuilder};
// The trait and its derive share the name, serde-style: one lives in the
// type namespace, the other in the macro namespace.
pub use keel_orm_derive::Entity;
pub use middleware::{
    middleware, Handler, Middleware, QueryContext, QueryOutcome, Statement, StatementType,
};
pub use model::{Entity, Field, FieldDescriptor, Model, ModelOption, Registry};
pub use predicate::{not, Predicate};
pub use raw::{raw_query, RawQuerier};
pub use select::{Selectable, Selector};
pub use session::{Core, Db, DbBuilder, ExecResult, Row, Session, Tx};
pub use table::{Join, JoinBuilder, Table, TableReference};
pub use update::Updater;
pub use value::{FromValue, Value};
