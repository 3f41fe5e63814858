//! Error type for query building and execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrmError {
    /// A name that is not a field of the bound model.
    #[error("orm: unknown field {0}")]
    UnknownField(String),

    /// A result column that maps to no field of the bound model.
    #[error("orm: unknown column {0}")]
    UnknownColumn(String),

    #[error("orm: inserting zero rows")]
    InsertZeroRows,

    #[error("orm: no rows in result set")]
    NoRows,

    #[error("orm: unsupported expression in this position")]
    UnsupportedExpression,

    #[error("orm: unsupported assignable in this position")]
    UnsupportedAssignable,

    /// A scanned value that does not fit the target field's type.
    #[error("orm: cannot convert {from} into {to}")]
    ValueConversion {
        from: &'static str,
        to: &'static str,
    },

    /// A middleware returned rows where a driver result was expected, or
    /// the other way around.
    #[error("orm: middleware returned a mismatched result kind")]
    OutcomeMismatch,

    /// The transaction was already committed or rolled back.
    #[error("orm: transaction already finished")]
    TxFinished,

    /// The closure given to `in_tx` panicked; the transaction was rolled
    /// back.
    #[error("orm: transaction body panicked (rolled back)")]
    TxPanic,

    /// Rolling back after a failure failed too.
    #[error("orm: rollback failed: {rollback} (while handling: {source})")]
    RollbackFailed {
        source: Box<OrmError>,
        rollback: String,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
