//! Writing scanned rows back into entities.

use crate::model::{Entity, Model};
use crate::session::Row;
use crate::OrmError;

/// Builds a fresh `T` and applies every scanned column through the
/// model's column map and the entity's derived accessor. Result columns
/// that map to no field are an error: a projection the model cannot
/// absorb is a bug, not data to drop.
pub(crate) fn scan_into<T: Entity>(model: &Model, row: &Row) -> Result<T, OrmError> {
    let mut entity = T::default();
    for (column, value) in row.columns.iter().zip(row.values.iter()) {
        let field = model
            .by_column
            .get(column)
            .ok_or_else(|| OrmError::UnknownColumn(column.clone()))?;
        entity.apply(&field.name, value.clone())?;
    }
    Ok(entity)
}
