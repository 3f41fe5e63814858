//! Model metadata and its process-wide registry.

use crate::{OrmError, Value};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Compile-time field metadata emitted by the `Entity` derive, in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub column: &'static str,
}

/// A persistable type. Implemented via `#[derive(Entity)]`; the derive
/// also generates the two accessors the executor relies on: `value` reads
/// an argument out by field name, `apply` writes a scanned column back in.
pub trait Entity: Default + Send + Sync + 'static {
    fn table_name() -> &'static str;

    /// Declaration-ordered field metadata.
    fn fields() -> &'static [FieldDescriptor];

    fn value(&self, field: &str) -> Option<Value>;

    fn apply(&mut self, field: &str, value: Value) -> Result<(), OrmError>;
}

/// One field of a registered model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub column: String,
}

/// Table metadata for one entity type. `fields` preserves declaration
/// order; both lookup maps point at the same [`Field`] instances.
#[derive(Debug, Clone)]
pub struct Model {
    pub table: String,
    pub fields: Vec<Arc<Field>>,
    pub by_name: HashMap<String, Arc<Field>>,
    pub by_column: HashMap<String, Arc<Field>>,
}

impl Model {
    fn from_entity<T: Entity>() -> Self {
        let mut fields = Vec::new();
        let mut by_name = HashMap::new();
        let mut by_column = HashMap::new();
        for descriptor in T::fields() {
            let field = Arc::new(Field {
                name: descriptor.name.to_string(),
                column: descriptor.column.to_string(),
            });
            by_name.insert(field.name.clone(), Arc::clone(&field));
            by_column.insert(field.column.clone(), Arc::clone(&field));
            fields.push(field);
        }
        Self {
            table: T::table_name().to_string(),
            fields,
            by_name,
            by_column,
        }
    }

    fn apply_option(&mut self, option: &ModelOption) -> Result<(), OrmError> {
        match option {
            ModelOption::TableName(table) => {
                self.table = table.clone();
                Ok(())
            }
            ModelOption::ColumnName { field, column } => {
                let old = self
                    .by_name
                    .get(field)
                    .ok_or_else(|| OrmError::UnknownField(field.clone()))?
                    .clone();
                let renamed = Arc::new(Field {
                    name: old.name.clone(),
                    column: column.clone(),
                });
                self.by_column.remove(&old.column);
                self.by_column.insert(column.clone(), Arc::clone(&renamed));
                self.by_name.insert(old.name.clone(), Arc::clone(&renamed));
                for slot in &mut self.fields {
                    if slot.name == renamed.name {
                        *slot = Arc::clone(&renamed);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Registration-time overrides.
#[derive(Debug, Clone)]
pub enum ModelOption {
    TableName(String),
    ColumnName { field: String, column: String },
}

/// Caches one [`Model`] per entity type.
///
/// Readers take the read lock; a miss re-checks under the write lock
/// before constructing, so concurrent first reads of the same type still
/// produce exactly one shared instance.
pub struct Registry {
    models: RwLock<HashMap<TypeId, Arc<Model>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// The cached model for `T`, constructing it on first use.
    pub fn get<T: Entity>(&self) -> Arc<Model> {
        let key = TypeId::of::<T>();
        if let Some(model) = self.models.read().get(&key) {
            return Arc::clone(model);
        }
        let mut models = self.models.write();
        if let Some(model) = models.get(&key) {
            return Arc::clone(model);
        }
        let model = Arc::new(Model::from_entity::<T>());
        models.insert(key, Arc::clone(&model));
        model
    }

    /// Builds and caches the model for `T` with overrides, replacing any
    /// cached version.
    pub fn register<T: Entity>(&self, options: &[ModelOption]) -> Result<Arc<Model>, OrmError> {
        let mut model = Model::from_entity::<T>();
        for option in options {
            model.apply_option(option)?;
        }
        let model = Arc::new(model);
        self.models.write().insert(TypeId::of::<T>(), Arc::clone(&model));
        Ok(model)
    }
}
