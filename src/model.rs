//! Model registration and per-type metadata
//!
//! A model is any `serde` struct with a `Default` impl that implements [`Model`].
//! Registration serializes the default instance once to discover the columns in
//! declaration order, infers each column's [`ValueKind`], and records the
//! primary key. The resulting [`ModelMetadata`] is the field-accessor table every
//! statement builder works from: objects are encoded to records through it and
//! rows are decoded back through it.
//!
//! The process-wide [`Registry`] is written once with [`install`] and read
//! lock-free afterwards.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{EngineError, Result};
use crate::sql::sanitize::validate_identifier;
use crate::types::{Value, ValueKind};

/// A model's fields as a JSON object, keyed by column name
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A plain data type mapped to one table
///
/// ```rust
/// use relstore::{Model, ValueKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Wallet {
///     id: i64,
///     #[serde(rename = "appID")]
///     app_id: String,
///     ctime: i64,
///     memo: Option<String>,
/// }
///
/// impl Model for Wallet {
///     const TABLE: &'static str = "wallet";
///     const KINDS: &'static [(&'static str, ValueKind)] = &[("memo", ValueKind::Text)];
///     const CAPACITY: &'static [(&'static str, u32)] = &[("appID", 64)];
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Table the model maps to
    const TABLE: &'static str;
    /// Primary-key column; must be an integer or text column
    const PRIMARY_KEY: &'static str = "id";
    /// Serialized fields that are never read from or written to the table
    const IGNORED: &'static [&'static str] = &[];
    /// Kinds for columns whose default value cannot reveal one (`Option` fields)
    const KINDS: &'static [(&'static str, ValueKind)] = &[];
    /// Storage capacity hints, used by DDL generation
    const CAPACITY: &'static [(&'static str, u32)] = &[];
    /// Whether committed writes are mirrored to the document store
    const MIRRORED: bool = false;
}

/// One serialized field of a model
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Serialized field name; doubles as the column name
    pub column: String,
    pub kind: ValueKind,
    pub ignored: bool,
    pub primary_key: bool,
    pub capacity: Option<u32>,
}

/// Primary key of a model
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub column: String,
    /// Either [`ValueKind::Int`] or [`ValueKind::Text`]
    pub kind: ValueKind,
}

/// Metadata for one registered type
pub struct ModelMetadata {
    type_id: TypeId,
    type_name: &'static str,
    table: String,
    fields: Vec<FieldDescriptor>,
    primary_key: PrimaryKey,
    mirrored: bool,
    blank_record: Record,
    blank_instance: fn() -> Box<dyn Any + Send + Sync>,
    blank_list: fn() -> Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for ModelMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMetadata")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .field("mirrored", &self.mirrored)
            .finish()
    }
}

fn new_blank<T: Model>() -> Box<dyn Any + Send + Sync> {
    Box::new(T::default())
}

fn new_blank_list<T: Model>() -> Box<dyn Any + Send + Sync> {
    Box::new(Vec::<T>::new())
}

impl ModelMetadata {
    /// Inspect `T` once and build its metadata.
    pub fn of<T: Model>() -> Result<Self> {
        let type_name = std::any::type_name::<T>();
        validate_identifier(T::TABLE)
            .map_err(|e| EngineError::registration(format!("{}: {}", type_name, e)))?;

        let sample = serde_json::to_value(T::default())?;
        let serde_json::Value::Object(blank_record) = sample else {
            return Err(EngineError::registration(format!(
                "{} must serialize to a struct",
                type_name
            )));
        };

        let mut fields = Vec::with_capacity(blank_record.len());
        for (column, default) in &blank_record {
            let ignored = T::IGNORED.contains(&column.as_str());
            if !ignored {
                validate_identifier(column).map_err(|e| {
                    EngineError::registration(format!("{}: {}", type_name, e))
                })?;
            }
            let declared = T::KINDS
                .iter()
                .find(|(name, _)| *name == column)
                .map(|(_, kind)| *kind);
            let kind = match declared.or_else(|| ValueKind::infer(default)) {
                Some(kind) => kind,
                None if ignored => ValueKind::Text,
                None => {
                    return Err(EngineError::registration(format!(
                        "{}: cannot infer a kind for field '{}'; declare it in Model::KINDS",
                        type_name, column
                    )));
                }
            };
            let capacity = T::CAPACITY
                .iter()
                .find(|(name, _)| *name == column)
                .map(|(_, cap)| *cap);
            fields.push(FieldDescriptor {
                column: column.clone(),
                kind,
                ignored,
                primary_key: column == T::PRIMARY_KEY,
                capacity,
            });
        }

        let pk = fields
            .iter()
            .find(|f| f.primary_key)
            .ok_or_else(|| {
                EngineError::registration(format!(
                    "{}: primary key '{}' is not a serialized field",
                    type_name,
                    T::PRIMARY_KEY
                ))
            })?;
        if pk.ignored {
            return Err(EngineError::registration(format!(
                "{}: primary key '{}' cannot be ignored",
                type_name, pk.column
            )));
        }
        if !matches!(pk.kind, ValueKind::Int | ValueKind::Text) {
            return Err(EngineError::registration(format!(
                "{}: primary key '{}' must be a 64-bit integer or a string, found {:?}",
                type_name, pk.column, pk.kind
            )));
        }
        // Generated keys span the full i64 range; the field must take the widest one.
        let mut widest = blank_record.clone();
        let key = match pk.kind {
            ValueKind::Int => serde_json::Value::from(i64::MAX),
            _ => serde_json::Value::from(i64::MAX.to_string()),
        };
        widest.insert(pk.column.clone(), key);
        if let Err(e) = serde_json::from_value::<T>(serde_json::Value::Object(widest)) {
            return Err(EngineError::registration(format!(
                "{}: primary key '{}' must be a 64-bit integer or a string: {}",
                type_name, pk.column, e
            )));
        }
        let primary_key = PrimaryKey {
            column: pk.column.clone(),
            kind: pk.kind,
        };

        Ok(Self {
            type_id: TypeId::of::<T>(),
            type_name,
            table: T::TABLE.to_string(),
            fields,
            primary_key,
            mirrored: T::MIRRORED,
            blank_record,
            blank_instance: new_blank::<T>,
            blank_list: new_blank_list::<T>,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Columns that take part in SQL, in declaration order
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.ignored)
    }

    pub fn field(&self, column: &str) -> Option<&FieldDescriptor> {
        self.columns().find(|f| f.column == column)
    }

    /// A record holding the default value of every field
    pub fn blank_record(&self) -> Record {
        self.blank_record.clone()
    }

    /// A boxed `T::default()`
    pub fn blank_instance(&self) -> Box<dyn Any + Send + Sync> {
        (self.blank_instance)()
    }

    /// A boxed empty `Vec<T>`
    pub fn blank_list(&self) -> Box<dyn Any + Send + Sync> {
        (self.blank_list)()
    }

    pub fn encode<T: Model>(&self, obj: &T) -> Result<Record> {
        self.check_type::<T>()?;
        match serde_json::to_value(obj)? {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(EngineError::validation(format!(
                "{} did not serialize to a struct",
                self.type_name
            ))),
        }
    }

    pub fn decode<T: Model>(&self, record: Record) -> Result<T> {
        self.check_type::<T>()?;
        Ok(serde_json::from_value(serde_json::Value::Object(record))?)
    }

    /// Bindable value of one column of a record
    pub fn value_of(&self, record: &Record, field: &FieldDescriptor) -> Result<Value> {
        let json = record.get(&field.column).unwrap_or(&serde_json::Value::Null);
        Value::from_json(json, field.kind).map_err(|e| {
            EngineError::validation(format!("{}.{}: {}", self.table, field.column, e))
        })
    }

    pub fn pk_value(&self, record: &Record) -> Result<Value> {
        let json = record
            .get(&self.primary_key.column)
            .unwrap_or(&serde_json::Value::Null);
        Value::from_json(json, self.primary_key.kind)
    }

    pub fn set_pk(&self, record: &mut Record, value: Value) {
        record.insert(self.primary_key.column.clone(), value.into_json());
    }

    fn check_type<T: Model>(&self) -> Result<()> {
        if TypeId::of::<T>() != self.type_id {
            return Err(EngineError::validation(format!(
                "metadata for {} used with {}",
                self.type_name,
                std::any::type_name::<T>()
            )));
        }
        Ok(())
    }
}

/// Immutable set of registered models
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<TypeId, Arc<ModelMetadata>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup<T: Model>(&self) -> Result<Arc<ModelMetadata>> {
        self.lookup_id(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub fn lookup_id(&self, type_id: TypeId, type_name: &str) -> Result<Arc<ModelMetadata>> {
        self.models
            .get(&type_id)
            .cloned()
            .ok_or_else(|| EngineError::not_registered(type_name))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Collects registrations during startup
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: HashMap<TypeId, Arc<ModelMetadata>>,
}

impl RegistryBuilder {
    /// Register `T`; registering the same type twice is an error.
    pub fn register<T: Model>(mut self) -> Result<Self> {
        let type_id = TypeId::of::<T>();
        if self.models.contains_key(&type_id) {
            return Err(EngineError::registration(format!(
                "{} is already registered",
                std::any::type_name::<T>()
            )));
        }
        let metadata = ModelMetadata::of::<T>()?;
        tracing::debug!(model = metadata.type_name(), table = metadata.table(), "registered model");
        self.models.insert(type_id, Arc::new(metadata));
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            models: self.models,
        }
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Install the process-wide registry. Succeeds once; later calls fail.
pub fn install(registry: Registry) -> Result<()> {
    REGISTRY
        .set(registry)
        .map_err(|_| EngineError::registration("model registry is already installed"))
}

/// The installed registry, if any
pub fn registry() -> Option<&'static Registry> {
    REGISTRY.get()
}

pub fn lookup<T: Model>() -> Result<Arc<ModelMetadata>> {
    lookup_id(TypeId::of::<T>(), std::any::type_name::<T>())
}

pub fn lookup_id(type_id: TypeId, type_name: &str) -> Result<Arc<ModelMetadata>> {
    match REGISTRY.get() {
        Some(registry) => registry.lookup_id(type_id, type_name),
        None => Err(EngineError::not_registered(type_name)),
    }
}
