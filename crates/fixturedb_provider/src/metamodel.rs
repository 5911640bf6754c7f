//! Metamodel of managed entity types.
//!
//! A factory knows which application types it maps to tables. Each
//! [`EntityType`] carries enough metadata to resolve its storage name and,
//! for providers that generate schema, its columns and foreign keys.

/// Whether a managed type is backed by its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A top-level entity stored in its own table.
    Entity,
    /// A value type embedded in other entities; it has no table.
    Embeddable,
}

/// Column value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text.
    Text,
    /// Boolean stored as 0/1.
    Boolean,
    /// Arbitrary JSON stored as text.
    Json,
}

/// A mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, equal to the serialized field name.
    pub name: String,
    /// Value type.
    pub kind: ColumnKind,
    /// Whether this is the generated primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Storage name of the referenced table, if this is a foreign key.
    pub references: Option<String>,
}

impl Column {
    fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            nullable: true,
            references: None,
        }
    }

    /// Generated integer primary key.
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..Self::new(name, ColumnKind::Integer)
        }
    }

    /// Integer column.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    /// Float column.
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Real)
    }

    /// Text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    /// Boolean column.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Boolean)
    }

    /// JSON column.
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Json)
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Makes the column a foreign key to `table`'s primary key.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }
}

/// A type managed by a persistence factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    type_name: String,
    kind: TypeKind,
    name: Option<String>,
    columns: Vec<Column>,
}

impl EntityType {
    /// Describes the entity type `T`.
    pub fn entity<T: ?Sized>() -> Self {
        Self::with_type_name(std::any::type_name::<T>(), TypeKind::Entity)
    }

    /// Describes the embeddable value type `T`.
    pub fn embeddable<T: ?Sized>() -> Self {
        Self::with_type_name(std::any::type_name::<T>(), TypeKind::Embeddable)
    }

    /// Describes a type by its full type name.
    pub fn with_type_name(type_name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
            name: None,
            columns: Vec::new(),
        }
    }

    /// Overrides the storage name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Full type name, as reported by `std::any::type_name`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Kind of the type.
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Mapped columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The primary key column, if one is declared.
    pub fn id_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Resolves the table name.
    ///
    /// Entities use the explicit name when it is non-empty, otherwise the
    /// simple type name. Embeddables have no table and return `None`.
    pub fn storage_name(&self) -> Option<String> {
        if self.kind != TypeKind::Entity {
            return None;
        }
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => simple_name(&self.type_name),
        }
    }
}

/// Strips module path and generic arguments: `app::model::Book<u8>` -> `Book`.
fn simple_name(type_name: &str) -> Option<String> {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let simple = base.rsplit("::").next().unwrap_or(base).trim();
    if simple.is_empty() {
        None
    } else {
        Some(simple.to_string())
    }
}
