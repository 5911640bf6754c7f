//! Sample entities for SQLite-backed tests.

use fixturedb_provider::{Column, EntityType};
use fixturedb_sqlite::{Entity, SqliteProvider};
use serde::{Deserialize, Serialize};

/// A single-table entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestModel {
    /// Generated id.
    pub id: Option<i64>,
    /// Payload.
    pub value: String,
}

impl TestModel {
    /// An unsaved model.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
        }
    }
}

impl Entity for TestModel {
    fn entity_type() -> EntityType {
        EntityType::entity::<Self>()
            .column(Column::id("id"))
            .column(Column::text("value").required())
    }
}

/// Parent side of a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Generated id.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
}

impl Author {
    /// An unsaved author.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Author {
    fn entity_type() -> EntityType {
        EntityType::entity::<Self>()
            .column(Column::id("id"))
            .column(Column::text("name").required())
    }
}

/// Child side of a foreign key, referencing [`Author`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Generated id.
    pub id: Option<i64>,
    /// Title.
    pub title: String,
    /// Referenced author.
    pub author_id: i64,
    /// Tags, stored as JSON.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Book {
    /// An unsaved book by `author_id`.
    pub fn new(title: impl Into<String>, author_id: i64) -> Self {
        Self {
            id: None,
            title: title.into(),
            author_id,
            tags: Vec::new(),
        }
    }
}

impl Entity for Book {
    fn entity_type() -> EntityType {
        EntityType::entity::<Self>()
            .column(Column::id("id"))
            .column(Column::text("title").required())
            .column(Column::integer("author_id").required().references("Author"))
            .column(Column::json("tags"))
    }
}

/// Embeddable value type; has no table of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
}

/// Metadata for [`Address`].
pub fn address_type() -> EntityType {
    EntityType::embeddable::<Address>()
}

/// Entity stored under an explicit table name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    /// Generated id.
    pub id: Option<i64>,
    /// Free text.
    pub note: String,
    /// Whether the record was migrated.
    pub migrated: bool,
}

impl Entity for LegacyRecord {
    fn entity_type() -> EntityType {
        EntityType::entity::<Self>()
            .named("legacy_records")
            .column(Column::id("id"))
            .column(Column::text("note"))
            .column(Column::boolean("migrated"))
    }
}

/// Provider declaring `unit` with [`TestModel`] only.
pub fn model_provider(unit: &str) -> SqliteProvider {
    SqliteProvider::new().unit(unit, [TestModel::entity_type()])
}

/// Provider declaring `unit` with [`library_types`].
pub fn library_provider(unit: &str) -> SqliteProvider {
    SqliteProvider::new().unit(unit, library_types())
}

/// Sample types with the FK parent listed before its child.
pub fn library_types() -> Vec<EntityType> {
    vec![
        Author::entity_type(),
        address_type(),
        Book::entity_type(),
        LegacyRecord::entity_type(),
        TestModel::entity_type(),
    ]
}
