//! # Entity Metadata
//!
//! Read-only description of entities, their tables and their relations, as
//! consumed by the find-query compiler.
//!
//! Metadata is declared with a fluent builder and frozen into a
//! [`MetadataRegistry`], which resolves relation targets and inheritance chains
//! once at construction time.
//!
//! ```rust
//! use orm_find::metadata::{EntityMetadata, MetadataRegistry};
//!
//! let registry = MetadataRegistry::builder()
//!     .entity(
//!         EntityMetadata::new("Author", "a", "authors")
//!             .primitive("lastName", "last_name", "varchar")
//!             .one_to_many("books", "Book", "author_id"),
//!     )
//!     .entity(
//!         EntityMetadata::new("Book", "b", "books")
//!             .primitive("title", "title", "varchar")
//!             .many_to_one("author", "author_id", "Author")
//!             .default_order("title"),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(registry.entity("Book").unwrap().table_name, "books");
//! ```

pub mod codec;
pub mod registry;

pub use codec::{ColumnCodec, IdKind};
pub use registry::{MetadataRegistry, RegistryBuilder, ResolvedField};

use crate::constants::{ID_COLUMN, ID_FIELD};
use crate::error::{FindError, Result};
use serde_json::Value;

/// A physical column and the codec for values compared against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub db_type: String,
    pub codec: ColumnCodec,
}

impl Column {
    pub fn new(name: &str, db_type: &str) -> Self {
        Self {
            name: name.to_string(),
            db_type: db_type.to_string(),
            codec: ColumnCodec::Identity,
        }
    }

    pub fn with_codec(mut self, codec: ColumnCodec) -> Self {
        self.codec = codec;
        self
    }
}

/// One candidate target of a polymorphic reference.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyComponent {
    pub other: String,
    pub column: Column,
}

/// Closed set of field kinds the compiler dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    PrimaryKey(Column),
    Primitive(Column),
    Enum(Column),
    /// Foreign key column on this table pointing at `other.id`.
    ManyToOne { column: Column, other: String },
    /// `other_column` on the other table points back at this table's id.
    OneToOne { other: String, other_column: String },
    OneToMany { other: String, other_column: String },
    /// `join_table.column` points at this entity, `join_table.other_column` at `other`.
    ManyToMany {
        join_table: String,
        column: String,
        other_column: String,
        other: String,
    },
    Polymorphic { components: Vec<PolyComponent> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    /// Name of the related entity for single-target relations.
    pub fn other_entity(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::ManyToOne { other, .. }
            | FieldKind::OneToOne { other, .. }
            | FieldKind::OneToMany { other, .. }
            | FieldKind::ManyToMany { other, .. } => Some(other),
            _ => None,
        }
    }
}

/// How an entity maps onto tables relative to its base type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Inheritance {
    #[default]
    None,
    /// Sub-type columns live in their own table sharing the base table's id.
    ClassTable,
    /// Sub-type rows live in the base table, told apart by a discriminator column.
    SingleTable { discriminator: String, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub name: String,
    pub tag: String,
    pub table_name: String,
    pub fields: Vec<Field>,
    pub base_type: Option<String>,
    pub inheritance: Inheritance,
    /// Discriminator column declared on an STI base.
    pub discriminator: Option<String>,
    pub soft_delete_column: Option<String>,
    /// Field name used when the caller gives no order-by.
    pub default_order: Option<String>,
}

impl EntityMetadata {
    /// New entity with an integer, tagged primary key named `id`.
    pub fn new(name: &str, tag: &str, table_name: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            table_name: table_name.to_string(),
            fields: vec![Field {
                name: ID_FIELD.to_string(),
                kind: FieldKind::PrimaryKey(
                    Column::new(ID_COLUMN, "int").with_codec(ColumnCodec::tagged_id(tag)),
                ),
            }],
            base_type: None,
            inheritance: Inheritance::None,
            discriminator: None,
            soft_delete_column: None,
            default_order: None,
        }
    }

    pub fn uuid_ids(mut self) -> Self {
        let tag = self.tag.clone();
        if let Some(FieldKind::PrimaryKey(column)) =
            self.fields.iter_mut().map(|f| &mut f.kind).next()
        {
            column.db_type = "uuid".to_string();
            column.codec = ColumnCodec::TaggedId {
                tag,
                kind: IdKind::Uuid,
            };
        }
        self
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn primitive(self, name: &str, column: &str, db_type: &str) -> Self {
        self.field(name, FieldKind::Primitive(Column::new(column, db_type)))
    }

    pub fn primitive_with(self, name: &str, column: Column) -> Self {
        self.field(name, FieldKind::Primitive(column))
    }

    pub fn enum_field<'a>(
        self,
        name: &str,
        column: &str,
        codes: impl IntoIterator<Item = (&'a str, i64)>,
    ) -> Self {
        self.field(
            name,
            FieldKind::Enum(Column::new(column, "int").with_codec(ColumnCodec::enum_codes(codes))),
        )
    }

    pub fn many_to_one(self, name: &str, column: &str, other: &str) -> Self {
        self.field(
            name,
            FieldKind::ManyToOne {
                column: Column::new(column, "int"),
                other: other.to_string(),
            },
        )
    }

    pub fn one_to_one(self, name: &str, other: &str, other_column: &str) -> Self {
        self.field(
            name,
            FieldKind::OneToOne {
                other: other.to_string(),
                other_column: other_column.to_string(),
            },
        )
    }

    pub fn one_to_many(self, name: &str, other: &str, other_column: &str) -> Self {
        self.field(
            name,
            FieldKind::OneToMany {
                other: other.to_string(),
                other_column: other_column.to_string(),
            },
        )
    }

    pub fn many_to_many(
        self,
        name: &str,
        join_table: &str,
        column: &str,
        other_column: &str,
        other: &str,
    ) -> Self {
        self.field(
            name,
            FieldKind::ManyToMany {
                join_table: join_table.to_string(),
                column: column.to_string(),
                other_column: other_column.to_string(),
                other: other.to_string(),
            },
        )
    }

    /// Polymorphic reference with one `(target entity, column)` pair per candidate type.
    pub fn polymorphic(self, name: &str, components: &[(&str, &str)]) -> Self {
        let components = components
            .iter()
            .map(|(other, column)| PolyComponent {
                other: other.to_string(),
                column: Column::new(column, "int"),
            })
            .collect();
        self.field(name, FieldKind::Polymorphic { components })
    }

    pub fn extends(mut self, base: &str) -> Self {
        self.base_type = Some(base.to_string());
        self.inheritance = Inheritance::ClassTable;
        self
    }

    pub fn extends_single_table(mut self, base: &str, discriminator: &str, value: Value) -> Self {
        self.base_type = Some(base.to_string());
        self.inheritance = Inheritance::SingleTable {
            discriminator: discriminator.to_string(),
            value,
        };
        self
    }

    pub fn discriminator(mut self, column: &str) -> Self {
        self.discriminator = Some(column.to_string());
        self
    }

    pub fn soft_delete(mut self, column: &str) -> Self {
        self.soft_delete_column = Some(column.to_string());
        self
    }

    pub fn default_order(mut self, field: &str) -> Self {
        self.default_order = Some(field.to_string());
        self
    }

    /// Field declared directly on this entity (inherited fields are resolved by the registry).
    pub fn own_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_column(&self) -> Result<&Column> {
        match self.own_field(ID_FIELD).map(|f| &f.kind) {
            Some(FieldKind::PrimaryKey(column)) => Ok(column),
            _ => Err(FindError::InvalidMetadata(format!(
                "entity {} has no primary key field",
                self.name
            ))),
        }
    }

    /// Convert a tagged or bare id of this entity to its database value.
    pub fn id_to_db(&self, value: &Value) -> Result<Value> {
        let column = self.id_column()?;
        column.codec.to_db(&column.name, value)
    }
}
