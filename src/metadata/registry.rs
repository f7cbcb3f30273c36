//! # Metadata Registry
//!
//! Immutable, explicitly constructed registry of entity metadata. Built once,
//! shared via `Arc`, and only read by the compiler.

use super::{Column, EntityMetadata, Field, FieldKind, Inheritance};
use crate::constants::{inheritance, ID_FIELD};
use crate::error::{FindError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of all entities known to the compiler.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
    by_tag: HashMap<String, String>,
    /// Class-table base chain per entity, nearest base first.
    base_tables: HashMap<String, Vec<String>>,
    /// All class-table and single-table descendants per entity, deepest first.
    sub_types: HashMap<String, Vec<String>>,
}

/// A field found on an entity or one of its base types.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    pub field: &'a Field,
    pub owner: &'a EntityMetadata,
    /// Index of the class-table base holding the field, `None` for the entity's own table.
    pub base_index: Option<usize>,
}

impl ResolvedField<'_> {
    /// Alias of the table holding this field, given the alias of the entity's own table.
    pub fn table_alias(&self, alias: &str) -> String {
        match self.base_index {
            Some(i) => inheritance::base_alias(alias, i),
            None => alias.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityMetadata>,
}

impl RegistryBuilder {
    pub fn entity(mut self, meta: EntityMetadata) -> Self {
        self.entities.push(meta);
        self
    }

    /// Validate relation targets and inheritance links, then freeze.
    pub fn build(self) -> Result<MetadataRegistry> {
        let mut entities: HashMap<String, EntityMetadata> = HashMap::new();
        for meta in self.entities {
            if !matches!(
                meta.own_field(ID_FIELD).map(|f| &f.kind),
                Some(FieldKind::PrimaryKey(_))
            ) {
                return Err(FindError::InvalidMetadata(format!(
                    "{} has no primary key field",
                    meta.name
                )));
            }
            let name = meta.name.clone();
            if entities.insert(name.clone(), meta).is_some() {
                return Err(FindError::InvalidMetadata(format!(
                    "entity {name} registered twice"
                )));
            }
        }

        for meta in entities.values() {
            if let Some(base) = &meta.base_type {
                if !entities.contains_key(base) {
                    return Err(FindError::InvalidMetadata(format!(
                        "{} extends unknown entity {base}",
                        meta.name
                    )));
                }
            }
            for field in &meta.fields {
                let targets: Vec<&str> = match &field.kind {
                    FieldKind::Polymorphic { components } => {
                        components.iter().map(|c| c.other.as_str()).collect()
                    }
                    _ => field.other_entity().into_iter().collect(),
                };
                if let Some(missing) = targets.iter().find(|t| !entities.contains_key(**t)) {
                    return Err(FindError::InvalidMetadata(format!(
                        "{}.{} points at unknown entity {missing}",
                        meta.name, field.name
                    )));
                }
            }
        }

        resolve_foreign_keys(&mut entities)?;

        let mut registry = MetadataRegistry {
            entities: entities
                .into_iter()
                .map(|(name, meta)| (name, Arc::new(meta)))
                .collect(),
            ..Default::default()
        };
        registry.resolve_hierarchies()?;
        debug!(
            entities = registry.entities.len(),
            "Metadata registry built"
        );
        Ok(registry)
    }
}

/// Foreign key columns take the database type and id codec of the primary key they point at.
fn resolve_foreign_keys(entities: &mut HashMap<String, EntityMetadata>) -> Result<()> {
    let keys = entities
        .iter()
        .map(|(name, meta)| Ok((name.clone(), meta.id_column()?.clone())))
        .collect::<Result<HashMap<_, _>>>()?;
    let adopt = |column: &mut Column, other: &str| {
        if let Some(key) = keys.get(other) {
            column.db_type = key.db_type.clone();
            column.codec = key.codec.clone();
        }
    };
    for meta in entities.values_mut() {
        for field in &mut meta.fields {
            match &mut field.kind {
                FieldKind::ManyToOne { column, other } => adopt(column, other),
                FieldKind::Polymorphic { components } => {
                    for component in components {
                        adopt(&mut component.column, &component.other);
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

impl MetadataRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn resolve_hierarchies(&mut self) -> Result<()> {
        let mut names: Vec<String> = self.entities.keys().cloned().collect();
        names.sort();

        for name in &names {
            let chain = self.ancestors(name)?;
            // Tags are shared inside a hierarchy and resolve to its root.
            let root = chain.last().unwrap_or(name).clone();
            let tag = self.entities[name].tag.clone();
            match self.by_tag.get(&tag) {
                Some(existing) if *existing != root => {
                    return Err(FindError::InvalidMetadata(format!(
                        "tag '{tag}' used by both {existing} and {name}"
                    )))
                }
                _ => {
                    self.by_tag.insert(tag, root);
                }
            }

            if let Inheritance::SingleTable { discriminator, .. } = &self.entities[name].inheritance {
                let declared = self.discriminator(&self.entities[name]);
                if declared.is_some_and(|column| column != discriminator.as_str()) {
                    return Err(FindError::InvalidMetadata(format!(
                        "{name} discriminates on {discriminator} but its hierarchy declares {}",
                        declared.unwrap_or_default()
                    )));
                }
            }

            let mut bases = Vec::new();
            let mut current = name.clone();
            for base in &chain {
                if self.entities[&current].inheritance != Inheritance::ClassTable {
                    break;
                }
                bases.push(base.clone());
                current = base.clone();
            }
            self.base_tables.insert(name.clone(), bases);
        }

        let mut by_depth: HashMap<String, Vec<(usize, String)>> = HashMap::new();
        for name in &names {
            let chain = self.ancestors(name)?;
            let depth = chain.len();
            for ancestor in chain {
                by_depth
                    .entry(ancestor)
                    .or_default()
                    .push((depth, name.clone()));
            }
        }
        for (ancestor, mut subs) in by_depth {
            subs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            self.sub_types
                .insert(ancestor, subs.into_iter().map(|(_, n)| n).collect());
        }
        Ok(())
    }

    /// Base type chain of an entity, nearest first.
    fn ancestors(&self, name: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = self.entity(name)?;
        while let Some(base) = &current.base_type {
            if chain.contains(base) || base == name {
                return Err(FindError::InvalidMetadata(format!(
                    "inheritance cycle through {name}"
                )));
            }
            chain.push(base.clone());
            current = self.entity(base)?;
        }
        Ok(chain)
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntityMetadata>> {
        self.entities
            .get(name)
            .ok_or_else(|| FindError::UnknownEntity(name.to_string()))
    }

    /// Root entity of the hierarchy using `tag` for its tagged ids.
    pub fn entity_by_tag(&self, tag: &str) -> Option<&Arc<EntityMetadata>> {
        self.by_tag.get(tag).and_then(|name| self.entities.get(name))
    }

    /// Class-table base types, nearest first; index `i` is joined as `alias_b{i}`.
    pub fn base_tables(&self, meta: &EntityMetadata) -> Vec<&Arc<EntityMetadata>> {
        self.names_to_entities(self.base_tables.get(&meta.name))
    }

    /// Every descendant type, deepest first.
    pub fn sub_types(&self, meta: &EntityMetadata) -> Vec<&Arc<EntityMetadata>> {
        self.names_to_entities(self.sub_types.get(&meta.name))
    }

    fn names_to_entities(&self, names: Option<&Vec<String>>) -> Vec<&Arc<EntityMetadata>> {
        names
            .map(|names| names.iter().filter_map(|n| self.entities.get(n)).collect())
            .unwrap_or_default()
    }

    /// True when `child` is `ancestor` or inherits from it.
    pub fn is_a(&self, child: &str, ancestor: &str) -> bool {
        child == ancestor
            || self
                .ancestors(child)
                .map(|chain| chain.iter().any(|a| a == ancestor))
                .unwrap_or(false)
    }

    /// Find a field on the entity or any base type, with the base table index holding it.
    pub fn resolve_field<'a>(
        &'a self,
        meta: &'a EntityMetadata,
        name: &str,
    ) -> Result<ResolvedField<'a>> {
        let mut owner = meta;
        let mut base_index: Option<usize> = None;
        loop {
            if let Some(field) = owner.own_field(name) {
                // The id column exists on every table of a hierarchy; use the entity's own.
                let base_index = if name == ID_FIELD { None } else { base_index };
                return Ok(ResolvedField {
                    field,
                    owner,
                    base_index,
                });
            }
            let Some(base) = &owner.base_type else {
                return Err(FindError::unknown_field(&meta.name, name));
            };
            if owner.inheritance == Inheritance::ClassTable {
                base_index = Some(base_index.map_or(0, |i| i + 1));
            }
            owner = self.entity(base)?.as_ref();
        }
    }

    /// Soft-delete column of the entity or its nearest declaring base, with that base's index.
    pub fn soft_delete_column<'a>(
        &'a self,
        meta: &'a EntityMetadata,
    ) -> Option<(Option<usize>, &'a str)> {
        let mut owner = meta;
        let mut base_index: Option<usize> = None;
        loop {
            if let Some(column) = &owner.soft_delete_column {
                return Some((base_index, column));
            }
            let base = owner.base_type.as_ref()?;
            if owner.inheritance == Inheritance::ClassTable {
                base_index = Some(base_index.map_or(0, |i| i + 1));
            }
            owner = self.entities.get(base)?.as_ref();
        }
    }

    /// Discriminator column of a single-table hierarchy, declared on its root.
    pub fn discriminator<'a>(&'a self, meta: &'a EntityMetadata) -> Option<&'a str> {
        let mut owner = meta;
        loop {
            if let Some(column) = &owner.discriminator {
                return Some(column);
            }
            owner = self.entities.get(owner.base_type.as_ref()?)?.as_ref();
        }
    }
}
