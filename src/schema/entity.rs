//! Entity definitions and the schema registry.

use super::relation::{RelationDef, RelationId, RelationType};
use crate::error::ConfigurationError;

/// Handle to an entity registered in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named record type: table, ordered columns, primary key and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub relations: Vec<RelationDef>,
    pk_index: usize,
}

impl EntityDef {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Position of the primary key inside `columns`.
    pub fn primary_key_index(&self) -> usize {
        self.pk_index
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }
}

/// Immutable registry of entities and their relations.
///
/// Built once through [`SchemaBuilder`] and then shared by reference with every
/// query built against it.
///
/// # Example
///
/// ```
/// use lifeguard_prefetch::Schema;
///
/// let mut builder = Schema::builder();
/// let user = builder.entity("User", "users", "id", &["id", "username"])?;
/// let blog = builder.entity("Blog", "blog", "pk", &["pk", "user_id", "title"])?;
/// let blog_user = builder.belongs_to(blog, "user", user, "user_id", Some("blog_set"))?;
/// let schema = builder.build();
///
/// assert_eq!(schema.relation(blog, "user"), Some(blog_user));
/// assert!(schema.relation(user, "blog_set").is_some());
/// # Ok::<(), lifeguard_prefetch::ConfigurationError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: Vec<EntityDef>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up an entity definition.
    ///
    /// Ids are only handed out by this schema's builder, so indexing cannot
    /// miss for ids obtained from it.
    pub fn entity(&self, id: EntityId) -> &EntityDef {
        &self.entities[id.0]
    }

    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities.iter().position(|e| e.name == name).map(EntityId)
    }

    pub fn entity_by_table(&self, table: &str) -> Option<EntityId> {
        self.entities.iter().position(|e| e.table == table).map(EntityId)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &EntityDef)> {
        self.entities.iter().enumerate().map(|(i, e)| (EntityId(i), e))
    }

    pub fn relation(&self, entity: EntityId, name: &str) -> Option<RelationId> {
        self.entity(entity)
            .relations
            .iter()
            .position(|r| r.name == name)
            .map(|slot| RelationId { entity, slot })
    }

    pub fn relation_def(&self, id: RelationId) -> &RelationDef {
        &self.entity(id.entity).relations[id.slot]
    }

    pub fn reverse(&self, id: RelationId) -> Option<RelationId> {
        self.relation_def(id).reverse
    }

    /// `Entity.relation` label for logs and errors.
    pub(crate) fn relation_label(&self, id: RelationId) -> String {
        format!("{}.{}", self.entity(id.entity).name, self.relation_def(id).name)
    }
}

/// Builder collecting entity and relation registrations.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityDef>,
}

impl SchemaBuilder {
    /// Register an entity.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidSchema` if the name or table is
    /// already registered, the column list is empty or repeats a column, or the
    /// primary key is not one of the columns.
    pub fn entity(
        &mut self,
        name: &str,
        table: &str,
        primary_key: &str,
        columns: &[&str],
    ) -> Result<EntityId, ConfigurationError> {
        if self.entities.iter().any(|e| e.name == name || e.table == table) {
            return Err(invalid(format!("entity `{name}` (table `{table}`) is already registered")));
        }
        if columns.is_empty() {
            return Err(invalid(format!("entity `{name}` has no columns")));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(invalid(format!("entity `{name}` repeats column `{column}`")));
            }
        }
        let pk_index = columns
            .iter()
            .position(|c| *c == primary_key)
            .ok_or_else(|| invalid(format!("primary key `{primary_key}` is not a column of `{name}`")))?;

        self.entities.push(EntityDef {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            relations: Vec::new(),
            pk_index,
        });
        Ok(EntityId(self.entities.len() - 1))
    }

    /// Register a to-one edge `from.name -> to` joined on
    /// `from.fk_column = to.primary_key`, plus the inverse to-many edge
    /// `to.related_name -> from` when `related_name` is given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidSchema` for unknown entities, a
    /// foreign key column missing on `from`, or an attribute name that is
    /// already a column or relation of the entity receiving it.
    pub fn belongs_to(
        &mut self,
        from: EntityId,
        name: &str,
        to: EntityId,
        fk_column: &str,
        related_name: Option<&str>,
    ) -> Result<RelationId, ConfigurationError> {
        if from.0 >= self.entities.len() || to.0 >= self.entities.len() {
            return Err(invalid("relation references an unregistered entity".to_string()));
        }
        if !self.entities[from.0].has_column(fk_column) {
            return Err(invalid(format!(
                "foreign key `{fk_column}` is not a column of `{}`",
                self.entities[from.0].name
            )));
        }
        self.check_attribute_free(from, name)?;
        if let Some(related) = related_name {
            self.check_attribute_free(to, related)?;
            if from == to && related == name {
                return Err(invalid(format!("relation `{name}` cannot be its own inverse")));
            }
        }

        let forward = RelationId {
            entity: from,
            slot: self.entities[from.0].relations.len(),
        };
        let inverse = related_name.map(|_| RelationId {
            entity: to,
            // a self-referential inverse lands right after the forward edge
            slot: self.entities[to.0].relations.len() + usize::from(from == to),
        });

        self.entities[from.0].relations.push(RelationDef {
            name: name.to_string(),
            rel_type: RelationType::BelongsTo,
            from,
            to,
            fk_column: fk_column.to_string(),
            reverse: inverse,
        });
        if let Some(related) = related_name {
            self.entities[to.0].relations.push(RelationDef {
                name: related.to_string(),
                rel_type: RelationType::HasMany,
                from: to,
                to: from,
                fk_column: fk_column.to_string(),
                reverse: Some(forward),
            });
        }
        Ok(forward)
    }

    pub fn build(self) -> Schema {
        Schema {
            entities: self.entities,
        }
    }

    fn check_attribute_free(&self, entity: EntityId, name: &str) -> Result<(), ConfigurationError> {
        let def = &self.entities[entity.0];
        if def.has_column(name) || def.relation(name).is_some() {
            return Err(invalid(format!("`{}` already has an attribute named `{name}`", def.name)));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> ConfigurationError {
    ConfigurationError::InvalidSchema(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_registration() {
        let mut builder = Schema::builder();
        let user = builder.entity("User", "users", "id", &["id", "username"]).unwrap();
        let schema = builder.build();

        let def = schema.entity(user);
        assert_eq!(def.table, "users");
        assert_eq!(def.primary_key_index(), 0);
        assert_eq!(def.column_index("username"), Some(1));
        assert_eq!(schema.entity_by_name("User"), Some(user));
        assert_eq!(schema.entity_by_table("users"), Some(user));
    }

    #[test]
    fn test_entity_rejects_missing_primary_key() {
        let mut builder = Schema::builder();
        let err = builder.entity("User", "users", "pk", &["id"]).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSchema(_)));
    }

    #[test]
    fn test_entity_rejects_duplicates() {
        let mut builder = Schema::builder();
        builder.entity("User", "users", "id", &["id"]).unwrap();
        assert!(builder.entity("User", "people", "id", &["id"]).is_err());
        assert!(builder.entity("Person", "users", "id", &["id"]).is_err());
        assert!(builder.entity("Blog", "blog", "id", &["id", "id"]).is_err());
        assert!(builder.entity("Empty", "empty", "id", &[]).is_err());
    }

    #[test]
    fn test_belongs_to_registers_inverse() {
        let mut builder = Schema::builder();
        let user = builder.entity("User", "users", "id", &["id", "username"]).unwrap();
        let blog = builder.entity("Blog", "blog", "pk", &["pk", "user_id", "title"]).unwrap();
        let forward = builder.belongs_to(blog, "user", user, "user_id", Some("blog_set")).unwrap();
        let schema = builder.build();

        let inverse = schema.relation(user, "blog_set").unwrap();
        assert_eq!(schema.reverse(forward), Some(inverse));
        assert_eq!(schema.reverse(inverse), Some(forward));

        let def = schema.relation_def(inverse);
        assert_eq!(def.rel_type, RelationType::HasMany);
        assert_eq!(def.from, user);
        assert_eq!(def.to, blog);
        assert_eq!(def.fk_column, "user_id");
        assert_eq!(def.fk_owner(), blog);
        assert_eq!(schema.relation_label(inverse), "User.blog_set");
    }

    #[test]
    fn test_self_referential_inverse_slots() {
        let mut builder = Schema::builder();
        let category = builder
            .entity("Category", "category", "id", &["id", "parent_id", "name"])
            .unwrap();
        let parent = builder
            .belongs_to(category, "parent", category, "parent_id", Some("children"))
            .unwrap();
        let schema = builder.build();

        let children = schema.relation(category, "children").unwrap();
        assert_eq!(parent.slot(), 0);
        assert_eq!(children.slot(), 1);
        assert_eq!(schema.reverse(parent), Some(children));
        assert_eq!(schema.relation_def(children).name, "children");
    }

    #[test]
    fn test_belongs_to_validation() {
        let mut builder = Schema::builder();
        let user = builder.entity("User", "users", "id", &["id", "username"]).unwrap();
        let blog = builder.entity("Blog", "blog", "pk", &["pk", "user_id"]).unwrap();

        // unknown foreign key column
        assert!(builder.belongs_to(blog, "user", user, "author_id", None).is_err());
        // attribute clashes with a column
        assert!(builder.belongs_to(blog, "user_id", user, "user_id", None).is_err());
        // inverse clashes with a column of the target
        assert!(builder.belongs_to(blog, "user", user, "user_id", Some("username")).is_err());

        builder.belongs_to(blog, "user", user, "user_id", None).unwrap();
        // attribute already taken by a relation
        assert!(builder.belongs_to(blog, "user", user, "user_id", None).is_err());
    }
}
