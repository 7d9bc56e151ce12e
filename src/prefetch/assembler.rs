//! Compiles one to-one frontier of a [`JoinPlan`] into a [`Statement`].
//!
//! Every node of the frontier contributes a `LEFT JOIN` against its parent's
//! alias plus its table's columns to the manifest. Filter and order columns are
//! resolved here, so an ambiguous or unknown table reference fails before any
//! statement reaches the store.

use super::plan::{JoinPlan, NodeId};
use crate::error::ConfigurationError;
use crate::query::filter::{ColumnRef, Filter, Source};
use crate::query::statement::{ColumnManifest, Join, QualifiedColumn, Statement, TableAlias};
use crate::schema::Schema;
use sea_query::{JoinType, Order, Value};

/// Build the statement for the frontier rooted at `statement_root`.
///
/// # Errors
///
/// Returns `ConfigurationError` when a filter or order column references an
/// ambiguous or unknown table, or a column the table does not have.
pub fn assemble(
    schema: &Schema,
    plan: &JoinPlan,
    statement_root: NodeId,
    filter: Option<&Filter>,
    order_by: &[(ColumnRef, Order)],
    limit: Option<u64>,
) -> Result<Statement, ConfigurationError> {
    let frontier = plan.frontier(statement_root);
    let root = plan.node(statement_root);

    let mut manifest = ColumnManifest::default();
    for id in &frontier {
        let node = plan.node(*id);
        manifest.push_alias(&node.alias, &schema.entity(node.entity).columns);
    }

    let mut statement = Statement::new(TableAlias::new(&root.table, &root.alias), manifest);
    for id in frontier.iter().skip(1) {
        statement.joins.push(join_for(schema, plan, *id)?);
    }

    let resolver = ReferenceResolver {
        schema,
        plan,
        frontier: &frontier,
        root: statement_root,
    };
    if let Some(filter) = filter {
        statement.filter = Some(filter.try_map(&mut |c: &ColumnRef| resolver.resolve(c))?);
    }
    for (column, order) in order_by {
        statement.order_by.push((resolver.resolve(column)?, order.clone()));
    }
    statement.limit = limit;
    Ok(statement)
}

/// Statement loading one to-many continuation for a set of owner keys:
/// its own frontier, restricted by `<alias>.<fk> IN (keys)`.
///
/// `owner_keys` are bound as given. Pass the owners' primary key values as
/// they were decoded so each parameter keeps the column's type (`int4` stays
/// `Value::Int`).
pub fn batch_statement(
    schema: &Schema,
    plan: &JoinPlan,
    continuation: NodeId,
    owner_keys: &[Value],
) -> Result<Statement, ConfigurationError> {
    let node = plan.node(continuation);
    let relation = node.relation.ok_or_else(|| ConfigurationError::UnknownReference {
        handle: node.alias.clone(),
        reason: "the query root is not a to-many continuation".to_string(),
    })?;
    let fk_column = &schema.relation_def(relation).fk_column;

    let mut statement = assemble(schema, plan, continuation, None, &[], None)?;
    statement.filter = Some(Filter::In(
        QualifiedColumn::new(&node.alias, fk_column),
        owner_keys.to_vec(),
    ));
    Ok(statement)
}

fn join_for(schema: &Schema, plan: &JoinPlan, id: NodeId) -> Result<Join, ConfigurationError> {
    let node = plan.node(id);
    let (Some(parent), Some(relation)) = (node.parent, node.relation) else {
        return Err(ConfigurationError::UnknownReference {
            handle: node.alias.clone(),
            reason: "the query root cannot be joined".to_string(),
        });
    };
    let parent = plan.node(parent);
    let def = schema.relation_def(relation);
    Ok(Join {
        join_type: JoinType::LeftJoin,
        table: TableAlias::new(&node.table, &node.alias),
        parent: QualifiedColumn::new(&parent.alias, &def.fk_column),
        child: QualifiedColumn::new(&node.alias, &schema.entity(node.entity).primary_key),
    })
}

/// Maps caller-facing column handles onto the aliases of one statement.
struct ReferenceResolver<'a> {
    schema: &'a Schema,
    plan: &'a JoinPlan,
    frontier: &'a [NodeId],
    root: NodeId,
}

impl ReferenceResolver<'_> {
    fn resolve(&self, column: &ColumnRef) -> Result<QualifiedColumn, ConfigurationError> {
        let node = match &column.source {
            Source::Root => self.root,
            Source::Named(handle) => self.resolve_handle(handle)?,
        };
        let node = self.plan.node(node);
        let entity = self.schema.entity(node.entity);
        if !entity.has_column(&column.column) {
            return Err(ConfigurationError::UnknownColumn {
                table: entity.table.clone(),
                column: column.column.clone(),
            });
        }
        Ok(QualifiedColumn::new(&node.alias, &column.column))
    }

    fn resolve_handle(&self, handle: &str) -> Result<NodeId, ConfigurationError> {
        if let Some(id) = self.plan.node_by_alias(handle) {
            if self.frontier.contains(&id) {
                return Ok(id);
            }
            return Err(ConfigurationError::UnknownReference {
                handle: handle.to_string(),
                reason: "alias is loaded by a separate to-many statement".to_string(),
            });
        }
        if self.plan.node(self.root).table == handle {
            return Ok(self.root);
        }

        let candidates: Vec<NodeId> = self
            .frontier
            .iter()
            .copied()
            .filter(|id| {
                let node = self.plan.node(*id);
                node.table == handle && node.explicit_alias.is_none()
            })
            .collect();
        match candidates.as_slice() {
            [single] => Ok(*single),
            [] => Err(ConfigurationError::UnknownReference {
                handle: handle.to_string(),
                reason: "no unaliased join of this table in the statement".to_string(),
            }),
            many => Err(ConfigurationError::AmbiguousReference {
                table: handle.to_string(),
                candidates: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetch::plan::PathStep;
    use crate::query::filter::{col, root};
    use crate::schema::{EntityId, RelationId};

    struct Fixture {
        schema: Schema,
        entry: EntityId,
        author: RelationId,
        editor: RelationId,
        reviewer: RelationId,
    }

    /// An entry with three foreign keys into `users`.
    fn fixture() -> Fixture {
        let mut b = Schema::builder();
        let user = b.entity("User", "users", "id", &["id", "username"]).unwrap();
        let entry = b
            .entity("Entry", "entry", "id", &["id", "author_id", "editor_id", "reviewer_id", "title"])
            .unwrap();
        let author = b.belongs_to(entry, "author", user, "author_id", Some("authored")).unwrap();
        let editor = b.belongs_to(entry, "editor", user, "editor_id", None).unwrap();
        let reviewer = b.belongs_to(entry, "reviewer", user, "reviewer_id", None).unwrap();
        Fixture {
            schema: b.build(),
            entry,
            author,
            editor,
            reviewer,
        }
    }

    #[test]
    fn test_assemble_joins_and_manifest() {
        let f = fixture();
        let mut plan = JoinPlan::new(&f.schema, f.entry);
        plan.declare(&f.schema, &[f.author.into()]).unwrap();

        let statement = assemble(&f.schema, &plan, NodeId::ROOT, None, &[], None).unwrap();
        assert_eq!(statement.root, TableAlias::new("entry", "entry_0"));
        assert_eq!(statement.joins.len(), 1);
        assert_eq!(statement.joins[0].parent, QualifiedColumn::new("entry_0", "author_id"));
        assert_eq!(statement.joins[0].child, QualifiedColumn::new("users_1", "id"));
        assert_eq!(statement.manifest.range("users_1"), Some(5..7));
    }

    #[test]
    fn test_unaliased_siblings_are_ambiguous() {
        let f = fixture();
        let mut plan = JoinPlan::new(&f.schema, f.entry);
        for relation in [f.author, f.editor, f.reviewer] {
            plan.declare(&f.schema, &[relation.into()]).unwrap();
        }

        // the plan itself is fine; only a bare table reference is rejected
        assert!(assemble(&f.schema, &plan, NodeId::ROOT, None, &[], None).is_ok());

        let filter = col("users", "username").eq("alice");
        let err = assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &[], None).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::AmbiguousReference {
                table: "users".to_string(),
                candidates: 3,
            }
        );
    }

    #[test]
    fn test_explicit_aliases_disambiguate() {
        let f = fixture();
        let mut plan = JoinPlan::new(&f.schema, f.entry);
        plan.declare(&f.schema, &[f.author.into()]).unwrap();
        plan.declare(&f.schema, &[PathStep::aliased(f.editor, "ed")]).unwrap();
        plan.declare(&f.schema, &[PathStep::aliased(f.reviewer, "rev")]).unwrap();

        let filter = col("ed", "username")
            .eq("bob")
            .and(col("users", "username").eq("alice"))
            .and(root("title").ne("draft"));
        let order = [(col("rev", "username"), Order::Asc)];
        let statement =
            assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &order, Some(10)).unwrap();

        let columns = statement.filter.as_ref().unwrap().columns();
        assert_eq!(columns[0], &QualifiedColumn::new("ed", "username"));
        assert_eq!(columns[1], &QualifiedColumn::new("users_1", "username"));
        assert_eq!(columns[2], &QualifiedColumn::new("entry_0", "title"));
        assert_eq!(statement.order_by[0].0, QualifiedColumn::new("rev", "username"));
        assert_eq!(statement.limit, Some(10));

        let (sql, _) = statement.to_sql();
        assert!(sql.contains("LEFT JOIN \"users\" AS \"ed\" ON \"entry_0\".\"editor_id\" = \"ed\".\"id\""));
    }

    #[test]
    fn test_unknown_references() {
        let f = fixture();
        let mut plan = JoinPlan::new(&f.schema, f.entry);
        plan.declare(&f.schema, &[f.author.into()]).unwrap();

        let filter = col("comment", "id").eq(1);
        let err = assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &[], None).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownReference { .. }));

        let filter = col("users", "email").eq("a@b");
        let err = assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &[], None).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownColumn {
                table: "users".to_string(),
                column: "email".to_string(),
            }
        );

        // the root table name always means the statement root
        let filter = col("entry", "title").eq("x");
        assert!(assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &[], None).is_ok());
    }

    #[test]
    fn test_batch_statement_filters_on_foreign_key() {
        let f = fixture();
        let user = f.schema.entity_by_table("users").unwrap();
        let authored = f.schema.relation(user, "authored").unwrap();
        let mut plan = JoinPlan::new(&f.schema, user);
        let entries = plan.declare(&f.schema, &[authored.into()]).unwrap();

        // a to-many alias is not addressable from the root statement
        let filter = col("entry_1", "title").eq("x");
        let err = assemble(&f.schema, &plan, NodeId::ROOT, Some(&filter), &[], None).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownReference { .. }));

        let keys = [Value::Int(Some(1)), Value::Int(Some(2))];
        let statement = batch_statement(&f.schema, &plan, entries, &keys).unwrap();
        assert_eq!(statement.root, TableAlias::new("entry", "entry_1"));
        let (sql, values) = statement.to_sql();
        assert!(sql.contains("WHERE \"entry_1\".\"author_id\" IN ($1, $2)"));
        // int4 keys stay int4 parameters
        assert_eq!(values.0, keys.to_vec());
    }
}
