//! Join plan: the merged tree of every declared fetch path.
//!
//! Nodes are keyed by `(parent, relation, explicit alias)`. Declaring a path
//! walks the tree from the root and only creates nodes for the steps that do
//! not match an existing child, so shared prefixes collapse onto one chain and
//! repeating a declaration changes nothing.
//!
//! The tree splits logically into the *to-one frontier* of a node (the node
//! plus every node reachable from it through `BelongsTo` edges only) and its
//! *continuations* (the `HasMany` children hanging off that frontier). A
//! frontier compiles into one statement; every continuation costs one more.

use crate::error::ConfigurationError;
use crate::schema::{EntityId, RelationId, RelationType, Schema};
use std::collections::HashMap;

/// Handle to a node of a [`JoinPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The query's root entity.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// One step of a fetch path, optionally naming the joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub relation: RelationId,
    pub alias: Option<String>,
}

impl PathStep {
    pub fn new(relation: RelationId) -> Self {
        Self {
            relation,
            alias: None,
        }
    }

    /// A step whose joined table is addressable as `alias` in filters.
    pub fn aliased(relation: RelationId, alias: &str) -> Self {
        Self {
            relation,
            alias: Some(alias.to_string()),
        }
    }
}

impl From<RelationId> for PathStep {
    fn from(relation: RelationId) -> Self {
        PathStep::new(relation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Edge from the parent; `None` only for the root
    pub relation: Option<RelationId>,
    pub rel_type: Option<RelationType>,
    pub entity: EntityId,
    pub table: String,
    pub explicit_alias: Option<String>,
    /// Alias the node is bound to in every statement that joins it
    pub alias: String,
    pub children: Vec<NodeId>,
}

impl PlanNode {
    pub fn is_to_many(&self) -> bool {
        self.rel_type.is_some_and(RelationType::is_to_many)
    }

    pub fn is_to_one(&self) -> bool {
        self.rel_type.is_some_and(RelationType::is_to_one)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    nodes: Vec<PlanNode>,
    aliases: HashMap<String, NodeId>,
}

/// Outcome of matching one step against the existing tree.
enum StepMatch {
    Existing(NodeId),
    New { alias: String },
}

impl JoinPlan {
    pub fn new(schema: &Schema, root: EntityId) -> Self {
        let table = schema.entity(root).table.clone();
        let alias = auto_alias(&table, NodeId::ROOT);
        let mut aliases = HashMap::new();
        aliases.insert(alias.clone(), NodeId::ROOT);
        Self {
            nodes: vec![PlanNode {
                id: NodeId::ROOT,
                parent: None,
                relation: None,
                rel_type: None,
                entity: root,
                table,
                explicit_alias: None,
                alias,
                children: Vec::new(),
            }],
            aliases,
        }
    }

    /// Merge one fetch path into the tree and return the node of its last
    /// step.
    ///
    /// The whole path is validated before the tree is touched, so a rejected
    /// declaration leaves the plan exactly as it was.
    ///
    /// # Errors
    ///
    /// - `EmptyPath` for an empty slice
    /// - `BrokenPath` when a step does not start at the previous step's target
    /// - `AliasConflict` when an explicit alias of a new node is already
    ///   bound, explicitly or as a generated alias. Generated aliases never
    ///   conflict; they move to the next free name.
    pub fn declare(&mut self, schema: &Schema, path: &[PathStep]) -> Result<NodeId, ConfigurationError> {
        if path.is_empty() {
            return Err(ConfigurationError::EmptyPath);
        }

        let matches = self.match_path(schema, path)?;

        let mut cursor = NodeId::ROOT;
        for (step, matched) in path.iter().zip(matches) {
            cursor = match matched {
                StepMatch::Existing(id) => id,
                StepMatch::New { alias } => self.push_node(schema, cursor, step, alias),
            };
        }
        Ok(cursor)
    }

    fn match_path(&self, schema: &Schema, path: &[PathStep]) -> Result<Vec<StepMatch>, ConfigurationError> {
        let mut matches = Vec::with_capacity(path.len());
        let mut entity = self.root().entity;
        let mut cursor = Some(NodeId::ROOT);
        let mut next_id = self.nodes.len();
        // aliases this path is about to bind, with their tables
        let mut pending: Vec<(String, String)> = Vec::new();

        for (position, step) in path.iter().enumerate() {
            if step.relation.entity() != entity {
                return Err(ConfigurationError::BrokenPath {
                    position,
                    expected: schema.entity(entity).name.clone(),
                    found: schema.entity(step.relation.entity()).name.clone(),
                });
            }
            let def = schema.relation_def(step.relation);
            let table = &schema.entity(def.to).table;
            entity = def.to;

            if let Some(existing) = cursor.and_then(|c| self.child(c, step)) {
                matches.push(StepMatch::Existing(existing));
                cursor = Some(existing);
                continue;
            }

            let alias = match &step.alias {
                Some(alias) => {
                    self.check_explicit_alias(alias, table, &pending)?;
                    alias.clone()
                }
                None => self.generated_alias(table, NodeId(next_id), &pending),
            };
            pending.push((alias.clone(), table.clone()));
            matches.push(StepMatch::New { alias });
            cursor = None;
            next_id += 1;
        }
        Ok(matches)
    }

    fn check_explicit_alias(
        &self,
        alias: &str,
        table: &str,
        pending: &[(String, String)],
    ) -> Result<(), ConfigurationError> {
        let bound_table = match self.aliases.get(alias) {
            Some(bound) => Some(self.node(*bound).table.clone()),
            None => pending.iter().find(|(a, _)| a == alias).map(|(_, t)| t.clone()),
        };
        match bound_table {
            Some(bound_table) => Err(ConfigurationError::AliasConflict {
                alias: alias.to_string(),
                bound_table,
                requested_table: table.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// `<table>_<id>`, or `<table>_<id>_<n>` with the first free `n` when a
    /// caller already took that name as an explicit alias.
    fn generated_alias(&self, table: &str, id: NodeId, pending: &[(String, String)]) -> String {
        let taken = |alias: &str| self.aliases.contains_key(alias) || pending.iter().any(|(a, _)| a == alias);
        let base = auto_alias(table, id);
        let mut alias = base.clone();
        let mut n = 1;
        while taken(&alias) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        alias
    }

    fn child(&self, parent: NodeId, step: &PathStep) -> Option<NodeId> {
        self.node(parent).children.iter().copied().find(|c| {
            let node = self.node(*c);
            node.relation == Some(step.relation) && node.explicit_alias == step.alias
        })
    }

    fn push_node(&mut self, schema: &Schema, parent: NodeId, step: &PathStep, alias: String) -> NodeId {
        let def = schema.relation_def(step.relation);
        let id = NodeId(self.nodes.len());
        self.nodes.push(PlanNode {
            id,
            parent: Some(parent),
            relation: Some(step.relation),
            rel_type: Some(def.rel_type),
            entity: def.to,
            table: schema.entity(def.to).table.clone(),
            explicit_alias: step.alias.clone(),
            alias: alias.clone(),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        self.aliases.insert(alias, id);
        id
    }

    /// Look up a node. Ids only come from this plan, so this cannot miss for
    /// ids it handed out.
    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }

    pub fn root(&self) -> &PlanNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_by_alias(&self, alias: &str) -> Option<NodeId> {
        self.aliases.get(alias).copied()
    }

    /// `start` plus every node reachable from it over to-one edges, in
    /// preorder. Parents always precede their children.
    pub fn frontier(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            let node = self.node(id);
            for child in node.children.iter().rev() {
                if self.node(*child).is_to_one() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// To-many children of the frontier of `start`, in declaration order.
    pub fn continuations(&self, start: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .frontier(start)
            .into_iter()
            .flat_map(|id| self.node(id).children.iter().copied())
            .filter(|c| self.node(*c).is_to_many())
            .collect();
        out.sort();
        out
    }

    /// Distinct to-many edges in the whole plan; each costs one statement.
    pub fn to_many_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_to_many()).count()
    }
}

fn auto_alias(table: &str, id: NodeId) -> String {
    format!("{table}_{}", id.0)
}
