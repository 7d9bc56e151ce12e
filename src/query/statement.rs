//! Abstract SELECT statements.
//!
//! A [`Statement`] is the hand-off between the prefetch planner and whatever
//! executes it: root table and alias, left joins with their predicates, the
//! column manifest, a resolved filter, ordering and limit. Rendering to SQL
//! text is delegated to sea-query ([`Statement::to_select`]).

use super::filter::Filter;
use sea_query::{ExprTrait, Iden, JoinType, Order, PostgresQueryBuilder, Query, SelectStatement, Values};
use std::ops::Range;

/// Owned identifier used when rendering through sea-query.
#[derive(Debug, Clone)]
pub(crate) struct Name(pub(crate) String);

impl Iden for Name {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// Column addressed through a concrete table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedColumn {
    pub alias: String,
    pub column: String,
}

impl QualifiedColumn {
    pub fn new(alias: &str, column: &str) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn to_column_ref(&self) -> (Name, Name) {
        (Name(self.alias.clone()), Name(self.column.clone()))
    }
}

/// A table together with the alias it is bound to in one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAlias {
    pub table: String,
    pub alias: String,
}

impl TableAlias {
    pub fn new(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
        }
    }
}

/// `<join_type> JOIN table AS alias ON parent = child`
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableAlias,
    /// Foreign key column on the already joined parent alias
    pub parent: QualifiedColumn,
    /// Primary key column on the joined alias
    pub child: QualifiedColumn,
}

/// Ordered list of selected columns, grouped per alias.
///
/// Row values come back in exactly this order, so `range(alias)` slices a flat
/// row into the column group of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnManifest {
    columns: Vec<QualifiedColumn>,
    groups: Vec<(String, Range<usize>)>,
}

impl ColumnManifest {
    /// Append every column of one alias, in table column order.
    pub fn push_alias(&mut self, alias: &str, columns: &[String]) {
        let start = self.columns.len();
        self.columns
            .extend(columns.iter().map(|c| QualifiedColumn::new(alias, c)));
        self.groups.push((alias.to_string(), start..self.columns.len()));
    }

    pub fn columns(&self) -> &[QualifiedColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn range(&self, alias: &str) -> Option<Range<usize>> {
        self.groups
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, r)| r.clone())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(a, _)| a.as_str())
    }

    /// Position of `alias.column` inside a row.
    pub fn position(&self, alias: &str, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.alias == alias && c.column == column)
    }
}

/// One abstract SELECT.
#[derive(Debug, Clone)]
pub struct Statement {
    pub root: TableAlias,
    pub joins: Vec<Join>,
    pub manifest: ColumnManifest,
    pub filter: Option<Filter<QualifiedColumn>>,
    pub order_by: Vec<(QualifiedColumn, Order)>,
    pub limit: Option<u64>,
}

impl Statement {
    pub fn new(root: TableAlias, manifest: ColumnManifest) -> Self {
        Self {
            root,
            joins: Vec::new(),
            manifest,
            filter: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Render through sea-query.
    pub fn to_select(&self) -> SelectStatement {
        let mut select = Query::select();
        for column in self.manifest.columns() {
            select.column(column.to_column_ref());
        }
        select.from_as(Name(self.root.table.clone()), Name(self.root.alias.clone()));
        for join in &self.joins {
            select.join_as(
                join.join_type,
                Name(join.table.table.clone()),
                Name(join.table.alias.clone()),
                join.parent.to_expr().eq(join.child.to_expr()),
            );
        }
        if let Some(filter) = &self.filter {
            select.cond_where(filter.to_condition());
        }
        for (column, order) in &self.order_by {
            select.order_by(column.to_column_ref(), order.clone());
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        select
    }

    /// PostgreSQL text with `$n` placeholders plus the values to bind.
    pub fn to_sql(&self) -> (String, Values) {
        self.to_select().build(PostgresQueryBuilder)
    }
}
