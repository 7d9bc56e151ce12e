//! Filter expression tree.
//!
//! Filters name columns through a [`ColumnRef`]: either the query's root entity
//! or a handle (a table name or an explicit join alias). The assembler resolves
//! every handle to a concrete alias before a statement is built, which is where
//! ambiguous table references are rejected.

use super::statement::QualifiedColumn;
use sea_query::{Condition, Expr, ExprTrait, Value};

/// Which joined table a column belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// The statement's root entity
    Root,
    /// A table name or a join alias
    Named(String),
}

/// Unresolved column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub source: Source,
    pub column: String,
}

/// Column of the query's root entity.
pub fn root(column: &str) -> ColumnRef {
    ColumnRef {
        source: Source::Root,
        column: column.to_string(),
    }
}

/// Column of a joined table, addressed by table name or alias.
pub fn col(handle: &str, column: &str) -> ColumnRef {
    ColumnRef {
        source: Source::Named(handle.to_string()),
        column: column.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Boolean filter over columns of type `C`.
///
/// `Filter` (over [`ColumnRef`]) is what callers build; the assembler turns it
/// into `Filter<QualifiedColumn>`, which is what statements carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter<C = ColumnRef> {
    Compare(C, CompareOp, Value),
    In(C, Vec<Value>),
    IsNull(C),
    IsNotNull(C),
    And(Vec<Filter<C>>),
    Or(Vec<Filter<C>>),
    Not(Box<Filter<C>>),
}

impl ColumnRef {
    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Eq, value.into())
    }

    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Ne, value.into())
    }

    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Lt, value.into())
    }

    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Lte, value.into())
    }

    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Gt, value.into())
    }

    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Compare(self, CompareOp::Gte, value.into())
    }

    pub fn is_in<V, I>(self, values: I) -> Filter
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Filter::In(self, values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull(self)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self)
    }
}

impl<C> Filter<C> {
    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Filter<C>) -> Filter<C> {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Filter<C>) -> Filter<C> {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Filter<C> {
        Filter::Not(Box::new(self))
    }

    /// Every column the filter touches, in tree order.
    pub fn columns(&self) -> Vec<&C> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a C>) {
        match self {
            Filter::Compare(c, _, _) | Filter::In(c, _) | Filter::IsNull(c) | Filter::IsNotNull(c) => {
                out.push(c)
            }
            Filter::And(parts) | Filter::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
            Filter::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Rebuild the tree with every column mapped through `f`.
    pub fn try_map<D, E, F>(&self, f: &mut F) -> Result<Filter<D>, E>
    where
        F: FnMut(&C) -> Result<D, E>,
        C: Clone,
    {
        Ok(match self {
            Filter::Compare(c, op, v) => Filter::Compare(f(c)?, *op, v.clone()),
            Filter::In(c, vs) => Filter::In(f(c)?, vs.clone()),
            Filter::IsNull(c) => Filter::IsNull(f(c)?),
            Filter::IsNotNull(c) => Filter::IsNotNull(f(c)?),
            Filter::And(parts) => Filter::And(
                parts
                    .iter()
                    .map(|p| p.try_map(f))
                    .collect::<Result<Vec<_>, E>>()?,
            ),
            Filter::Or(parts) => Filter::Or(
                parts
                    .iter()
                    .map(|p| p.try_map(f))
                    .collect::<Result<Vec<_>, E>>()?,
            ),
            Filter::Not(inner) => Filter::Not(Box::new(inner.try_map(f)?)),
        })
    }
}

impl Filter {
    /// Table/alias handles referenced by the filter; `Source::Root` is skipped.
    pub fn references(&self) -> Vec<&str> {
        let mut handles: Vec<&str> = Vec::new();
        for column in self.columns() {
            if let Source::Named(handle) = &column.source {
                if !handles.contains(&handle.as_str()) {
                    handles.push(handle);
                }
            }
        }
        handles
    }
}

impl Filter<QualifiedColumn> {
    /// Render into a sea-query condition.
    pub fn to_condition(&self) -> Condition {
        match self {
            Filter::Compare(c, op, v) => {
                let column = c.to_expr();
                let value = v.clone();
                let expr = match op {
                    CompareOp::Eq => column.eq(value),
                    CompareOp::Ne => column.ne(value),
                    CompareOp::Lt => column.lt(value),
                    CompareOp::Lte => column.lte(value),
                    CompareOp::Gt => column.gt(value),
                    CompareOp::Gte => column.gte(value),
                };
                Condition::all().add(expr)
            }
            Filter::In(c, values) => Condition::all().add(c.to_expr().is_in(values.clone())),
            Filter::IsNull(c) => Condition::all().add(c.to_expr().is_null()),
            Filter::IsNotNull(c) => Condition::all().add(c.to_expr().is_not_null()),
            Filter::And(parts) => parts
                .iter()
                .fold(Condition::all(), |cond, p| cond.add(p.to_condition())),
            Filter::Or(parts) => parts
                .iter()
                .fold(Condition::any(), |cond, p| cond.add(p.to_condition())),
            Filter::Not(inner) => inner.to_condition().not(),
        }
    }
}

impl QualifiedColumn {
    pub(crate) fn to_expr(&self) -> Expr {
        Expr::col(self.to_column_ref())
    }
}
