//! In-memory relational store.
//!
//! `MockStore` evaluates [`Statement`]s directly against rows held in memory:
//! left joins on equality, the resolved filter with SQL three-valued logic,
//! ordering (NULLs last ascending, first descending), limit and manifest
//! projection. It lets the engine and its statement counts be exercised
//! without a database.

use crate::executor::{LifeError, LifeExecutor, Row};
use crate::prefetch::identity::is_null;
use crate::query::filter::{CompareOp, Filter};
use crate::query::statement::{QualifiedColumn, Statement};
use crate::schema::Schema;
use sea_query::{JoinType, Order, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::mem::discriminant;

pub struct MockStore<'s> {
    schema: &'s Schema,
    tables: HashMap<String, Vec<Vec<Value>>>,
    fail_next: RefCell<Option<String>>,
}

/// One candidate result row: the source row bound to each alias, `None` on an
/// outer-join miss.
type Bindings<'r> = HashMap<&'r str, Option<&'r [Value]>>;

impl<'s> MockStore<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            tables: HashMap::new(),
            fail_next: RefCell::new(None),
        }
    }

    /// Append a row, values in the entity's column order.
    pub fn insert(&mut self, table: &str, row: Vec<Value>) -> Result<(), LifeError> {
        let entity = self
            .schema
            .entity_by_table(table)
            .ok_or_else(|| LifeError::QueryError(format!("relation \"{table}\" does not exist")))?;
        let width = self.schema.entity(entity).columns.len();
        if row.len() != width {
            return Err(LifeError::QueryError(format!(
                "INSERT into \"{table}\" has {} values for {width} columns",
                row.len()
            )));
        }
        self.tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    /// Make the next statement fail with `LifeError::QueryError(message)`.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.borrow_mut() = Some(message.to_string());
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }

    fn rows(&self, table: &str) -> &[Vec<Value>] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    fn column_index(&self, table: &str, column: &str) -> Result<usize, LifeError> {
        self.schema
            .entity_by_table(table)
            .and_then(|e| self.schema.entity(e).column_index(column))
            .ok_or_else(|| LifeError::QueryError(format!("column \"{column}\" of \"{table}\" does not exist")))
    }

    fn evaluate(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        // alias -> table, for column lookups
        let mut tables: HashMap<&str, &str> = HashMap::new();
        tables.insert(&statement.root.alias, &statement.root.table);
        for join in &statement.joins {
            tables.insert(&join.table.alias, &join.table.table);
        }
        let lookup = |bindings: &Bindings<'_>, column: &QualifiedColumn| -> Result<Option<Value>, LifeError> {
            let table = tables
                .get(column.alias.as_str())
                .ok_or_else(|| LifeError::QueryError(format!("missing FROM-clause entry for \"{}\"", column.alias)))?;
            let index = self.column_index(table, &column.column)?;
            Ok(bindings
                .get(column.alias.as_str())
                .copied()
                .flatten()
                .map(|row| row[index].clone()))
        };

        let mut candidates: Vec<Bindings<'_>> = self
            .rows(&statement.root.table)
            .iter()
            .map(|row| {
                let mut bindings = Bindings::new();
                bindings.insert(statement.root.alias.as_str(), Some(row.as_slice()));
                bindings
            })
            .collect();

        for join in &statement.joins {
            let child_index = self.column_index(&join.table.table, &join.child.column)?;
            let mut joined = Vec::with_capacity(candidates.len());
            for mut bindings in candidates {
                let parent = lookup(&bindings, &join.parent)?;
                let matched = parent.filter(|v| !is_null(v)).and_then(|value| {
                    self.rows(&join.table.table)
                        .iter()
                        .find(|row| compare(&row[child_index], &value) == Some(Ordering::Equal))
                });
                if matched.is_none() && !matches!(join.join_type, JoinType::LeftJoin) {
                    continue;
                }
                bindings.insert(join.table.alias.as_str(), matched.map(Vec::as_slice));
                joined.push(bindings);
            }
            candidates = joined;
        }

        if let Some(filter) = &statement.filter {
            let mut kept = Vec::with_capacity(candidates.len());
            for bindings in candidates {
                if eval(filter, &mut |c| lookup(&bindings, c))? == Some(true) {
                    kept.push(bindings);
                }
            }
            candidates = kept;
        }

        if !statement.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(candidates.len());
            for bindings in candidates {
                let mut keys = Vec::with_capacity(statement.order_by.len());
                for (column, _) in &statement.order_by {
                    keys.push(lookup(&bindings, column)?.filter(|v| !is_null(v)));
                }
                keyed.push((keys, bindings));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                statement
                    .order_by
                    .iter()
                    .zip(a.iter().zip(b))
                    .map(|((_, order), (x, y))| order_values(x.as_ref(), y.as_ref(), order))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            candidates = keyed.into_iter().map(|(_, bindings)| bindings).collect();
        }

        if let Some(limit) = statement.limit {
            candidates.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        candidates
            .iter()
            .map(|bindings| {
                statement
                    .manifest
                    .columns()
                    .iter()
                    .map(|c| Ok(lookup(bindings, c)?.unwrap_or(Value::Int(None))))
                    .collect::<Result<Vec<_>, LifeError>>()
                    .map(Row::new)
            })
            .collect()
    }
}

impl LifeExecutor for MockStore<'_> {
    fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, LifeError> {
        if let Some(message) = self.fail_next.borrow_mut().take() {
            return Err(LifeError::QueryError(message));
        }
        self.evaluate(statement)
    }
}

/// Three-valued evaluation: `None` is SQL UNKNOWN.
fn eval<F>(filter: &Filter<QualifiedColumn>, lookup: &mut F) -> Result<Option<bool>, LifeError>
where
    F: FnMut(&QualifiedColumn) -> Result<Option<Value>, LifeError>,
{
    Ok(match filter {
        Filter::Compare(column, op, value) => {
            let current = lookup(column)?;
            if let Some(stored) = &current {
                check_param(column, stored, value)?;
            }
            current.as_ref().and_then(|v| compare(v, value)).map(|ord| match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
            })
        }
        Filter::In(column, values) => {
            let current = lookup(column)?;
            if let Some(stored) = &current {
                for value in values {
                    check_param(column, stored, value)?;
                }
            }
            match current.filter(|v| !is_null(v)) {
                None => None,
                Some(v) => {
                    let results: Vec<Option<Ordering>> = values.iter().map(|x| compare(&v, x)).collect();
                    if results.contains(&Some(Ordering::Equal)) {
                        Some(true)
                    } else if results.contains(&None) {
                        None
                    } else {
                        Some(false)
                    }
                }
            }
        }
        Filter::IsNull(column) => Some(lookup(column)?.map_or(true, |v| is_null(&v))),
        Filter::IsNotNull(column) => Some(lookup(column)?.is_some_and(|v| !is_null(&v))),
        Filter::And(parts) => {
            let mut result = Some(true);
            for part in parts {
                match eval(part, lookup)? {
                    Some(false) => return Ok(Some(false)),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Filter::Or(parts) => {
            let mut result = Some(false);
            for part in parts {
                match eval(part, lookup)? {
                    Some(true) => return Ok(Some(true)),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Filter::Not(inner) => eval(inner, lookup)?.map(|b| !b),
    })
}

/// Bound parameters must have the column's own type, as the PostgreSQL driver
/// refuses an `i64` for an `int4` column. NULLs carry no reliable type here.
fn check_param(column: &QualifiedColumn, stored: &Value, param: &Value) -> Result<(), LifeError> {
    if is_null(stored) || is_null(param) || discriminant(stored) == discriminant(param) {
        return Ok(());
    }
    Err(LifeError::QueryError(format!(
        "error serializing parameter for \"{}\".\"{}\": {} does not accept {}",
        column.alias,
        column.column,
        type_name(stored),
        type_name(param)
    )))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::TinyInt(_) | Value::TinyUnsigned(_) | Value::SmallInt(_) => "int2",
        Value::Int(_) | Value::SmallUnsigned(_) => "int4",
        Value::BigInt(_) | Value::Unsigned(_) | Value::BigUnsigned(_) => "int8",
        Value::Float(_) => "float4",
        Value::Double(_) => "float8",
        Value::String(_) | Value::Char(_) => "text",
        Value::Bytes(_) => "bytea",
        _ => "unknown",
    }
}

/// Comparable view of a non-NULL scalar.
enum Scalar<'v> {
    Int(i128),
    Float(f64),
    Text(&'v str),
    Bool(bool),
    Bytes(&'v [u8]),
}

fn scalar(value: &Value) -> Option<Scalar<'_>> {
    Some(match value {
        Value::TinyInt(Some(i)) => Scalar::Int(i128::from(*i)),
        Value::SmallInt(Some(i)) => Scalar::Int(i128::from(*i)),
        Value::Int(Some(i)) => Scalar::Int(i128::from(*i)),
        Value::BigInt(Some(i)) => Scalar::Int(i128::from(*i)),
        Value::TinyUnsigned(Some(u)) => Scalar::Int(i128::from(*u)),
        Value::SmallUnsigned(Some(u)) => Scalar::Int(i128::from(*u)),
        Value::Unsigned(Some(u)) => Scalar::Int(i128::from(*u)),
        Value::BigUnsigned(Some(u)) => Scalar::Int(i128::from(*u)),
        Value::Float(Some(f)) => Scalar::Float(f64::from(*f)),
        Value::Double(Some(f)) => Scalar::Float(*f),
        Value::String(Some(s)) => Scalar::Text(s.as_str()),
        Value::Bool(Some(b)) => Scalar::Bool(*b),
        Value::Bytes(Some(b)) => Scalar::Bytes(b.as_slice()),
        _ => return None,
    })
}

/// `None` when either side is NULL or the types are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (scalar(a)?, scalar(b)?) {
        (Scalar::Int(x), Scalar::Int(y)) => Some(x.cmp(&y)),
        (Scalar::Float(x), Scalar::Float(y)) => x.partial_cmp(&y),
        (Scalar::Int(x), Scalar::Float(y)) => (x as f64).partial_cmp(&y),
        (Scalar::Float(x), Scalar::Int(y)) => x.partial_cmp(&(y as f64)),
        (Scalar::Text(x), Scalar::Text(y)) => Some(x.cmp(y)),
        (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(&y)),
        (Scalar::Bytes(x), Scalar::Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn order_values(a: Option<&Value>, b: Option<&Value>, order: &Order) -> Ordering {
    let descending = matches!(order, Order::Desc);
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) if descending => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) if descending => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = compare(x, y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}
