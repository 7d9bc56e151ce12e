//! Conversions between sea-query values and `may_postgres` parameters/rows.

use crate::executor::{LifeError, Row};
use may_postgres::types::{ToSql, Type};
use sea_query::{Value, Values};

/// Convert sea-query values to `ToSql` parameters and run `f` with them.
///
/// The boxed parameters live for the duration of the closure.
///
/// # Errors
///
/// Returns `LifeError::ParseError` for value types PostgreSQL parameters are
/// not produced for here, or an unsigned value beyond `i64::MAX`.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, LifeError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, LifeError>,
{
    let boxed = values
        .iter()
        .map(to_sql)
        .collect::<Result<Vec<Box<dyn ToSql>>, LifeError>>()?;
    let params: Vec<&dyn ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
    f(&params)
}

fn to_sql(value: &Value) -> Result<Box<dyn ToSql>, LifeError> {
    let boxed: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = v
                .map(|u| {
                    i64::try_from(u).map_err(|_| {
                        LifeError::ParseError(format!("unsigned value {u} exceeds i64::MAX"))
                    })
                })
                .transpose()?;
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Json(v) => Box::new(
            v.as_ref()
                .map(|j| serde_json::to_string(j))
                .transpose()
                .map_err(|e| LifeError::ParseError(format!("failed to serialize JSON: {e}")))?,
        ),
        other => {
            return Err(LifeError::ParseError(format!(
                "unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(boxed)
}

/// Decode a row by PostgreSQL column type into sea-query values.
///
/// # Errors
///
/// Returns `LifeError::ParseError` for column types the engine does not hydrate.
pub fn decode_row(row: &may_postgres::Row) -> Result<Row, LifeError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            Value::Bool(row.try_get(index)?)
        } else if *ty == Type::INT2 {
            Value::SmallInt(row.try_get(index)?)
        } else if *ty == Type::INT4 {
            Value::Int(row.try_get(index)?)
        } else if *ty == Type::INT8 {
            Value::BigInt(row.try_get(index)?)
        } else if *ty == Type::FLOAT4 {
            Value::Float(row.try_get(index)?)
        } else if *ty == Type::FLOAT8 {
            Value::Double(row.try_get(index)?)
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
            Value::String(row.try_get(index)?)
        } else if *ty == Type::BYTEA {
            Value::Bytes(row.try_get(index)?)
        } else {
            return Err(LifeError::ParseError(format!(
                "column `{}` has unsupported type {ty}",
                column.name()
            )));
        };
        values.push(value);
    }
    Ok(Row::new(values))
}
