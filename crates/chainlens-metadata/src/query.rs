//! The attribute query engine.
//!
//! Translates user queries into parameterized SQL. Identifiers come from
//! the physical schema only — a user-supplied name is never more than a
//! lookup key — and every operand is bound, never spliced. Operand types
//! are validated against the physical column type; an override's `dataType`
//! is presentation-only and plays no part here.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::MetadataError;
use crate::schema::DataType;
use crate::service::MetadataService;
use crate::source::DataSource;

// ─── Query AST ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryOperator {
    Eq,
    In,
    Like,
    StartsWith,
    EndsWith,
    Lt,
    Gt,
    Between,
    IsNull,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub field: String,
    pub operation: QueryOperator,
    #[serde(default)]
    pub set: Vec<Value>,
    #[serde(default)]
    pub inverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOrdering {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub field: String,
    pub function: AggregationFunction,
}

/// A query against one entity, as posted to the data endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQuery {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub order_by: Vec<QueryOrdering>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub aggregation: Vec<Aggregation>,
}

// ─── Compiled statement ──────────────────────────────────────────────────────

/// A bound operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
    Decimal(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// A compiled, parameterized statement plus the typed projection needed to
/// decode its rows.
#[derive(Debug, Clone)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
    pub projection: Vec<(String, DataType)>,
    pub timeout: Duration,
}

/// Engine limits.
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    /// Limit applied when the query does not ask for one.
    pub default_rows: u32,
    /// Hard per-query row cap.
    pub max_rows: u32,
    /// Per-query execution deadline.
    pub timeout: Duration,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            default_rows: 100,
            max_rows: 10_000,
            timeout: Duration::from_secs(25),
        }
    }
}

// ─── The engine ──────────────────────────────────────────────────────────────

pub struct AttributeQueryEngine {
    service: Arc<MetadataService>,
    source: Arc<dyn DataSource>,
    policy: QueryPolicy,
}

impl AttributeQueryEngine {
    pub fn new(
        service: Arc<MetadataService>,
        source: Arc<dyn DataSource>,
        policy: QueryPolicy,
    ) -> Self {
        Self {
            service,
            source,
            policy,
        }
    }

    /// Compile and execute a query against one entity.
    pub async fn run(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
        query: &ApiQuery,
    ) -> Result<Vec<Map<String, Value>>, MetadataError> {
        let stmt = self.compile(platform, network, entity, query)?;
        self.source.select_rows(&stmt).await
    }

    /// Compile a query to a parameterized statement. Pure — no I/O.
    pub fn compile(
        &self,
        platform: &str,
        network: &str,
        entity: &str,
        query: &ApiQuery,
    ) -> Result<SqlStatement, MetadataError> {
        // Resolving the entity path enforces the visibility cascade; the
        // physical attribute list is the identifier whitelist.
        let physical = self.service.physical_entity(platform, network, entity)?;
        let visible: Vec<(&'static str, DataType)> = physical
            .attributes
            .iter()
            .filter(|a| {
                self.service
                    .resolve_attribute(platform, network, entity, a.name)
                    .is_ok()
            })
            .map(|a| (a.name, a.data_type))
            .collect();

        // A name with no physical column behind it is a validation error; a
        // real column hidden by an override reads as missing.
        let resolve = |field: &str| -> Result<(&'static str, DataType), MetadataError> {
            let attr = physical.attribute(field).ok_or_else(|| {
                MetadataError::QueryValidation(format!("unknown attribute '{field}'"))
            })?;
            if visible.iter().any(|(name, _)| *name == field) {
                Ok((attr.name, attr.data_type))
            } else {
                Err(MetadataError::NotFound)
            }
        };

        // Projection: requested fields, or every visible attribute.
        let plain_fields: Vec<(&'static str, DataType)> = if query.fields.is_empty() {
            visible.clone()
        } else {
            query
                .fields
                .iter()
                .map(|f| resolve(f))
                .collect::<Result<_, _>>()?
        };

        let mut select_exprs: Vec<String> = Vec::new();
        let mut projection: Vec<(String, DataType)> = Vec::new();
        let mut group_by: Vec<&'static str> = Vec::new();

        if query.aggregation.is_empty() {
            for (name, dt) in &plain_fields {
                select_exprs.push((*name).to_string());
                projection.push(((*name).to_string(), *dt));
            }
        } else {
            // Aggregated queries group by the non-aggregated fields.
            let aggregated: Vec<&str> =
                query.aggregation.iter().map(|a| a.field.as_str()).collect();
            for (name, dt) in &plain_fields {
                if aggregated.contains(name) {
                    continue;
                }
                select_exprs.push((*name).to_string());
                projection.push(((*name).to_string(), *dt));
                group_by.push(*name);
            }
            for agg in &query.aggregation {
                let (name, dt) = resolve(&agg.field)?;
                let (expr, out_type) = aggregate_expr(agg.function, name, dt)?;
                select_exprs.push(expr);
                projection.push((format!("{}_{}", function_name(agg.function), name), out_type));
            }
        }

        // Predicates.
        let mut binds: Vec<BindValue> = Vec::new();
        let mut where_clauses: Vec<String> = Vec::new();
        for predicate in &query.predicates {
            let (name, dt) = resolve(&predicate.field)?;
            let clause = compile_predicate(predicate, name, dt, &mut binds)?;
            where_clauses.push(clause);
        }

        // Ordering. Ordered columns must be part of the whitelist too.
        let mut order_exprs: Vec<String> = Vec::new();
        for ordering in &query.order_by {
            let (name, _) = resolve(&ordering.field)?;
            let dir = match ordering.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            order_exprs.push(format!("{name} {dir}"));
        }

        let limit = query
            .limit
            .unwrap_or(self.policy.default_rows)
            .min(self.policy.max_rows);

        // The table identifier comes from the physical description, not from
        // the request path.
        let mut sql = format!("SELECT {} FROM {}", select_exprs.join(", "), physical.name);
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }
        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if !order_exprs.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_exprs.join(", "));
        }
        sql.push_str(&format!(" LIMIT {limit}"));

        Ok(SqlStatement {
            sql,
            binds,
            projection,
            timeout: self.policy.timeout,
        })
    }
}

fn function_name(f: AggregationFunction) -> &'static str {
    match f {
        AggregationFunction::Count => "count",
        AggregationFunction::Sum => "sum",
        AggregationFunction::Avg => "avg",
        AggregationFunction::Min => "min",
        AggregationFunction::Max => "max",
    }
}

fn aggregate_expr(
    function: AggregationFunction,
    column: &str,
    dt: DataType,
) -> Result<(String, DataType), MetadataError> {
    match function {
        AggregationFunction::Count => Ok((format!("COUNT({column})"), DataType::Int)),
        AggregationFunction::Sum | AggregationFunction::Avg
            if !matches!(dt, DataType::Int | DataType::Decimal | DataType::Currency) =>
        {
            Err(MetadataError::QueryValidation(format!(
                "cannot aggregate non-numeric attribute '{column}'"
            )))
        }
        AggregationFunction::Sum => Ok((format!("SUM({column})"), dt)),
        AggregationFunction::Avg => Ok((format!("AVG({column})"), DataType::Decimal)),
        AggregationFunction::Min => Ok((format!("MIN({column})"), dt)),
        AggregationFunction::Max => Ok((format!("MAX({column})"), dt)),
    }
}

fn compile_predicate(
    predicate: &Predicate,
    column: &str,
    dt: DataType,
    binds: &mut Vec<BindValue>,
) -> Result<String, MetadataError> {
    use QueryOperator::*;

    let arity_err = |expected: &str| {
        MetadataError::QueryValidation(format!(
            "operator {:?} on '{column}' expects {expected} operand(s), got {}",
            predicate.operation,
            predicate.set.len()
        ))
    };

    let clause = match predicate.operation {
        IsNull => {
            if !predicate.set.is_empty() {
                return Err(arity_err("0"));
            }
            format!("{column} IS NULL")
        }
        Eq => {
            let [v] = predicate.set.as_slice() else {
                return Err(arity_err("1"));
            };
            binds.push(bind_value(v, dt, column)?);
            format!("{column} = ${}", binds.len())
        }
        In => {
            if predicate.set.is_empty() {
                return Err(arity_err("1+"));
            }
            let mut placeholders = Vec::with_capacity(predicate.set.len());
            for v in &predicate.set {
                binds.push(bind_value(v, dt, column)?);
                placeholders.push(format!("${}", binds.len()));
            }
            format!("{column} IN ({})", placeholders.join(", "))
        }
        Like | StartsWith | EndsWith => {
            if !dt.is_textual() {
                return Err(MetadataError::QueryValidation(format!(
                    "operator {:?} requires a textual attribute, '{column}' is {dt:?}",
                    predicate.operation
                )));
            }
            let [v] = predicate.set.as_slice() else {
                return Err(arity_err("1"));
            };
            let Value::String(s) = v else {
                return Err(type_err(column, dt, v));
            };
            let pattern = match predicate.operation {
                Like => format!("%{s}%"),
                StartsWith => format!("{s}%"),
                EndsWith => format!("%{s}"),
                _ => unreachable!(),
            };
            binds.push(BindValue::Text(pattern));
            format!("{column} LIKE ${}", binds.len())
        }
        Lt | Gt => {
            if !dt.is_ordered() {
                return Err(MetadataError::QueryValidation(format!(
                    "operator {:?} requires an ordered attribute, '{column}' is {dt:?}",
                    predicate.operation
                )));
            }
            let [v] = predicate.set.as_slice() else {
                return Err(arity_err("1"));
            };
            binds.push(bind_value(v, dt, column)?);
            let op = if predicate.operation == Lt { "<" } else { ">" };
            format!("{column} {op} ${}", binds.len())
        }
        Between => {
            if !dt.is_ordered() {
                return Err(MetadataError::QueryValidation(format!(
                    "operator Between requires an ordered attribute, '{column}' is {dt:?}"
                )));
            }
            let [low, high] = predicate.set.as_slice() else {
                return Err(arity_err("2"));
            };
            binds.push(bind_value(low, dt, column)?);
            let low_idx = binds.len();
            binds.push(bind_value(high, dt, column)?);
            format!("{column} BETWEEN ${low_idx} AND ${}", binds.len())
        }
    };

    Ok(if predicate.inverse {
        match predicate.operation {
            IsNull => format!("{column} IS NOT NULL"),
            _ => format!("NOT ({clause})"),
        }
    } else {
        clause
    })
}

fn type_err(column: &str, dt: DataType, got: &Value) -> MetadataError {
    MetadataError::QueryValidation(format!(
        "operand {got} does not match the {dt:?} type of '{column}'"
    ))
}

/// Convert a JSON operand into a typed bind, validating against the
/// physical data type.
fn bind_value(v: &Value, dt: DataType, column: &str) -> Result<BindValue, MetadataError> {
    match dt {
        DataType::Int | DataType::Currency => v
            .as_i64()
            .map(BindValue::Int)
            .ok_or_else(|| type_err(column, dt, v)),
        DataType::Decimal => v
            .as_f64()
            .map(BindValue::Decimal)
            .ok_or_else(|| type_err(column, dt, v)),
        DataType::Boolean => v
            .as_bool()
            .map(BindValue::Bool)
            .ok_or_else(|| type_err(column, dt, v)),
        DataType::DateTime => match v {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| BindValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| type_err(column, dt, v)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(BindValue::Timestamp)
                .ok_or_else(|| type_err(column, dt, v)),
            _ => Err(type_err(column, dt, v)),
        },
        DataType::String | DataType::Hash | DataType::AccountAddress => match v {
            Value::String(s) => Ok(BindValue::Text(s.clone())),
            _ => Err(type_err(column, dt, v)),
        },
    }
}
