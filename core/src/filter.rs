//! Query filter language shared by the server and the client.
//!
//! # Design
//! Filters travel as JSON strings in the `filter` and `where` query
//! parameters. A `Where` is an object whose keys are ANDed together:
//!
//! ```json
//! {"status": "ACTIVE", "id": {"gt": 3}, "or": [{"title": {"like": "%milk%"}}]}
//! ```
//!
//! Parsing only checks structure. Property names and operand shapes depend
//! on the target model and are checked by `validate::<M>()`, which storage
//! backends call before evaluating or translating a clause.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::Model;

/// A malformed or unsupported filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter: {0}")]
pub struct FilterError(pub String);

/// Comparison operator of a property condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Inq,
    Nin,
    Between,
    Like,
    Nlike,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Inq => "inq",
            Operator::Nin => "nin",
            Operator::Between => "between",
            Operator::Like => "like",
            Operator::Nlike => "nlike",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "inq" => Operator::Inq,
            "nin" => Operator::Nin,
            "between" => Operator::Between,
            "like" => Operator::Like,
            "nlike" => Operator::Nlike,
            _ => return None,
        };
        Some(op)
    }
}

/// One conjunct of a `Where`.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Property {
        name: String,
        op: Operator,
        operand: Value,
    },
    And(Vec<Where>),
    Or(Vec<Where>),
}

impl Clause {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Clause::Property { name, op, operand } => {
                compare(row.get(name).unwrap_or(&Value::Null), *op, operand)
            }
            Clause::And(wheres) => wheres.iter().all(|w| w.matches(row)),
            Clause::Or(wheres) => wheres.iter().any(|w| w.matches(row)),
        }
    }
}

/// A conjunction of clauses. The empty `Where` matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Where {
    clauses: Vec<Clause>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(self, name: impl Into<String>, operand: impl Into<Value>) -> Self {
        self.op(name, Operator::Eq, operand)
    }

    pub fn op(mut self, name: impl Into<String>, op: Operator, operand: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Property {
            name: name.into(),
            op,
            operand: operand.into(),
        });
        self
    }

    pub fn and(mut self, wheres: Vec<Where>) -> Self {
        self.clauses.push(Clause::And(wheres));
        self
    }

    pub fn or(mut self, wheres: Vec<Where>) -> Self {
        self.clauses.push(Clause::Or(wheres));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Drop every top-level condition on `name` and require equality with
    /// `operand` instead. Nested `and`/`or` groups are left untouched.
    pub fn replace_eq(&mut self, name: &str, operand: impl Into<Value>) {
        self.clauses
            .retain(|c| !matches!(c, Clause::Property { name: n, .. } if n == name));
        self.clauses.push(Clause::Property {
            name: name.to_string(),
            op: Operator::Eq,
            operand: operand.into(),
        });
    }

    /// Check property names against `M` and operand shapes against operators.
    pub fn validate<M: Model>(&self) -> Result<(), FilterError> {
        for clause in &self.clauses {
            match clause {
                Clause::Property { name, op, operand } => {
                    check_property::<M>(name)?;
                    check_operand(name, *op, operand)?;
                }
                Clause::And(wheres) | Clause::Or(wheres) => {
                    for w in wheres {
                        w.validate::<M>()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate against a row serialized with its wire property names.
    /// Absent properties compare as `null`.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses.iter().all(|c| c.matches(row))
    }
}

impl TryFrom<Value> for Where {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(FilterError("`where` must be an object".to_string()));
        };

        let mut clauses = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "and" | "or" => {
                    let Value::Array(list) = value else {
                        return Err(FilterError(format!("`{key}` expects an array of conditions")));
                    };
                    let wheres = list
                        .into_iter()
                        .map(Where::try_from)
                        .collect::<Result<Vec<_>, _>>()?;
                    clauses.push(if key == "and" {
                        Clause::And(wheres)
                    } else {
                        Clause::Or(wheres)
                    });
                }
                _ => match value {
                    Value::Object(ops) => {
                        if ops.is_empty() {
                            return Err(FilterError(format!("empty condition on `{key}`")));
                        }
                        for (op, operand) in ops {
                            let op = Operator::parse(&op).ok_or_else(|| {
                                FilterError(format!("unknown operator `{op}` on `{key}`"))
                            })?;
                            clauses.push(Clause::Property {
                                name: key.clone(),
                                op,
                                operand,
                            });
                        }
                    }
                    operand => clauses.push(Clause::Property {
                        name: key,
                        op: Operator::Eq,
                        operand,
                    }),
                },
            }
        }
        Ok(Where { clauses })
    }
}

impl From<Where> for Value {
    fn from(w: Where) -> Self {
        let mut map = Map::new();
        for clause in w.clauses {
            match clause {
                Clause::Property {
                    name,
                    op: Operator::Eq,
                    operand,
                } if !operand.is_object() && !map.contains_key(&name) => {
                    map.insert(name, operand);
                }
                Clause::Property { name, op, operand } => {
                    let entry = map.entry(name).or_insert_with(|| Value::Object(Map::new()));
                    if !entry.is_object() {
                        let eq = entry.take();
                        *entry = serde_json::json!({ "eq": eq });
                    }
                    if let Value::Object(ops) = entry {
                        ops.insert(op.as_str().to_string(), operand);
                    }
                }
                Clause::And(wheres) => append_group(&mut map, "and", wheres),
                Clause::Or(wheres) => append_group(&mut map, "or", wheres),
            }
        }
        Value::Object(map)
    }
}

fn append_group(map: &mut Map<String, Value>, key: &str, wheres: Vec<Where>) {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = entry {
        list.extend(wheres.into_iter().map(Value::from));
    }
}

fn check_property<M: Model>(name: &str) -> Result<(), FilterError> {
    if M::PROPERTIES.contains(&name) {
        Ok(())
    } else {
        Err(FilterError(format!("unknown property `{name}` on model {}", M::NAME)))
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn check_operand(name: &str, op: Operator, operand: &Value) -> Result<(), FilterError> {
    let ok = match op {
        // Null members are invalid: SQL `IN (NULL)` never matches.
        Operator::Inq | Operator::Nin => operand
            .as_array()
            .is_some_and(|xs| xs.iter().all(|x| is_scalar(x) && !x.is_null())),
        Operator::Between => operand
            .as_array()
            .is_some_and(|xs| xs.len() == 2 && xs.iter().all(|x| is_scalar(x) && !x.is_null())),
        Operator::Like | Operator::Nlike => operand.is_string(),
        _ => is_scalar(operand),
    };
    if ok {
        Ok(())
    } else {
        Err(FilterError(format!(
            "invalid operand for `{}` on `{name}`",
            op.as_str()
        )))
    }
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn partial_order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// Null-rejecting comparisons follow SQL: `x != 'a'` and `x NOT IN (..)` are
// false when `x` is NULL.
fn compare(field: &Value, op: Operator, operand: &Value) -> bool {
    use Ordering::{Equal, Greater, Less};

    match op {
        Operator::Eq => values_eq(field, operand),
        Operator::Neq => !field.is_null() && (operand.is_null() || !values_eq(field, operand)),
        Operator::Gt => matches!(partial_order(field, operand), Some(Greater)),
        Operator::Gte => matches!(partial_order(field, operand), Some(Greater | Equal)),
        Operator::Lt => matches!(partial_order(field, operand), Some(Less)),
        Operator::Lte => matches!(partial_order(field, operand), Some(Less | Equal)),
        Operator::Inq => operand
            .as_array()
            .is_some_and(|xs| xs.iter().any(|x| values_eq(field, x))),
        Operator::Nin => {
            !field.is_null()
                && operand
                    .as_array()
                    .is_some_and(|xs| !xs.iter().any(|x| values_eq(field, x)))
        }
        Operator::Between => match operand.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                matches!(partial_order(field, low), Some(Greater | Equal))
                    && matches!(partial_order(field, high), Some(Less | Equal))
            }
            _ => false,
        },
        Operator::Like => match (field.as_str(), operand.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        Operator::Nlike => match (field.as_str(), operand.as_str()) {
            (Some(text), Some(pattern)) => !like(text, pattern),
            _ => false,
        },
    }
}

/// SQL `LIKE` with `%` and `_` wildcards, ASCII case-insensitive.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A single `"property ASC|DESC"` sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub property: String,
    pub direction: Direction,
}

impl FromStr for OrderBy {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let property = parts
            .next()
            .ok_or_else(|| FilterError("empty order clause".to_string()))?;
        let direction = match parts.next() {
            None => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => Direction::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
            Some(d) => return Err(FilterError(format!("unknown sort direction `{d}`"))),
        };
        if parts.next().is_some() {
            return Err(FilterError(format!("malformed order clause `{s}`")));
        }
        Ok(OrderBy {
            property: property.to_string(),
            direction,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        write!(f, "{} {dir}", self.property)
    }
}

/// Sort keys, most significant first. Accepts a string or an array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Order(pub Vec<OrderBy>);

impl Order {
    /// Compare two serialized rows. `null` sorts before any value.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.0 {
            let left = a.get(&key.property).unwrap_or(&Value::Null);
            let right = b.get(&key.property).unwrap_or(&Value::Null);
            let ord = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => partial_order(left, right).unwrap_or(Ordering::Equal),
            };
            let ord = match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl TryFrom<Value> for Order {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Order(vec![s.parse()?])),
            Value::Array(list) => list
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s.parse(),
                    _ => Err(FilterError("`order` entries must be strings".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Order),
            _ => Err(FilterError("`order` must be a string or an array".to_string())),
        }
    }
}

impl From<Order> for Value {
    fn from(order: Order) -> Self {
        let mut keys: Vec<Value> = order.0.iter().map(|k| Value::String(k.to_string())).collect();
        if keys.len() == 1 {
            keys.remove(0)
        } else {
            Value::Array(keys)
        }
    }
}

/// Property projection.
///
/// `{"title": true}` keeps only the properties set to `true`,
/// `{"subtitle": false}` drops the properties set to `false`, and
/// `["id", "title"]` is shorthand for the first form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Fields(pub Vec<(String, bool)>);

impl Fields {
    pub fn validate<M: Model>(&self) -> Result<(), FilterError> {
        for (name, _) in &self.0 {
            check_property::<M>(name)?;
        }
        Ok(())
    }

    pub fn keeps(&self, property: &str) -> bool {
        if self.0.iter().any(|(_, on)| *on) {
            self.0.iter().any(|(name, on)| *on && name == property)
        } else {
            !self.0.iter().any(|(name, _)| name == property)
        }
    }

    /// Drop the properties of `M` this projection does not keep. Other keys,
    /// such as included relations, stay.
    pub fn project<M: Model>(&self, row: &mut Value) {
        if let Value::Object(map) = row {
            map.retain(|key, _| !M::PROPERTIES.contains(&key.as_str()) || self.keeps(key));
        }
    }
}

impl TryFrom<Value> for Fields {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(name, on)| match on {
                    Value::Bool(on) => Ok((name, on)),
                    _ => Err(FilterError(format!("`fields.{name}` must be a boolean"))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Fields),
            Value::Array(list) => list
                .into_iter()
                .map(|v| match v {
                    Value::String(name) => Ok((name, true)),
                    _ => Err(FilterError("`fields` entries must be strings".to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Fields),
            _ => Err(FilterError("`fields` must be an object or an array".to_string())),
        }
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Object(
            fields
                .0
                .into_iter()
                .map(|(name, on)| (name, Value::Bool(on)))
                .collect(),
        )
    }
}

/// Query filter for list endpoints.
///
/// `include` is accepted for compatibility and otherwise ignored: the
/// server decides which relations are loaded. When both `skip` and
/// `offset` are given, `skip` wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Where>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
}

impl Filter {
    /// Rows to skip: `skip`, else `offset`.
    pub fn start(&self) -> Option<u64> {
        self.skip.or(self.offset)
    }

    pub fn validate<M: Model>(&self) -> Result<(), FilterError> {
        if let Some(w) = &self.r#where {
            w.validate::<M>()?;
        }
        if let Some(fields) = &self.fields {
            fields.validate::<M>()?;
        }
        if let Some(order) = &self.order {
            for key in &order.0 {
                check_property::<M>(&key.property)?;
            }
        }
        Ok(())
    }
}
