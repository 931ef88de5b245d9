//! Document Types
//!
//! Wire-level vocabulary of the remote document service: documents, field
//! updates and collection queries. These types are shared by every
//! `DocumentStore` implementation.

use crate::shared::error::RemoteError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Document body, a JSON object
pub type Document = Map<String, Value>;

/// Field updates applied by `update_document`, keyed by field name
pub type FieldUpdates = BTreeMap<String, FieldUpdate>;

/// A document together with its id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decode into a model type. The document id is injected as `id`
    /// unless the body already carries one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RemoteError> {
        let mut body = self.data.clone();
        body.entry("id".to_string())
            .or_insert_with(|| Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(body)).map_err(|e| {
            RemoteError::unknown(format!("malformed document {}: {}", self.id, e))
        })
    }
}

/// Serialize a model into a document body
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, RemoteError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RemoteError::unknown(format!(
            "expected an object document, got {}",
            other
        ))),
        Err(e) => Err(RemoteError::unknown(format!("serialization error: {}", e))),
    }
}

/// A single field mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate {
    /// Overwrite the field
    Set(Value),
    /// Add to a numeric field (missing counts as 0)
    Increment(i64),
    /// Append elements not already present
    ArrayUnion(Vec<Value>),
    /// Remove every element equal to one of the given values
    ArrayRemove(Vec<Value>),
    /// Set to the service's current time
    ServerTimestamp,
    /// Remove the field
    Delete,
}

/// Comparison used by a query filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    ArrayContains,
    In,
    NotIn,
}

/// Query filter on a single field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Whether `document` satisfies the filter
    pub fn matches(&self, document: &Document) -> bool {
        let field = document.get(&self.field);
        match self.op {
            FilterOp::Eq => field == Some(&self.value),
            FilterOp::NotEq => field.is_some_and(|v| v != &self.value),
            FilterOp::Lt => compare(field, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => field
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(&self.value)),
            FilterOp::In => self
                .value
                .as_array()
                .is_some_and(|candidates| field.is_some_and(|v| candidates.contains(v))),
            FilterOp::NotIn => self
                .value
                .as_array()
                .is_some_and(|candidates| field.is_some_and(|v| !candidates.contains(v))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering clause of a query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Collection query: filters, optional ordering and limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the query against an in-memory set of documents
    pub fn apply<'a, I>(&self, documents: I) -> Vec<DocumentSnapshot>
    where
        I: IntoIterator<Item = (&'a String, &'a Document)>,
    {
        let mut results: Vec<DocumentSnapshot> = documents
            .into_iter()
            .filter(|(_, doc)| self.filters.iter().all(|f| f.matches(doc)))
            .map(|(id, doc)| DocumentSnapshot::new(id.clone(), doc.clone()))
            .collect();

        if let Some(order) = &self.order_by {
            results.sort_by(|a, b| {
                let ord = compare(a.data.get(&order.field), b.data.get(&order.field).unwrap_or(&Value::Null))
                    .unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

/// Order two JSON scalars of the same type. RFC 3339 timestamps compare
/// correctly as strings when they share a timezone suffix.
fn compare(left: Option<&Value>, right: &Value) -> Option<Ordering> {
    match (left?, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Apply `updates` to `document` in place. `now` is used for server timestamps.
pub fn apply_updates(document: &mut Document, updates: &FieldUpdates, now: &str) {
    for (field, update) in updates {
        match update {
            FieldUpdate::Set(value) => {
                document.insert(field.clone(), value.clone());
            }
            FieldUpdate::Increment(delta) => {
                let current = document.get(field).and_then(Value::as_i64).unwrap_or(0);
                document.insert(field.clone(), Value::from(current + delta));
            }
            FieldUpdate::ArrayUnion(values) => {
                let entry = document
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry {
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                }
            }
            FieldUpdate::ArrayRemove(values) => {
                if let Some(Value::Array(items)) = document.get_mut(field) {
                    items.retain(|item| !values.contains(item));
                }
            }
            FieldUpdate::ServerTimestamp => {
                document.insert(field.clone(), Value::String(now.to_string()));
            }
            FieldUpdate::Delete => {
                document.remove(field);
            }
        }
    }
}
