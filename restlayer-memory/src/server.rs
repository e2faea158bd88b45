//! In-memory transport implementation.
//!
//! [`MemoryServer`] behaves like the remote store behind the [`Transport`]
//! boundary: it routes the layer's create/update/delete/fetch/query requests
//! against RwLock-guarded maps, mints object identifiers and timestamps,
//! interprets atomic operation hashes server-side, and maintains relation
//! join tables. It exists for tests and local development, not as a storage
//! engine.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use mea::rwlock::RwLock;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use restlayer_core::{
    error::RecordLayerResult,
    op::Operation,
    transport::{Method, Response, Transport},
};

use crate::evaluator::{Comparable, FilterEvaluator};

type RecordMap = HashMap<String, Map<String, Value>>;
type ClassMap = HashMap<String, RecordMap>;
/// Join table key: (owner class, owner id, relation field).
type JoinKey = (String, String, String);
type JoinMap = HashMap<JoinKey, Vec<Value>>;

/// Thread-safe in-memory stand-in for the remote store.
///
/// `MemoryServer` is cloneable and uses `Arc`-wrapped internal state, so
/// clones share the same data across async tasks. Queries scan every record
/// in a class; fine for test-sized datasets.
#[derive(Default, Clone, Debug)]
pub struct MemoryServer {
    /// Stored bodies: class name -> (object id -> body)
    records: Arc<RwLock<ClassMap>>,
    /// Relation join tables keyed by owner and field
    relations: Arc<RwLock<JoinMap>>,
}

impl MemoryServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(ClassMap::new())),
            relations: Arc::new(RwLock::new(JoinMap::new())),
        }
    }

    /// Creates a builder for constructing a `MemoryServer`.
    pub fn builder() -> MemoryServerBuilder {
        MemoryServerBuilder::default()
    }

    /// Test hook: the stored body for a record, if present.
    pub async fn stored(&self, class_name: &str, object_id: &str) -> Option<Value> {
        self.records
            .read()
            .await
            .get(class_name)
            .and_then(|records| records.get(object_id))
            .map(|body| Value::Object(body.clone()))
    }

    /// Test hook: the join-table members of a relation field.
    pub async fn relation_members(
        &self,
        class_name: &str,
        object_id: &str,
        field: &str,
    ) -> Vec<Value> {
        self.relations
            .read()
            .await
            .get(&(
                class_name.to_string(),
                object_id.to_string(),
                field.to_string(),
            ))
            .cloned()
            .unwrap_or_default()
    }

    async fn create(&self, class_name: &str, body: Option<Value>) -> Response {
        let object_id = mint_object_id();
        let now = now_iso();

        let mut stored = Map::new();
        if let Some(Value::Object(incoming)) = body {
            let mut relations = self.relations.write().await;
            apply_fields(&mut stored, incoming, class_name, &object_id, &mut relations);
        }
        stored.insert("objectId".to_string(), json!(object_id));
        stored.insert("createdAt".to_string(), date_hash(&now));
        stored.insert("updatedAt".to_string(), date_hash(&now));

        self.records
            .write()
            .await
            .entry(class_name.to_string())
            .or_default()
            .insert(object_id.clone(), stored);

        Response {
            success: true,
            http_status: 201,
            error: None,
            result: json!({ "objectId": object_id, "createdAt": now }),
        }
    }

    async fn update(&self, class_name: &str, object_id: &str, body: Option<Value>) -> Response {
        let mut records = self.records.write().await;
        let Some(stored) = records
            .get_mut(class_name)
            .and_then(|records| records.get_mut(object_id))
        else {
            return Response::failure(404, "object not found");
        };

        let mut result = Map::new();
        if let Some(Value::Object(incoming)) = body {
            let mut relations = self.relations.write().await;
            let resolved = apply_fields(stored, incoming, class_name, object_id, &mut relations);
            // The live server echoes the post-operation value of fields
            // updated through atomic operations.
            for (field, value) in resolved {
                result.insert(field, value);
            }
        }

        let now = now_iso();
        stored.insert("updatedAt".to_string(), date_hash(&now));
        result.insert("updatedAt".to_string(), json!(now));

        Response::ok(Value::Object(result))
    }

    async fn fetch(&self, class_name: &str, object_id: &str) -> Response {
        match self.stored(class_name, object_id).await {
            Some(body) => Response::ok(body),
            None => Response::failure(404, "object not found"),
        }
    }

    async fn delete(&self, class_name: &str, object_id: &str) -> Response {
        let removed = self
            .records
            .write()
            .await
            .get_mut(class_name)
            .and_then(|records| records.remove(object_id));
        if removed.is_none() {
            return Response::failure(404, "object not found");
        }

        // Drop the deleted record's own join tables.
        self.relations
            .write()
            .await
            .retain(|(class, id, _), _| !(class == class_name && id == object_id));

        Response::ok(json!({}))
    }

    async fn query(&self, class_name: &str, params: Option<Value>) -> Response {
        let params = match params {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let records = self.records.read().await;
        let relations = self.relations.read().await;
        let lookup = |class: &str, id: &str, field: &str| -> Vec<Value> {
            relations
                .get(&(class.to_string(), id.to_string(), field.to_string()))
                .cloned()
                .unwrap_or_default()
        };
        let evaluator = FilterEvaluator::new(class_name, &lookup);

        let mut matched: Vec<Map<String, Value>> = records
            .get(class_name)
            .map(|records| {
                records
                    .values()
                    .filter(|body| match params.get("where").and_then(Value::as_object) {
                        Some(filter) => evaluator.matches(body, filter),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = params.get("order").and_then(Value::as_str) {
            let (field, descending) = match order.strip_prefix('-') {
                Some(field) => (field, true),
                None => (order, false),
            };

            matched.sort_by(|a, b| {
                let left = a.get(field).map(Comparable::from).unwrap_or(Comparable::Null);
                let right = b.get(field).map(Comparable::from).unwrap_or(Comparable::Null);

                let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
                if descending { ordering.reverse() } else { ordering }
            });
        }

        let total = matched.len();
        let skip = params.get("skip").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize)
            .unwrap_or(usize::MAX);

        let results: Vec<Value> = matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(Value::Object)
            .collect();

        let mut result = Map::new();
        result.insert("results".to_string(), Value::Array(results));
        if params.contains_key("count") {
            result.insert("count".to_string(), json!(total));
        }

        Response::ok(Value::Object(result))
    }
}

#[async_trait]
impl Transport for MemoryServer {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<Value>,
    ) -> RecordLayerResult<Response> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let response = match (method, segments.as_slice()) {
            (Method::Post, ["classes", class_name]) => self.create(class_name, body).await,
            (Method::Get, ["classes", class_name]) => self.query(class_name, query).await,
            (Method::Get, ["classes", class_name, object_id]) => {
                self.fetch(class_name, object_id).await
            }
            (Method::Put, ["classes", class_name, object_id]) => {
                self.update(class_name, object_id, body).await
            }
            (Method::Delete, ["classes", class_name, object_id]) => {
                self.delete(class_name, object_id).await
            }
            _ => Response::failure(404, format!("no route for {path}")),
        };

        Ok(response)
    }
}

/// Applies an incoming field map to a stored body, interpreting atomic
/// operation hashes. Relation operations mutate the join tables instead of
/// the body. Returns the post-operation values of fields updated through
/// non-relation operations.
fn apply_fields(
    stored: &mut Map<String, Value>,
    incoming: Map<String, Value>,
    class_name: &str,
    object_id: &str,
    relations: &mut JoinMap,
) -> Vec<(String, Value)> {
    let mut resolved = Vec::new();

    for (field, value) in incoming {
        match Operation::from_value(&value) {
            Some(operation @ (Operation::AddRelation { .. } | Operation::RemoveRelation { .. })) => {
                let key = (
                    class_name.to_string(),
                    object_id.to_string(),
                    field.clone(),
                );
                let members = relations.entry(key).or_default();
                let current = Value::Array(members.clone());
                match operation.apply(Some(&current)) {
                    Value::Array(updated) => *members = updated,
                    _ => members.clear(),
                }
            }
            Some(operation) => {
                let value = operation.apply(stored.get(&field));
                if value.is_null() {
                    stored.remove(&field);
                } else {
                    stored.insert(field.clone(), value.clone());
                }
                resolved.push((field, value));
            }
            None => {
                stored.insert(field, value);
            }
        }
    }

    resolved
}

fn mint_object_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn date_hash(iso: &str) -> Value {
    json!({ "__type": "Date", "iso": iso })
}

/// Builder for constructing [`MemoryServer`] instances.
#[derive(Default)]
pub struct MemoryServerBuilder;

impl MemoryServerBuilder {
    /// Builds and returns a fresh, empty server.
    pub fn build(self) -> MemoryServer {
        MemoryServer::new()
    }
}
