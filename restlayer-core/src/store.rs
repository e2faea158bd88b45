//! The record store: query execution and persistence reconciliation.
//!
//! [`RecordStore`] pairs a [`Transport`] with a [`SchemaRegistry`] and owns
//! every outbound request the layer makes. Attribute changes and relation
//! deltas are reconciled into minimal requests: one body create/update when
//! attribute changes exist, plus one request per non-empty relation-delta
//! half. Server-returned canonical field values are folded back into the
//! local instance after each round trip, so fields rewritten by remote
//! pre-save hooks are adopted without re-dirtying the record.

use std::sync::Arc;

use futures::future;
use serde_json::{Map, Value, json};

use crate::{
    error::{RecordLayerError, RecordLayerResult},
    op::Operation,
    query::Query,
    record::Record,
    registry::SchemaRegistry,
    schema::ClassSchema,
    transport::{Method, Response, Transport, class_path, record_path},
};

/// One outbound request computed by the reconciler, tagged with the
/// originating record's identity for correlating batched responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
    /// The record type this request originated from.
    pub class_name: String,
    /// The originating record's identifier, absent for creates.
    pub object_id: Option<String>,
}

/// Options governing a save.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Surface failures as [`RecordLayerError::RecordNotSaved`] instead of
    /// `Ok(false)`.
    pub auto_raise: bool,
}

impl SaveOptions {
    pub fn raising() -> Self {
        Self { auto_raise: true }
    }
}

/// A store bound to a transport and a schema registry.
#[derive(Debug)]
pub struct RecordStore<T: Transport> {
    transport: T,
    registry: Arc<SchemaRegistry>,
}

impl<T: Transport> RecordStore<T> {
    /// Creates a store over the given transport and registry.
    pub fn new(transport: T, registry: Arc<SchemaRegistry>) -> Self {
        Self { transport, registry }
    }

    /// The injected schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Computes the set of outbound requests a save of this record would
    /// issue, without sending anything.
    ///
    /// One body request (create when new, update otherwise) when attribute
    /// changes exist or `force` is set, plus one request per non-empty
    /// relation-delta half when the record is persisted.
    pub fn change_requests(&self, record: &Record, force: bool) -> Vec<ChangeRequest> {
        let mut requests = Vec::new();
        let class_name = record.class_name().to_string();

        if record.has_attribute_changes() || force {
            let body = Value::Object(record.attribute_updates(false));
            let (method, path) = match record.object_id() {
                None => (Method::Post, class_path(&class_name)),
                Some(id) => (Method::Put, record_path(&class_name, id)),
            };

            requests.push(ChangeRequest {
                method,
                path,
                body,
                class_name: class_name.clone(),
                object_id: record.object_id().map(str::to_string),
            });
        }

        if let Some(id) = record.object_id() {
            let (additions, removals) = relation_delta(record);
            for body in [additions, removals] {
                if let Some(body) = body {
                    requests.push(ChangeRequest {
                        method: Method::Put,
                        path: record_path(&class_name, id),
                        body: Value::Object(body),
                        class_name: class_name.clone(),
                        object_id: Some(id.to_string()),
                    });
                }
            }
        }

        requests
    }

    /// Persists pending changes: create-or-update for attribute changes,
    /// then relation-delta commits.
    ///
    /// Returns `Ok(true)` immediately when nothing is pending. On failure of
    /// either step the result is `Ok(false)`, or
    /// [`RecordLayerError::RecordNotSaved`] with `auto_raise`. An attribute
    /// failure aborts before any relation commit; a relation failure leaves
    /// the attribute changes applied and the pending sets intact, so callers
    /// can retry the relation half alone.
    pub async fn save(
        &self,
        record: &mut Record,
        options: SaveOptions,
    ) -> RecordLayerResult<bool> {
        if !record.has_changes() {
            return Ok(true);
        }
        if let Err(reason) = record.validate() {
            tracing::debug!(class = record.class_name(), reason = %reason, "save rejected locally");
            return self.save_failed(record, options);
        }

        // A new record is always created first, even when only relation
        // edits are pending: the delta commits need its identifier.
        if record.has_attribute_changes() || record.is_new() {
            let body = Value::Object(record.attribute_updates(false));
            let response = match record.object_id() {
                None => {
                    self.transport
                        .send(Method::Post, &class_path(record.class_name()), Some(body), None)
                        .await?
                }
                Some(id) => {
                    self.transport
                        .send(
                            Method::Put,
                            &record_path(record.class_name(), id),
                            Some(body),
                            None,
                        )
                        .await?
                }
            };

            if !response.success {
                return self.save_failed(record, options);
            }
            if let Some(result) = response.result_object() {
                record.set_attributes(result, false);
            }
        }

        if record.has_relation_changes() {
            // Attribute-level tracking clears first; relation tracking
            // survives until its own commit succeeds.
            record.attribute_changes_applied();
            if !self.update_relations(record).await? {
                return self.save_failed(record, options);
            }
        } else {
            record.attribute_changes_applied();
        }

        Ok(true)
    }

    /// Commits pending relation deltas as two independent requests, one per
    /// non-empty half, dispatched concurrently.
    ///
    /// Requires a persisted record. One completed response's returned fields
    /// are folded back as the authoritative server state; the other is
    /// consulted for success only. Pending sets clear only when every sent
    /// request succeeds.
    pub async fn update_relations(&self, record: &mut Record) -> RecordLayerResult<bool> {
        let Some(id) = record.object_id().map(str::to_string) else {
            return Err(RecordLayerError::IllegalState(
                "cannot commit relation changes on a record with no identifier".into(),
            ));
        };

        let (additions, removals) = relation_delta(record);
        if additions.is_none() && removals.is_none() {
            return Ok(true);
        }

        let path = record_path(record.class_name(), &id);
        let send_half = |body: Option<Map<String, Value>>| {
            let path = path.clone();
            async move {
                match body {
                    Some(body) => Some(
                        self.transport
                            .send(Method::Put, &path, Some(Value::Object(body)), None)
                            .await,
                    ),
                    None => None,
                }
            }
        };

        // The two halves target disjoint items, so their relative ordering
        // does not matter and they may be in flight together.
        let (removal_response, addition_response) =
            future::join(send_half(removals), send_half(additions)).await;

        let mut authoritative: Option<Response> = None;
        for response in [removal_response, addition_response] {
            let Some(response) = response else { continue };
            let response = response?;
            if !response.success {
                return Ok(false);
            }
            authoritative = Some(response);
        }

        if let Some(response) = authoritative {
            // set_attributes routes operation hashes through the atomic
            // operation interpreter, folding hook-rewritten fields in
            // without a refetch.
            if let Some(result) = response.result_object() {
                record.set_attributes(result, false);
            }
        }

        for (_, relation) in record.relations_mut() {
            relation.clear_pending();
        }

        Ok(true)
    }

    /// Deletes a persisted record. A never-persisted record is a no-op
    /// returning `false`. On success the instance reverts to the new state.
    pub async fn destroy(&self, record: &mut Record) -> RecordLayerResult<bool> {
        let Some(id) = record.object_id().map(str::to_string) else {
            return Ok(false);
        };

        let response = self
            .transport
            .send(Method::Delete, &record_path(record.class_name(), &id), None, None)
            .await?;
        if !response.success {
            return Ok(false);
        }

        record.mark_destroyed();
        Ok(true)
    }

    /// Fetches the record's current body, replacing local content in place.
    /// This is the pointer→fetched transition.
    pub async fn fetch(&self, record: &mut Record) -> RecordLayerResult<bool> {
        let Some(id) = record.object_id().map(str::to_string) else {
            return Ok(false);
        };

        let response = self
            .transport
            .send(Method::Get, &record_path(record.class_name(), &id), None, None)
            .await?;
        if !response.success {
            return Ok(false);
        }

        if let Some(body) = response.result_object() {
            record.refresh(body);
        }

        Ok(true)
    }

    /// Reads an attribute, autofetching the body first when the record is an
    /// unfetched pointer missing the attribute. The fetch-lock flag keeps a
    /// decode re-entry from fetching twice.
    pub async fn attribute(
        &self,
        record: &mut Record,
        name: &str,
    ) -> RecordLayerResult<Option<Value>> {
        if record.is_pointer() && !record.has(name) && !record.is_fetching() {
            record.set_fetching(true);
            let fetched = self.fetch(record).await;
            record.set_fetching(false);
            fetched?;
        }

        Ok(record.get(name))
    }

    /// Runs a query against a record type, decoding each result body.
    pub async fn find(
        &self,
        schema: &Arc<ClassSchema>,
        query: &Query,
    ) -> RecordLayerResult<Vec<Record>> {
        let response = self
            .transport
            .send(
                Method::Get,
                &class_path(schema.name()),
                None,
                Some(query.to_params()),
            )
            .await?;
        if !response.success {
            return Err(RecordLayerError::Transport(
                response
                    .error
                    .unwrap_or_else(|| "query failed".to_string()),
            ));
        }

        let results = response
            .result
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .map(|body| Record::decode(schema.clone(), body))
            .collect())
    }

    /// Runs a query limited to one result.
    pub async fn first(
        &self,
        schema: &Arc<ClassSchema>,
        query: &Query,
    ) -> RecordLayerResult<Option<Record>> {
        let mut query = query.clone();
        query.limit = Some(1);

        Ok(self.find(schema, &query).await?.into_iter().next())
    }

    /// Counts matching records without fetching their bodies.
    pub async fn count(
        &self,
        schema: &Arc<ClassSchema>,
        query: &Query,
    ) -> RecordLayerResult<usize> {
        let mut query = query.clone();
        query.count = true;
        query.limit = Some(0);

        let response = self
            .transport
            .send(
                Method::Get,
                &class_path(schema.name()),
                None,
                Some(query.to_params()),
            )
            .await?;
        if !response.success {
            return Err(RecordLayerError::Transport(
                response
                    .error
                    .unwrap_or_else(|| "count failed".to_string()),
            ));
        }

        Ok(response
            .result
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }

    /// Queries the members of a record's relation field against its foreign
    /// type.
    ///
    /// Returns an empty result for a relation with no persisted owner or an
    /// undeclared foreign type, per the tolerant proxy contract.
    pub async fn find_related(
        &self,
        record: &mut Record,
        name: &str,
        constraints: Query,
    ) -> RecordLayerResult<Vec<Record>> {
        let owner = record.to_pointer();
        let Some(relation) = record.relation(name) else {
            return Ok(Vec::new());
        };
        let Some(mut query) = relation.query(owner) else {
            return Ok(Vec::new());
        };
        let Some(schema) = relation
            .target_class()
            .and_then(|class| self.registry.get(class))
        else {
            return Ok(Vec::new());
        };

        query.constraints.extend(constraints.constraints);
        query.limit = constraints.limit;
        query.skip = constraints.skip;
        query.order = constraints.order;

        self.find(&schema, &query).await
    }

    /// Issues an immediate atomic `Add` against an array field, bypassing
    /// local batching, then resets the proxy to force a reload.
    pub async fn array_add(
        &self,
        record: &mut Record,
        name: &str,
        items: Vec<Value>,
    ) -> RecordLayerResult<bool> {
        self.array_operation(record, name, Operation::Add { objects: items })
            .await
    }

    /// Immediate atomic `AddUnique` against an array field.
    pub async fn array_add_unique(
        &self,
        record: &mut Record,
        name: &str,
        items: Vec<Value>,
    ) -> RecordLayerResult<bool> {
        self.array_operation(record, name, Operation::AddUnique { objects: items })
            .await
    }

    /// Immediate atomic `Remove` against an array field.
    pub async fn array_remove(
        &self,
        record: &mut Record,
        name: &str,
        items: Vec<Value>,
    ) -> RecordLayerResult<bool> {
        self.array_operation(record, name, Operation::Remove { objects: items })
            .await
    }

    async fn array_operation(
        &self,
        record: &mut Record,
        name: &str,
        operation: Operation,
    ) -> RecordLayerResult<bool> {
        let Some(id) = record.object_id().map(str::to_string) else {
            return Ok(false);
        };
        let Some(remote) = record
            .schema()
            .attribute(name)
            .map(|def| def.remote_name.clone())
        else {
            return Ok(false);
        };

        let body = json!({ remote: operation.to_value() });
        let response = self
            .transport
            .send(
                Method::Put,
                &record_path(record.class_name(), &id),
                Some(body),
                None,
            )
            .await?;
        if !response.success {
            return Ok(false);
        }

        if let Some(result) = response.result_object() {
            record.set_attributes(result, false);
        }
        if let Some(proxy) = record.array(name) {
            proxy.reset();
        }
        record.attribute_changes_applied();

        Ok(true)
    }

    fn save_failed(
        &self,
        record: &Record,
        options: SaveOptions,
    ) -> RecordLayerResult<bool> {
        if options.auto_raise {
            Err(RecordLayerError::RecordNotSaved {
                class: record.class_name().to_string(),
                object_id: record.object_id().map(str::to_string),
            })
        } else {
            Ok(false)
        }
    }
}

/// Computes the union of all relation-collection pending deltas as the two
/// wire bodies: `(additions, removals)`. Each half is `None` when empty.
fn relation_delta(record: &Record) -> (Option<Map<String, Value>>, Option<Map<String, Value>>) {
    let mut additions = Map::new();
    let mut removals = Map::new();

    for (_, relation) in record.relations() {
        let (added, removed) = relation.delta();
        if !added.is_empty() {
            additions.insert(
                relation.key().to_string(),
                Operation::AddRelation { objects: added.to_vec() }.to_value(),
            );
        }
        if !removed.is_empty() {
            removals.insert(
                relation.key().to_string(),
                Operation::RemoveRelation { objects: removed.to_vec() }.to_value(),
            );
        }
    }

    (
        (!additions.is_empty()).then_some(additions),
        (!removals.is_empty()).then_some(removals),
    )
}
