//! Record instances: typed attribute storage with per-attribute change
//! tracking.
//!
//! A [`Record`] pairs an [`Arc<ClassSchema>`] with an attribute map and a
//! change set. Reads and writes go through generic [`Record::get`] /
//! [`Record::set`] entry points that consult the schema's declaration table —
//! there is no per-type code generation. Writes coerce incoming values into
//! canonical wire form, resolve server-style atomic operation hashes against
//! the current value, and record the prior value so the persistence
//! reconciler can compute minimal updates and support rollback.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::{
    op::Operation,
    relation::{ArrayProxy, Relation},
    schema::{ACL, AttributeKind, ClassSchema, CREATED_AT, OBJECT_ID, UPDATED_AT, is_base_field},
    value::{Bytes, Date, File, GeoPoint, Pointer, pointer_to},
};

/// A single record instance of a declared type.
///
/// Identity invariant: an instance with an identifier but neither timestamp
/// is a pointer (reference-only, unfetched body). An instance without an
/// identifier is new and unsaved.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<ClassSchema>,
    object_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    /// Attribute values keyed by local name. Array and relation kinds live
    /// in their proxies instead.
    attributes: BTreeMap<String, Value>,
    /// Prior values for attributes modified since the last persistence.
    changes: BTreeMap<String, Value>,
    arrays: BTreeMap<String, ArrayProxy>,
    relations: BTreeMap<String, Relation>,
    fetching: bool,
}

impl Record {
    /// Creates a new, unsaved instance.
    pub fn new(schema: Arc<ClassSchema>) -> Self {
        Self {
            schema,
            object_id: None,
            created_at: None,
            updated_at: None,
            attributes: BTreeMap::new(),
            changes: BTreeMap::new(),
            arrays: BTreeMap::new(),
            relations: BTreeMap::new(),
            fetching: false,
        }
    }

    /// Creates a pointer instance: identifier only, no body.
    pub fn pointer(schema: Arc<ClassSchema>, object_id: impl Into<String>) -> Self {
        let mut record = Self::new(schema);
        record.object_id = Some(object_id.into());
        record
    }

    /// Decodes an instance from a remote-field-keyed JSON body without
    /// marking anything changed.
    pub fn decode(schema: Arc<ClassSchema>, body: &Value) -> Self {
        let mut record = Self::new(schema);
        if let Value::Object(map) = body {
            record.set_attributes(map, false);
        }

        record
    }

    /// The record type name.
    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    /// The schema this instance was built from.
    pub fn schema(&self) -> &Arc<ClassSchema> {
        &self.schema
    }

    /// The opaque identifier, absent for new instances.
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Whether this instance has never been persisted.
    pub fn is_new(&self) -> bool {
        self.object_id.is_none()
    }

    /// Whether this instance is a reference-only pointer: identifier present
    /// and both server timestamps absent.
    pub fn is_pointer(&self) -> bool {
        self.object_id.is_some() && self.created_at.is_none() && self.updated_at.is_none()
    }

    /// This instance's reference form, once persisted.
    pub fn to_pointer(&self) -> Option<Pointer> {
        self.object_id
            .as_ref()
            .map(|id| Pointer::new(self.schema.name(), id.clone()))
    }

    pub(crate) fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub(crate) fn set_fetching(&mut self, fetching: bool) {
        self.fetching = fetching;
    }

    /// Reads an attribute by local name.
    ///
    /// An unset attribute falls back to its declared default; a generated
    /// default is produced once and stored on the instance. Reading never
    /// performs I/O — the autofetch path for pointer instances lives on the
    /// store, which fetches before delegating here.
    pub fn get(&mut self, name: &str) -> Option<Value> {
        match name {
            "id" | "object_id" => return self.object_id.clone().map(Value::String),
            "created_at" => return self.created_at.map(|at| Date(at).to_value()),
            "updated_at" => return self.updated_at.map(|at| Date(at).to_value()),
            _ => {}
        }

        if let Some(def) = self.schema.attribute(name) {
            match def.kind {
                AttributeKind::Array => {
                    return self
                        .arrays
                        .get(name)
                        .filter(|proxy| proxy.is_loaded())
                        .map(|proxy| Value::Array(proxy.items().to_vec()));
                }
                AttributeKind::Relation => {
                    return self
                        .relations
                        .get(name)
                        .filter(|relation| relation.is_loaded())
                        .map(|relation| Value::Array(relation.items().to_vec()));
                }
                _ => {}
            }
        }

        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }

        let default = self
            .schema
            .attribute(name)
            .and_then(|def| def.default.as_ref())
            .map(|default| default.produce())?;
        self.attributes.insert(name.to_string(), default.clone());

        Some(default)
    }

    /// Whether the attribute currently holds a value (defaults not counted).
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
            || self
                .arrays
                .get(name)
                .is_some_and(|proxy| proxy.is_loaded())
            || self
                .relations
                .get(name)
                .is_some_and(|relation| relation.is_loaded())
    }

    /// Writes an attribute by local name.
    ///
    /// The value is first resolved if it is a server-style atomic operation
    /// hash, then coerced into the canonical form for the declared kind. The
    /// prior value lands in the change set only when `track` is set and the
    /// coerced value actually differs.
    pub fn set(&mut self, name: &str, value: Value, track: bool) {
        match name {
            "id" | "object_id" => {
                self.object_id = value.as_str().map(str::to_string);
                return;
            }
            "created_at" => {
                self.created_at = Date::from_value(&value).ok().map(|date| date.0);
                return;
            }
            "updated_at" => {
                self.updated_at = Date::from_value(&value).ok().map(|date| date.0);
                return;
            }
            _ => {}
        }

        let kind = self.schema.attribute(name).map(|def| def.kind);
        match kind {
            Some(AttributeKind::Array) => self.set_array(name, value, track),
            Some(AttributeKind::Relation) => self.set_relation(name, value),
            _ => self.set_scalar(name, value, track),
        }
    }

    fn set_scalar(&mut self, name: &str, value: Value, track: bool) {
        let current = self.attributes.get(name);
        let value = match Operation::from_value(&value) {
            Some(operation) => operation.apply(current),
            None => value,
        };
        let value = self.coerce(name, value);

        if self.attributes.get(name) == Some(&value) {
            return;
        }
        // Nulling an attribute that never held a value is a no-op.
        if value.is_null() && !self.attributes.contains_key(name) {
            return;
        }
        if track && !self.changes.contains_key(name) {
            let prior = self
                .attributes
                .get(name)
                .cloned()
                .unwrap_or(Value::Null);
            self.changes.insert(name.to_string(), prior);
        }

        if value.is_null() {
            self.attributes.remove(name);
            // Null still counts as the new value; the update encoder turns
            // it into a Delete operation.
            if track {
                self.attributes.insert(name.to_string(), Value::Null);
            }
        } else {
            self.attributes.insert(name.to_string(), value);
        }
    }

    fn set_array(&mut self, name: &str, value: Value, track: bool) {
        let current = self
            .arrays
            .get(name)
            .map(|proxy| Value::Array(proxy.items().to_vec()));
        let value = match Operation::from_value(&value) {
            Some(operation) => operation.apply(current.as_ref()),
            None => value,
        };

        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(attribute = name, ?other, "ignoring non-array value for array attribute");
                return;
            }
        };

        if current.as_ref().map(|v| v.as_array().unwrap().as_slice()) == Some(items.as_slice()) {
            return;
        }
        if track && !self.changes.contains_key(name) {
            self.changes
                .insert(name.to_string(), current.unwrap_or(Value::Null));
        }

        // load() clears the proxy's changed flag; the change-set entry above
        // is the marker for a tracked replacement.
        self.array_proxy_entry(name).load(items);
    }

    fn set_relation(&mut self, name: &str, value: Value) {
        let current = self
            .relations
            .get(name)
            .map(|relation| Value::Array(relation.items().to_vec()));
        let value = match Operation::from_value(&value) {
            Some(operation) => operation.apply(current.as_ref()),
            None => value,
        };

        match value {
            // A read decodes as a full replacement of the reference list.
            Value::Array(items) => {
                self.relation_entry(name).load(items);
            }
            // The bare relation marker hash carries no members; it only
            // confirms the field's foreign type.
            Value::Object(ref map) if map.get("__type").and_then(Value::as_str) == Some("Relation") => {}
            Value::Null => {
                self.relation_entry(name).load(Vec::new());
            }
            other => {
                tracing::warn!(attribute = name, ?other, "ignoring malformed relation value");
            }
        }
    }

    fn coerce(&self, name: &str, value: Value) -> Value {
        let Some(def) = self.schema.attribute(name) else {
            return value;
        };
        if let Some(cast) = def.typecast {
            return cast(value);
        }
        if value.is_null() {
            return value;
        }

        match def.kind {
            AttributeKind::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => value,
                Value::Number(n) => n
                    .as_f64()
                    .map(|f| json!(f as i64))
                    .unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|n| json!(n))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            AttributeKind::Float => match &value {
                Value::Number(_) => value,
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(|f| json!(f))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            AttributeKind::Boolean => match value {
                Value::Bool(_) => value,
                _ => Value::Null,
            },
            AttributeKind::Date => Date::from_value(&value)
                .map(|date| date.to_value())
                .unwrap_or(Value::Null),
            AttributeKind::Pointer => pointer_to(&value)
                .map(|pointer| pointer.to_value())
                .unwrap_or(Value::Null),
            AttributeKind::GeoPoint => GeoPoint::from_value(&value)
                .map(|point| point.to_value())
                .unwrap_or(Value::Null),
            AttributeKind::Bytes => Bytes::from_value(&value)
                .map(|bytes| bytes.to_value())
                .unwrap_or(Value::Null),
            AttributeKind::File => File::from_value(&value)
                .map(|file| file.to_value())
                .unwrap_or(Value::Null),
            AttributeKind::Object | AttributeKind::Acl => match value {
                Value::Object(_) => value,
                _ => Value::Null,
            },
            AttributeKind::String
            | AttributeKind::Array
            | AttributeKind::Relation => value,
        }
    }

    /// Bulk-applies a remote-field-keyed map, translating remote names to
    /// local names through the schema. Used both for decoding fetched bodies
    /// (`track = false`) and for folding server responses back in.
    pub fn set_attributes(&mut self, body: &Map<String, Value>, track: bool) {
        for (remote, value) in body {
            match remote.as_str() {
                OBJECT_ID => {
                    self.object_id = value.as_str().map(str::to_string);
                    continue;
                }
                CREATED_AT => {
                    self.created_at = Date::from_value(value).ok().map(|date| date.0);
                    continue;
                }
                UPDATED_AT => {
                    self.updated_at = Date::from_value(value).ok().map(|date| date.0);
                    continue;
                }
                _ => {}
            }

            let local = self
                .schema
                .by_remote(remote)
                .map(|def| def.name.clone())
                .unwrap_or_else(|| remote.clone());
            self.set(&local, value.clone(), track);
        }
    }

    /// Borrows the relation proxy for a declared relation attribute,
    /// creating it on first access.
    pub fn relation(&mut self, name: &str) -> Option<&mut Relation> {
        let def = self.schema.attribute(name)?;
        if def.kind != AttributeKind::Relation {
            return None;
        }

        Some(self.relation_entry(name))
    }

    fn relation_entry(&mut self, name: &str) -> &mut Relation {
        let (remote, target) = self
            .schema
            .attribute(name)
            .map(|def| (def.remote_name.clone(), def.target_class.clone()))
            .unwrap_or_else(|| (name.to_string(), None));

        self.relations
            .entry(name.to_string())
            .or_insert_with(|| Relation::new(remote, target))
    }

    /// Borrows the array proxy for a declared array attribute, creating it
    /// on first access. The pre-edit content is snapshotted into the change
    /// set so rollback can restore it.
    pub fn array(&mut self, name: &str) -> Option<&mut ArrayProxy> {
        let def = self.schema.attribute(name)?;
        if def.kind != AttributeKind::Array {
            return None;
        }

        if !self.changes.contains_key(name) {
            let prior = self
                .arrays
                .get(name)
                .map(|proxy| Value::Array(proxy.items().to_vec()))
                .unwrap_or(Value::Null);
            self.changes.insert(name.to_string(), prior);
        }

        Some(self.array_proxy_entry(name))
    }

    fn array_proxy_entry(&mut self, name: &str) -> &mut ArrayProxy {
        let references_only = self
            .schema
            .attribute(name)
            .is_some_and(|def| def.target_class.is_some());

        self.arrays
            .entry(name.to_string())
            .or_insert_with(|| ArrayProxy::new(references_only))
    }

    /// Iterates the relation proxies that currently exist on this instance.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations
            .iter()
            .map(|(name, relation)| (name.as_str(), relation))
    }

    pub(crate) fn relations_mut(&mut self) -> impl Iterator<Item = (&str, &mut Relation)> {
        self.relations
            .iter_mut()
            .map(|(name, relation)| (name.as_str(), relation))
    }

    /// Whether the attribute is marked changed.
    pub fn is_changed(&self, name: &str) -> bool {
        self.changes.contains_key(name)
            || self
                .arrays
                .get(name)
                .is_some_and(|proxy| proxy.is_changed())
    }

    /// Whether any attribute-level change is pending (relation deltas are
    /// tracked separately).
    pub fn has_attribute_changes(&self) -> bool {
        !self.changes.is_empty()
            || self.arrays.values().any(|proxy| proxy.is_changed())
    }

    /// Whether any relation delta is pending.
    pub fn has_relation_changes(&self) -> bool {
        self.relations.values().any(|relation| relation.has_pending())
    }

    /// Whether any change of either family is pending.
    pub fn has_changes(&self) -> bool {
        self.has_attribute_changes() || self.has_relation_changes()
    }

    /// Restores every changed attribute to its prior value and clears the
    /// change flags. Pending relation deltas are discarded.
    pub fn rollback(&mut self) {
        let changes = std::mem::take(&mut self.changes);
        for (name, prior) in changes {
            if self.arrays.contains_key(&name) {
                match prior {
                    Value::Array(items) => self.array_proxy_entry(&name).load(items),
                    _ => self.array_proxy_entry(&name).reset(),
                }
                continue;
            }

            if prior.is_null() {
                self.attributes.remove(&name);
            } else {
                self.attributes.insert(name, prior);
            }
        }

        for proxy in self.arrays.values_mut() {
            proxy.changes_applied();
        }
        for relation in self.relations.values_mut() {
            relation.clear_pending();
        }
    }

    /// Clears attribute-level change tracking without touching values.
    /// Relation pending sets are left alone — the reconciler clears those
    /// when their deltas commit.
    pub fn attribute_changes_applied(&mut self) {
        self.changes.clear();
        for proxy in self.arrays.values_mut() {
            proxy.changes_applied();
        }
    }

    /// Computes the remote-field-keyed update payload for pending attribute
    /// changes.
    ///
    /// Nulled attributes become `{"__op": "Delete"}` markers; record and
    /// collection values collapse to reference form rather than full bodies.
    /// Base fields are skipped unless `include_base` is set.
    pub fn attribute_updates(&self, include_base: bool) -> Map<String, Value> {
        let mut updates = Map::new();

        for name in self.changes.keys() {
            if let Some(entry) = self.update_entry(name, include_base) {
                updates.insert(entry.0, entry.1);
            }
        }
        for (name, proxy) in &self.arrays {
            if proxy.is_changed() && !self.changes.contains_key(name) {
                if let Some(entry) = self.update_entry(name, include_base) {
                    updates.insert(entry.0, entry.1);
                }
            }
        }

        updates
    }

    fn update_entry(&self, name: &str, include_base: bool) -> Option<(String, Value)> {
        let remote = self
            .schema
            .attribute(name)
            .map(|def| def.remote_name.clone())
            .unwrap_or_else(|| name.to_string());
        if is_base_field(&remote) && !include_base {
            return None;
        }

        if let Some(proxy) = self.arrays.get(name) {
            let items = proxy.items().iter().map(reference_form).collect();
            return Some((remote, Value::Array(items)));
        }

        let value = match self.attributes.get(name) {
            None | Some(Value::Null) => Operation::Delete.to_value(),
            Some(value) => reference_form(value),
        };

        Some((remote, value))
    }

    /// Validates required attributes and enumerated-value restrictions,
    /// returning the first violation.
    pub fn validate(&self) -> Result<(), String> {
        for def in self.schema.attributes() {
            if is_base_field(&def.remote_name) {
                continue;
            }

            let value = self.attributes.get(&def.name);
            let present = match value {
                Some(value) => !value.is_null(),
                None => {
                    self.arrays
                        .get(&def.name)
                        .is_some_and(|proxy| proxy.is_loaded())
                        || self
                            .relations
                            .get(&def.name)
                            .is_some_and(|relation| relation.is_loaded())
                }
            };
            if def.required && !present {
                return Err(format!("missing required attribute {}", def.name));
            }
            if let (Some(allowed), Some(value)) = (&def.one_of, value) {
                if !value.is_null() && !allowed.contains(value) {
                    return Err(format!(
                        "attribute {} must be one of the declared values",
                        def.name
                    ));
                }
            }
        }

        Ok(())
    }

    /// Encodes the full body in wire form: remote-field-keyed, references in
    /// pointer form, identity fields included when present.
    pub fn encode(&self) -> Value {
        let mut body = Map::new();

        if let Some(id) = &self.object_id {
            body.insert(OBJECT_ID.to_string(), Value::String(id.clone()));
        }
        if let Some(at) = self.created_at {
            body.insert(CREATED_AT.to_string(), Date(at).to_value());
        }
        if let Some(at) = self.updated_at {
            body.insert(UPDATED_AT.to_string(), Date(at).to_value());
        }

        for (name, value) in &self.attributes {
            let remote = self
                .schema
                .attribute(name)
                .map(|def| def.remote_name.clone())
                .unwrap_or_else(|| name.clone());
            if matches!(remote.as_str(), OBJECT_ID | CREATED_AT | UPDATED_AT) {
                continue;
            }
            if remote == ACL {
                body.insert(remote, value.clone());
                continue;
            }

            body.insert(remote, reference_form(value));
        }
        for (name, proxy) in &self.arrays {
            if !proxy.is_loaded() {
                continue;
            }
            let remote = self
                .schema
                .attribute(name)
                .map(|def| def.remote_name.clone())
                .unwrap_or_else(|| name.clone());
            body.insert(
                remote,
                Value::Array(proxy.items().iter().map(reference_form).collect()),
            );
        }

        Value::Object(body)
    }

    /// Replaces this instance's body with a freshly fetched one, clearing
    /// all change tracking. The pointer→fetched transition.
    pub fn refresh(&mut self, body: &Map<String, Value>) {
        self.attributes.clear();
        self.changes.clear();
        self.arrays.clear();
        self.relations.clear();
        self.set_attributes(body, false);
    }

    /// Reverts to the never-persisted state after a destroy: identifier and
    /// timestamps cleared, changes applied.
    pub(crate) fn mark_destroyed(&mut self) {
        self.object_id = None;
        self.created_at = None;
        self.updated_at = None;
        self.changes.clear();
        for proxy in self.arrays.values_mut() {
            proxy.changes_applied();
        }
        for relation in self.relations.values_mut() {
            relation.clear_pending();
        }
    }
}

/// Reduces record-like values (and lists of them) to pointer form; other
/// values pass through.
fn reference_form(value: &Value) -> Value {
    if let Some(pointer) = pointer_to(value) {
        return pointer.to_value();
    }
    if let Value::Array(items) = value {
        return Value::Array(items.iter().map(reference_form).collect());
    }

    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDef;
    use serde_json::json;

    fn song_schema() -> Arc<ClassSchema> {
        Arc::new(
            ClassSchema::new("Song")
                .with(AttributeDef::new("title", AttributeKind::String).required())
                .unwrap()
                .with(AttributeDef::new("play_count", AttributeKind::Integer).default_value(json!(0)))
                .unwrap()
                .with(AttributeDef::new("rating", AttributeKind::Float))
                .unwrap()
                .with(AttributeDef::new("starred", AttributeKind::Boolean))
                .unwrap()
                .with(AttributeDef::new("recorded_at", AttributeKind::Date))
                .unwrap()
                .with(
                    AttributeDef::new("genre", AttributeKind::String)
                        .one_of(vec![json!("jazz"), json!("blues")]),
                )
                .unwrap()
                .with(AttributeDef::new("tags", AttributeKind::Array))
                .unwrap()
                .with(AttributeDef::new("album", AttributeKind::Pointer).target("Album"))
                .unwrap()
                .with(AttributeDef::new("fans", AttributeKind::Relation).target("User"))
                .unwrap(),
        )
    }

    #[test]
    fn new_record_is_new_not_pointer() {
        let record = Record::new(song_schema());
        assert!(record.is_new());
        assert!(!record.is_pointer());
    }

    #[test]
    fn pointer_invariant() {
        let record = Record::pointer(song_schema(), "abc123");
        assert!(record.is_pointer());
        assert!(!record.is_new());

        let fetched = Record::decode(
            song_schema(),
            &json!({
                "objectId": "abc123",
                "createdAt": "2019-04-02T10:41:35.870Z",
                "updatedAt": "2019-04-02T10:41:35.870Z",
            }),
        );
        assert!(!fetched.is_pointer());
    }

    #[test]
    fn set_same_value_is_not_a_change() {
        let mut record = Record::new(song_schema());
        record.set("title", json!("So What"), true);
        record.attribute_changes_applied();

        record.set("title", json!("So What"), true);
        assert!(!record.has_attribute_changes());
    }

    #[test]
    fn set_different_value_tracks_and_rolls_back() {
        let mut record = Record::new(song_schema());
        record.set("title", json!("So What"), false);

        record.set("title", json!("Freddie Freeloader"), true);
        assert!(record.is_changed("title"));

        record.rollback();
        assert!(!record.has_attribute_changes());
        assert_eq!(record.get("title"), Some(json!("So What")));
    }

    #[test]
    fn rollback_removes_attributes_that_were_unset() {
        let mut record = Record::new(song_schema());
        record.set("rating", json!(4.5), true);
        record.rollback();

        assert_eq!(record.get("rating"), None);
    }

    #[test]
    fn integer_coercion() {
        let mut record = Record::new(song_schema());

        record.set("play_count", json!("42"), true);
        assert_eq!(record.get("play_count"), Some(json!(42)));

        record.set("play_count", json!("not a number"), true);
        assert_eq!(record.get("play_count"), Some(json!(null)));
    }

    #[test]
    fn boolean_coercion_is_strict() {
        let mut record = Record::new(song_schema());

        record.set("starred", json!(true), true);
        assert_eq!(record.get("starred"), Some(json!(true)));

        record.set("starred", json!("yes"), true);
        assert_eq!(record.get("starred"), Some(json!(null)));
    }

    #[test]
    fn date_coercion_canonicalizes_to_hash() {
        let mut record = Record::new(song_schema());
        record.set("recorded_at", json!("1959-03-02T00:00:00.000Z"), true);

        assert_eq!(
            record.get("recorded_at"),
            Some(json!({"__type": "Date", "iso": "1959-03-02T00:00:00.000Z"}))
        );
    }

    #[test]
    fn default_produced_for_unset_attribute() {
        let mut record = Record::new(song_schema());
        assert_eq!(record.get("play_count"), Some(json!(0)));
    }

    #[test]
    fn increment_hash_resolves_against_current() {
        let mut record = Record::new(song_schema());
        record.set("play_count", json!(10), false);

        record.set("play_count", json!({"__op": "Increment", "amount": 5}), true);
        assert_eq!(record.get("play_count"), Some(json!(15)));
    }

    #[test]
    fn delete_hash_resolves_to_null() {
        let mut record = Record::new(song_schema());
        record.set("title", json!("So What"), false);

        record.set("title", json!({"__op": "Delete"}), true);
        assert!(record.is_changed("title"));
        assert_eq!(
            record.attribute_updates(false).get("title"),
            Some(&json!({"__op": "Delete"}))
        );
    }

    #[test]
    fn add_unique_hash_resolves_against_array() {
        let mut record = Record::new(song_schema());
        record.set("tags", json!(["cool"]), false);

        record.set(
            "tags",
            json!({"__op": "AddUnique", "objects": ["cool", "modal"]}),
            true,
        );
        assert_eq!(record.get("tags"), Some(json!(["cool", "modal"])));
    }

    #[test]
    fn unknown_op_hash_passes_through() {
        let mut record = Record::new(song_schema());
        record.set("title", json!({"__op": "Mystery", "objects": []}), true);

        assert_eq!(record.get("title"), Some(json!({"__op": "Mystery", "objects": []})));
    }

    #[test]
    fn pointer_attribute_collapses_to_reference() {
        let mut record = Record::new(song_schema());
        record.set(
            "album",
            json!({"className": "Album", "objectId": "al1", "name": "Kind of Blue"}),
            true,
        );

        assert_eq!(
            record.get("album"),
            Some(json!({"__type": "Pointer", "className": "Album", "objectId": "al1"}))
        );
    }

    #[test]
    fn attribute_updates_only_changed_fields() {
        let mut record = Record::decode(
            song_schema(),
            &json!({"objectId": "abc", "title": "So What", "playCount": 3}),
        );
        record.set("play_count", json!(4), true);

        let updates = record.attribute_updates(false);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates.get("playCount"), Some(&json!(4)));
    }

    #[test]
    fn set_attributes_translates_remote_names() {
        let mut record = Record::new(song_schema());
        record.set_attributes(
            json!({"playCount": 7, "title": "So What"})
                .as_object()
                .unwrap(),
            false,
        );

        assert_eq!(record.get("play_count"), Some(json!(7)));
        assert!(!record.has_attribute_changes());
    }

    #[test]
    fn undeclared_attributes_are_stored_raw() {
        let mut record = Record::new(song_schema());
        record.set_attributes(json!({"mood": "blue"}).as_object().unwrap(), false);

        assert_eq!(record.get("mood"), Some(json!("blue")));
    }

    #[test]
    fn array_edits_through_proxy_are_tracked() {
        let mut record = Record::new(song_schema());
        record.array("tags").unwrap().add(vec![json!("modal")]);

        assert!(record.has_attribute_changes());
        let updates = record.attribute_updates(false);
        assert_eq!(updates.get("tags"), Some(&json!(["modal"])));

        record.rollback();
        assert!(!record.has_attribute_changes());
        assert_eq!(record.get("tags"), None);
    }

    #[test]
    fn relation_edits_are_not_attribute_changes() {
        let mut record = Record::new(song_schema());
        record
            .relation("fans")
            .unwrap()
            .add(vec![Pointer::new("User", "u1").to_value()]);

        assert!(!record.has_attribute_changes());
        assert!(record.has_relation_changes());
        assert!(record.attribute_updates(false).is_empty());
    }

    #[test]
    fn validate_required_and_enum() {
        let mut record = Record::new(song_schema());
        assert!(record.validate().is_err());

        record.set("title", json!("So What"), false);
        assert!(record.validate().is_ok());

        record.set("genre", json!("polka"), false);
        assert!(record.validate().is_err());

        record.set("genre", json!("jazz"), false);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn encode_uses_reference_form() {
        let mut record = Record::decode(song_schema(), &json!({"objectId": "s1"}));
        record.set(
            "album",
            json!({"className": "Album", "objectId": "al1", "name": "Kind of Blue"}),
            false,
        );

        let body = record.encode();
        assert_eq!(
            body.get("album"),
            Some(&json!({"__type": "Pointer", "className": "Album", "objectId": "al1"}))
        );
        assert_eq!(body.get("objectId"), Some(&json!("s1")));
    }

    #[test]
    fn refresh_replaces_body_and_clears_tracking() {
        let mut record = Record::pointer(song_schema(), "s1");
        record.set("title", json!("local edit"), true);

        record.refresh(
            json!({
                "objectId": "s1",
                "title": "So What",
                "createdAt": "2019-04-02T10:41:35.870Z",
                "updatedAt": "2019-04-02T10:41:35.870Z",
            })
            .as_object()
            .unwrap(),
        );

        assert!(!record.is_pointer());
        assert!(!record.has_attribute_changes());
        assert_eq!(record.get("title"), Some(json!("So What")));
    }
}
