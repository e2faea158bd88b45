//! Constraint compilation and query construction.
//!
//! This module turns `(field, operator, value)` triples into serializable
//! constraint nodes, merges constraint sets into a single JSON filter map, and
//! supports compound OR composition.
//!
//! # Filter construction
//!
//! Constraints can be built through the typed [`Filter`] constructors:
//!
//! ```ignore
//! use restlayer_core::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .constraint(Filter::eq("artist", "Miles Davis"))
//!     .constraint(Filter::gt("play_count", 10))
//!     .limit(10)
//!     .order("recorded_at", SortDirection::Desc)
//!     .build();
//! ```
//!
//! The dynamic entry point [`Constraint::compile`] accepts an operator parsed
//! from a string and validates operator/value compatibility.

use std::str::FromStr;

use serde_json::{Map, Value, json};

use crate::{
    error::{RecordLayerError, RecordLayerResult},
    schema::canonical_field_name,
    value::{GeoPoint, Pointer, pointer_to},
};

/// The reserved filter key holding compound-OR branches.
pub const OR_KEY: &str = "$or";
/// The reserved filter key for relation-membership constraints.
pub const RELATED_TO_KEY: &str = "$relatedTo";

/// A compiled filter object, keyed by remote field name.
pub type FilterMap = Map<String, Value>;

/// Constraint operators understood by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Exact match; serializes as the bare value rather than an operator map.
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Field value is one of the given values.
    ContainedIn,
    /// Field value is none of the given values.
    NotContainedIn,
    /// Array field contains every one of the given values.
    ContainsAll,
    /// Field presence check; requires a boolean value.
    Exists,
    /// Inverted presence check; requires a boolean value.
    IsNull,
    /// Regular-expression match on a string field.
    Matches,
    /// Geo-radius: field is near the given geo-point.
    Near,
    /// Upper bound, in radians, for a [`Operator::Near`] constraint on the
    /// same field.
    WithinRadians,
    /// Membership in another record's relation.
    RelatedTo,
}

impl Operator {
    /// The wire key this operator serializes under.
    ///
    /// [`Operator::Equal`] has no key (bare value) and
    /// [`Operator::RelatedTo`] serializes under the reserved top-level
    /// `$relatedTo` key instead of the field name.
    pub fn wire_key(&self) -> Option<&'static str> {
        match self {
            Operator::Equal => None,
            Operator::NotEqual => Some("$ne"),
            Operator::GreaterThan => Some("$gt"),
            Operator::GreaterThanOrEqual => Some("$gte"),
            Operator::LessThan => Some("$lt"),
            Operator::LessThanOrEqual => Some("$lte"),
            Operator::ContainedIn => Some("$in"),
            Operator::NotContainedIn => Some("$nin"),
            Operator::ContainsAll => Some("$all"),
            Operator::Exists | Operator::IsNull => Some("$exists"),
            Operator::Matches => Some("$regex"),
            Operator::Near => Some("$nearSphere"),
            Operator::WithinRadians => Some("$maxDistanceInRadians"),
            Operator::RelatedTo => Some(RELATED_TO_KEY),
        }
    }
}

impl FromStr for Operator {
    type Err = RecordLayerError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "eq" | "equal" => Ok(Operator::Equal),
            "ne" | "not_equal" => Ok(Operator::NotEqual),
            "gt" => Ok(Operator::GreaterThan),
            "gte" => Ok(Operator::GreaterThanOrEqual),
            "lt" => Ok(Operator::LessThan),
            "lte" => Ok(Operator::LessThanOrEqual),
            "in" | "contained_in" => Ok(Operator::ContainedIn),
            "nin" | "not_contained_in" => Ok(Operator::NotContainedIn),
            "all" | "contains_all" => Ok(Operator::ContainsAll),
            "exists" => Ok(Operator::Exists),
            "is_null" => Ok(Operator::IsNull),
            "regex" | "matches" => Ok(Operator::Matches),
            "near" => Ok(Operator::Near),
            "within_radians" | "max_distance" => Ok(Operator::WithinRadians),
            "related_to" => Ok(Operator::RelatedTo),
            other => Err(RecordLayerError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// A single compiled constraint: an operator bound to a canonical field name
/// and a validated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    field: String,
    operator: Operator,
    value: Value,
}

impl Constraint {
    /// Compiles a `(field, operator, value)` triple, validating
    /// operator/value compatibility. The field name goes through the default
    /// canonicalization.
    pub fn compile(
        field: impl Into<String>,
        operator: Operator,
        value: Value,
    ) -> RecordLayerResult<Self> {
        Self::compile_with(field, operator, value, canonical_field_name)
    }

    /// Compiles with a caller-supplied field canonicalization function.
    pub fn compile_with(
        field: impl Into<String>,
        operator: Operator,
        value: Value,
        canonicalize: fn(&str) -> String,
    ) -> RecordLayerResult<Self> {
        let field = canonicalize(&field.into());
        let value = validate(&field, operator, value)?;

        Ok(Self { field, operator, value })
    }

    /// The canonical field name this constraint is bound to.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Writes this constraint into a filter map, deep-merging with whatever
    /// is already present for the field.
    ///
    /// Conflicting operators on the same field coexist as sibling keys;
    /// duplicate identical field/operator pairs are last-write-wins. An
    /// equality constraint replaces the whole entry for its field.
    fn merge_into(&self, filter: &mut FilterMap) {
        match self.operator {
            Operator::Equal => {
                filter.insert(self.field.clone(), self.value.clone());
            }
            Operator::RelatedTo => {
                // Relation membership lives under a reserved top-level key
                // carrying the owning pointer and the relation field.
                filter.insert(
                    RELATED_TO_KEY.to_string(),
                    json!({ "object": self.value, "key": self.field }),
                );
            }
            Operator::IsNull => {
                let exists = !self.value.as_bool().unwrap_or(false);
                deep_merge_entry(filter, &self.field, "$exists", json!(exists));
            }
            _ => {
                let key = self
                    .operator
                    .wire_key()
                    .expect("non-equality operators carry a wire key");
                deep_merge_entry(filter, &self.field, key, self.value.clone());
            }
        }
    }
}

fn deep_merge_entry(filter: &mut FilterMap, field: &str, key: &str, value: Value) {
    let slot = filter
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    // An earlier bare-equality entry is replaced by the operator map.
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }

    if let Value::Object(existing) = slot {
        let op_slot = existing.entry(key.to_string()).or_insert(Value::Null);
        match (op_slot, value) {
            // Both sides are maps for the same operator key: merge their
            // keys rather than clobbering.
            (Value::Object(old), Value::Object(new)) => {
                for (k, v) in new {
                    old.insert(k, v);
                }
            }
            (op_slot, value) => *op_slot = value,
        }
    }
}

/// Validates operator/value compatibility and applies the documented
/// coercions, returning the canonical constraint value.
fn validate(field: &str, operator: Operator, value: Value) -> RecordLayerResult<Value> {
    match operator {
        Operator::Exists | Operator::IsNull => {
            if value.is_boolean() {
                Ok(value)
            } else {
                Err(RecordLayerError::InvalidConstraint(format!(
                    "{field}: presence checks require a boolean value"
                )))
            }
        }
        Operator::ContainedIn | Operator::NotContainedIn | Operator::ContainsAll => {
            // Scalars are coerced to single-element lists.
            match value {
                Value::Array(_) => Ok(value),
                scalar => Ok(Value::Array(vec![scalar])),
            }
        }
        Operator::Matches => {
            if value.is_string() {
                Ok(value)
            } else {
                Err(RecordLayerError::InvalidConstraint(format!(
                    "{field}: regex constraints require a string pattern"
                )))
            }
        }
        Operator::Near => match GeoPoint::from_value(&value) {
            Some(_) => Ok(value),
            None => Err(RecordLayerError::InvalidConstraint(format!(
                "{field}: geo-radius constraints require a geo-point value"
            ))),
        },
        Operator::WithinRadians => {
            if value.is_number() {
                Ok(value)
            } else {
                Err(RecordLayerError::InvalidConstraint(format!(
                    "{field}: distance bounds require a numeric value"
                )))
            }
        }
        Operator::RelatedTo => match pointer_to(&value) {
            Some(pointer) => Ok(pointer.to_value()),
            None => Err(RecordLayerError::InvalidConstraint(format!(
                "{field}: relation constraints require a record reference"
            ))),
        },
        _ => Ok(value),
    }
}

/// Deep-merges compiled constraints into a single filter map keyed by remote
/// field name.
pub fn merge(constraints: &[Constraint]) -> FilterMap {
    let mut filter = FilterMap::new();
    for constraint in constraints {
        constraint.merge_into(&mut filter);
    }

    filter
}

/// Wraps already-compiled filter maps as a single compound-OR node.
///
/// Inputs that are themselves pure `$or` maps contribute their branches
/// directly, so repeated combination flattens into one node holding N
/// branches rather than nesting OR-of-OR.
pub fn combine_or(filters: Vec<FilterMap>) -> FilterMap {
    let mut branches = Vec::with_capacity(filters.len());

    for filter in filters {
        let is_pure_or = filter.len() == 1 && filter.contains_key(OR_KEY);
        if is_pure_or {
            if let Some(Value::Array(inner)) = filter.get(OR_KEY) {
                branches.extend(inner.iter().cloned());
                continue;
            }
        }

        branches.push(Value::Object(filter));
    }

    let mut combined = FilterMap::new();
    combined.insert(OR_KEY.to_string(), Value::Array(branches));
    combined
}

/// Typed constructors for common constraints, in the manner of a fluent DSL.
///
/// Constructors whose operator accepts any value are infallible; the rest
/// validate like [`Constraint::compile`].
pub struct Filter;

impl Filter {
    /// Exact-match constraint.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::Equal, value.into())
            .expect("equality accepts any value")
    }

    /// Not-equal constraint.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::NotEqual, value.into())
            .expect("inequality accepts any value")
    }

    /// Strict lower-bound constraint.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::GreaterThan, value.into())
            .expect("comparisons accept any value")
    }

    /// Inclusive lower-bound constraint.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::GreaterThanOrEqual, value.into())
            .expect("comparisons accept any value")
    }

    /// Strict upper-bound constraint.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::LessThan, value.into())
            .expect("comparisons accept any value")
    }

    /// Inclusive upper-bound constraint.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::LessThanOrEqual, value.into())
            .expect("comparisons accept any value")
    }

    /// Membership constraint; a scalar value becomes a single-element list.
    pub fn contained_in(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::ContainedIn, value.into())
            .expect("membership coerces scalars")
    }

    /// Exclusion constraint; a scalar value becomes a single-element list.
    pub fn not_contained_in(field: impl Into<String>, value: impl Into<Value>) -> Constraint {
        Constraint::compile(field, Operator::NotContainedIn, value.into())
            .expect("membership coerces scalars")
    }

    /// Presence constraint.
    pub fn exists(field: impl Into<String>, present: bool) -> Constraint {
        Constraint::compile(field, Operator::Exists, Value::Bool(present))
            .expect("boolean by construction")
    }

    /// Regular-expression constraint.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Constraint {
        Constraint::compile(field, Operator::Matches, Value::String(pattern.into()))
            .expect("string by construction")
    }

    /// Geo-radius constraint.
    pub fn near(field: impl Into<String>, point: GeoPoint) -> Constraint {
        Constraint::compile(field, Operator::Near, point.to_value())
            .expect("geo-point by construction")
    }

    /// Relation-membership constraint: records related to `owner` through
    /// the given relation field.
    pub fn related_to(field: impl Into<String>, owner: Pointer) -> Constraint {
        Constraint::compile(field, Operator::RelatedTo, owner.to_value())
            .expect("pointer by construction")
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification: a remote field name and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    /// The wire encoding: the field name, `-`-prefixed for descending order.
    pub fn to_param(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("-{}", self.field),
        }
    }
}

/// A structured query over one record type.
///
/// Encapsulates compiled constraints, compound-OR branches, sorting,
/// pagination and projection. Use [`QueryBuilder`] for construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Compiled constraints, AND-combined by [`merge`].
    pub constraints: Vec<Constraint>,
    /// Alternative filter maps, OR-combined with each other.
    pub or_branches: Vec<FilterMap>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of records to skip.
    pub skip: Option<usize>,
    /// Sort specification.
    pub order: Option<Sort>,
    /// Remote field names to project; empty means all.
    pub keys: Vec<String>,
    /// Pointer fields the server should expand inline.
    pub include: Vec<String>,
    /// Whether to request a result count alongside the records.
    pub count: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Compiles this query's filter object.
    ///
    /// Constraints merge into one map; when OR branches are present the
    /// merged map joins them as one more branch of a flattened `$or` node.
    pub fn filter(&self) -> FilterMap {
        let merged = merge(&self.constraints);
        if self.or_branches.is_empty() {
            return merged;
        }

        let mut branches = self.or_branches.clone();
        if !merged.is_empty() {
            branches.push(merged);
        }

        combine_or(branches)
    }

    /// Produces the wire query-parameter object.
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();

        let filter = self.filter();
        if !filter.is_empty() {
            params.insert("where".to_string(), Value::Object(filter));
        }
        if let Some(order) = &self.order {
            params.insert("order".to_string(), Value::String(order.to_param()));
        }
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), json!(limit));
        }
        if let Some(skip) = self.skip {
            params.insert("skip".to_string(), json!(skip));
        }
        if !self.keys.is_empty() {
            params.insert("keys".to_string(), Value::String(self.keys.join(",")));
        }
        if !self.include.is_empty() {
            params.insert("include".to_string(), Value::String(self.include.join(",")));
        }
        if self.count {
            params.insert("count".to_string(), json!(1));
        }

        Value::Object(params)
    }
}

/// Fluent builder for [`Query`] values.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Adds a compiled constraint.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.query.constraints.push(constraint);
        self
    }

    /// Adds an alternative branch; all branches OR-combine.
    pub fn or(mut self, branch: FilterMap) -> Self {
        self.query.or_branches.push(branch);
        self
    }

    /// Sets the maximum number of records to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of records to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Sets the sort field and direction.
    pub fn order(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.order = Some(Sort {
            field: canonical_field_name(&field.into()),
            direction,
        });
        self
    }

    /// Restricts returned fields to the given remote field names.
    pub fn keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.query.keys = keys.into_iter().collect();
        self
    }

    /// Asks the server to expand the given pointer fields inline.
    pub fn include(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.query.include = fields.into_iter().collect();
        self
    }

    /// Requests a result count alongside the records.
    pub fn count(mut self) -> Self {
        self.query.count = true;
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compile_then_merge_roundtrips() {
        let constraint = Constraint::compile("play_count", Operator::GreaterThan, json!(10))
            .unwrap();
        let filter = merge(&[constraint]);

        assert_eq!(Value::Object(filter), json!({"playCount": {"$gt": 10}}));
    }

    #[test]
    fn equality_is_bare() {
        let filter = merge(&[Filter::eq("title", "So What")]);
        assert_eq!(Value::Object(filter), json!({"title": "So What"}));
    }

    #[test]
    fn identifier_field_canonicalizes() {
        let filter = merge(&[Filter::eq("id", "abc123")]);
        assert_eq!(Value::Object(filter), json!({"objectId": "abc123"}));
    }

    #[test]
    fn bounds_coexist_as_siblings() {
        let filter = merge(&[
            Filter::gte("play_count", 10),
            Filter::lt("play_count", 100),
        ]);

        assert_eq!(
            Value::Object(filter),
            json!({"playCount": {"$gte": 10, "$lt": 100}})
        );
    }

    #[test]
    fn duplicate_pair_is_last_write_wins() {
        let filter = merge(&[Filter::gt("play_count", 10), Filter::gt("play_count", 20)]);
        assert_eq!(Value::Object(filter), json!({"playCount": {"$gt": 20}}));
    }

    #[test]
    fn contained_in_coerces_scalars() {
        let filter = merge(&[Filter::contained_in("genre", "jazz")]);
        assert_eq!(Value::Object(filter), json!({"genre": {"$in": ["jazz"]}}));
    }

    #[test]
    fn exists_requires_boolean() {
        let result = Constraint::compile("genre", Operator::Exists, json!("yes"));
        assert!(matches!(result, Err(RecordLayerError::InvalidConstraint(_))));
    }

    #[test]
    fn is_null_inverts_exists() {
        let constraint = Constraint::compile("genre", Operator::IsNull, json!(true)).unwrap();
        let filter = merge(&[constraint]);

        assert_eq!(Value::Object(filter), json!({"genre": {"$exists": false}}));
    }

    #[test]
    fn unknown_operator_token() {
        let result = "between".parse::<Operator>();
        assert!(matches!(result, Err(RecordLayerError::UnsupportedOperator(t)) if t == "between"));
    }

    #[test]
    fn geo_radius_merges_with_distance_bound() {
        let point = GeoPoint::new(40.0, -30.0);
        let near = Filter::near("location", point);
        let bound =
            Constraint::compile("location", Operator::WithinRadians, json!(0.5)).unwrap();

        let filter = merge(&[near, bound]);
        assert_eq!(
            Value::Object(filter),
            json!({"location": {
                "$nearSphere": {"__type": "GeoPoint", "latitude": 40.0, "longitude": -30.0},
                "$maxDistanceInRadians": 0.5,
            }})
        );
    }

    #[test]
    fn related_to_uses_reserved_key() {
        let filter = merge(&[Filter::related_to("likes", Pointer::new("Post", "p1"))]);

        assert_eq!(
            Value::Object(filter),
            json!({"$relatedTo": {
                "object": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
                "key": "likes",
            }})
        );
    }

    #[test]
    fn combine_or_counts_branches() {
        let m1 = merge(&[Filter::eq("genre", "jazz")]);
        let m2 = merge(&[Filter::eq("genre", "blues")]);
        let m3 = merge(&[Filter::gt("play_count", 100)]);

        let combined = combine_or(vec![m1, m2, m3]);
        let branches = combined.get(OR_KEY).unwrap().as_array().unwrap();
        assert_eq!(branches.len(), 3);
    }

    #[test]
    fn combine_or_flattens() {
        let m1 = merge(&[Filter::eq("genre", "jazz")]);
        let m2 = merge(&[Filter::eq("genre", "blues")]);
        let m3 = merge(&[Filter::eq("genre", "bop")]);
        let m4 = merge(&[Filter::gt("play_count", 100)]);

        let first = combine_or(vec![m1, m2, m3]);
        let combined = combine_or(vec![first, m4]);

        let branches = combined.get(OR_KEY).unwrap().as_array().unwrap();
        assert_eq!(branches.len(), 4);
        for branch in branches {
            assert!(branch.as_object().unwrap().get(OR_KEY).is_none());
        }
    }

    #[test]
    fn query_params_wire_shape() {
        let query = Query::builder()
            .constraint(Filter::eq("genre", "jazz"))
            .order("recorded_at", SortDirection::Desc)
            .limit(25)
            .skip(50)
            .count()
            .build();

        assert_eq!(
            query.to_params(),
            json!({
                "where": {"genre": "jazz"},
                "order": "-recordedAt",
                "limit": 25,
                "skip": 50,
                "count": 1,
            })
        );
    }

    #[test]
    fn query_with_or_branches_joins_constraints_as_branch() {
        let query = Query::builder()
            .constraint(Filter::eq("genre", "jazz"))
            .or(merge(&[Filter::eq("genre", "blues")]))
            .build();

        let filter = query.filter();
        let branches = filter.get(OR_KEY).unwrap().as_array().unwrap();
        assert_eq!(branches.len(), 2);
    }
}
