//! Filter-map evaluation for in-memory record filtering.
//!
//! This module provides the evaluation engine for compiled query filters,
//! enabling the in-memory server to answer the same `where` objects the
//! remote store accepts.

use std::{cmp::Ordering, collections::HashMap};

use serde_json::{Map, Value};

/// Type-erased, comparable representation of JSON values.
///
/// This enum wraps JSON values and provides comparison operations for
/// filtering queries. Numbers normalize to f64; tagged `Date` hashes become
/// their ISO string, which orders correctly in a fixed format.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// Tagged date hash, compared by its ISO string
    Date(&'a str),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(b) => Comparable::Bool(*b),
            Value::Number(n) => Comparable::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Comparable::String(s),
            Value::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Value::Object(map) => {
                if map.get("__type").and_then(Value::as_str) == Some("Date") {
                    if let Some(iso) = map.get("iso").and_then(Value::as_str) {
                        return Comparable::Date(iso);
                    }
                }

                Comparable::Map(
                    map.iter()
                        .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                        .collect::<HashMap<_, _>>(),
                )
            }
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Date(a), Comparable::Date(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Date(a), Comparable::Date(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Looks up the members of a relation join table:
/// `(owner class, owner id, relation field)` to member pointers.
pub(crate) type RelationLookup<'a> = &'a dyn Fn(&str, &str, &str) -> Vec<Value>;

/// Evaluates compiled filter maps against stored record bodies.
pub(crate) struct FilterEvaluator<'a> {
    /// The record type being queried, for `$relatedTo` membership checks.
    class_name: &'a str,
    relations: RelationLookup<'a>,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(class_name: &'a str, relations: RelationLookup<'a>) -> Self {
        Self { class_name, relations }
    }

    /// Whether a stored body matches the filter.
    pub fn matches(&self, body: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$or" => condition
                    .as_array()
                    .map(|branches| {
                        branches.iter().any(|branch| {
                            branch
                                .as_object()
                                .is_some_and(|branch| self.matches(body, branch))
                        })
                    })
                    .unwrap_or(false),
                "$relatedTo" => self.matches_relation(body, condition),
                field => self.matches_field(body.get(field), condition),
            };

            if !matched {
                return false;
            }
        }

        true
    }

    fn matches_relation(&self, body: &Map<String, Value>, condition: &Value) -> bool {
        let Some(condition) = condition.as_object() else {
            return false;
        };
        let (Some(object), Some(key)) = (
            condition.get("object").and_then(Value::as_object),
            condition.get("key").and_then(Value::as_str),
        ) else {
            return false;
        };
        let (Some(owner_class), Some(owner_id)) = (
            object.get("className").and_then(Value::as_str),
            object.get("objectId").and_then(Value::as_str),
        ) else {
            return false;
        };
        let Some(body_id) = body.get("objectId").and_then(Value::as_str) else {
            return false;
        };

        (self.relations)(owner_class, owner_id, key)
            .iter()
            .any(|member| {
                member
                    .as_object()
                    .is_some_and(|member| {
                        member.get("className").and_then(Value::as_str) == Some(self.class_name)
                            && member.get("objectId").and_then(Value::as_str) == Some(body_id)
                    })
            })
    }

    fn matches_field(&self, field_value: Option<&Value>, condition: &Value) -> bool {
        // An operator map applies each operator; anything else is equality.
        if let Some(operators) = condition.as_object() {
            let is_operator_map = operators.keys().any(|key| key.starts_with('$'));
            if is_operator_map {
                // Geo constraints pair $nearSphere with its distance bound.
                if let Some(geo_matched) = self.matches_geo(field_value, operators) {
                    let rest = operators
                        .iter()
                        .filter(|(op, _)| {
                            op.as_str() != "$nearSphere" && op.as_str() != "$maxDistanceInRadians"
                        })
                        .all(|(op, operand)| self.matches_operator(field_value, op, operand));
                    return geo_matched && rest;
                }

                return operators
                    .iter()
                    .all(|(op, operand)| self.matches_operator(field_value, op, operand));
            }
        }

        match field_value {
            Some(value) => Comparable::from(value) == Comparable::from(condition),
            None => condition.is_null(),
        }
    }

    fn matches_operator(&self, field_value: Option<&Value>, op: &str, operand: &Value) -> bool {
        if op == "$exists" {
            let present = field_value.is_some_and(|value| !value.is_null());
            return present == operand.as_bool().unwrap_or(false);
        }

        let Some(value) = field_value else {
            // Absent fields fail every other operator.
            return false;
        };

        match op {
            "$ne" => Comparable::from(value) != Comparable::from(operand),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                match Comparable::from(value).partial_cmp(&Comparable::from(operand)) {
                    Some(ordering) => match op {
                        "$gt" => ordering == Ordering::Greater,
                        "$gte" => ordering != Ordering::Less,
                        "$lt" => ordering == Ordering::Less,
                        "$lte" => ordering != Ordering::Greater,
                        _ => unreachable!(),
                    },
                    None => false,
                }
            }
            "$in" => operand
                .as_array()
                .is_some_and(|candidates| {
                    candidates
                        .iter()
                        .any(|candidate| Comparable::from(value) == Comparable::from(candidate))
                }),
            "$nin" => !operand
                .as_array()
                .is_some_and(|candidates| {
                    candidates
                        .iter()
                        .any(|candidate| Comparable::from(value) == Comparable::from(candidate))
                }),
            "$all" => match (value.as_array(), operand.as_array()) {
                (Some(items), Some(required)) => required.iter().all(|needed| {
                    items
                        .iter()
                        .any(|item| Comparable::from(item) == Comparable::from(needed))
                }),
                _ => false,
            },
            "$regex" => match (value.as_str(), operand.as_str()) {
                (Some(haystack), Some(pattern)) => regex::Regex::new(pattern)
                    .map(|re| re.is_match(haystack))
                    .unwrap_or(false),
                _ => false,
            },
            // A distance bound without $nearSphere constrains nothing.
            "$maxDistanceInRadians" => false,
            other => {
                tracing::debug!(op = other, "unknown filter operator never matches");
                false
            }
        }
    }

    /// Geo constraints need both operator keys at once, so field matching
    /// special-cases them before the per-operator dispatch.
    pub(crate) fn matches_geo(
        &self,
        field_value: Option<&Value>,
        operators: &Map<String, Value>,
    ) -> Option<bool> {
        let center = operators.get("$nearSphere")?;
        let (Some(point), Some(center)) = (
            field_value.and_then(GeoCoordinates::of),
            GeoCoordinates::of(center),
        ) else {
            return Some(false);
        };

        match operators
            .get("$maxDistanceInRadians")
            .and_then(Value::as_f64)
        {
            Some(max) => Some(point.central_angle(&center) <= max),
            None => Some(true),
        }
    }
}

/// Latitude/longitude pair pulled out of a geo-point hash.
pub(crate) struct GeoCoordinates {
    latitude: f64,
    longitude: f64,
}

impl GeoCoordinates {
    fn of(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get("__type").and_then(Value::as_str) != Some("GeoPoint") {
            return None;
        }

        Some(Self {
            latitude: map.get("latitude")?.as_f64()?,
            longitude: map.get("longitude")?.as_f64()?,
        })
    }

    /// Central angle between two points in radians (haversine formula).
    fn central_angle(&self, other: &Self) -> f64 {
        let lat_a = self.latitude.to_radians();
        let lat_b = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let h = (d_lat / 2.0).sin().powi(2)
            + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

        2.0 * h.sqrt().asin()
    }
}
