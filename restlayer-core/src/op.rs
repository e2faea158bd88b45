//! Atomic operation codec and resolution.
//!
//! The store expresses partial updates as tagged operation hashes carrying an
//! `__op` discriminator (`Increment`, `Add`, `AddUnique`, `Remove`, `Delete`,
//! `AddRelation`, `RemoveRelation`). This module decodes and encodes those
//! hashes and resolves them against a current attribute value, which is how
//! server pre-save-hook responses are folded back into local state without a
//! full refetch.

use serde_json::{Map, Value, json};

/// The `__op` discriminator key on operation hashes.
pub const OP_KEY: &str = "__op";

/// A server-interpreted partial-update instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Adds `amount` to a numeric field.
    Increment { amount: f64 },
    /// Appends objects to an array field.
    Add { objects: Vec<Value> },
    /// Appends objects to an array field, skipping ones already present.
    AddUnique { objects: Vec<Value> },
    /// Removes all occurrences of the given objects from an array field.
    Remove { objects: Vec<Value> },
    /// Unsets the field entirely.
    Delete,
    /// Adds references to a relation's join table.
    AddRelation { objects: Vec<Value> },
    /// Removes references from a relation's join table.
    RemoveRelation { objects: Vec<Value> },
}

impl Operation {
    /// Decodes an operation hash.
    ///
    /// Returns `None` for values that are not operation hashes at all.
    /// A hash with an unrecognized `__op` string also returns `None` — the
    /// caller stores such values unchanged rather than failing.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let op = map.get(OP_KEY)?.as_str()?;

        match op {
            "Increment" => Some(Operation::Increment {
                amount: map.get("amount").and_then(Value::as_f64).unwrap_or(1.0),
            }),
            "Add" => Some(Operation::Add { objects: objects_of(map) }),
            "AddUnique" => Some(Operation::AddUnique { objects: objects_of(map) }),
            "Remove" => Some(Operation::Remove { objects: objects_of(map) }),
            "Delete" => Some(Operation::Delete),
            "AddRelation" => Some(Operation::AddRelation { objects: objects_of(map) }),
            "RemoveRelation" => Some(Operation::RemoveRelation { objects: objects_of(map) }),
            other => {
                tracing::debug!(op = other, "passing through unknown operation hash");
                None
            }
        }
    }

    /// Encodes this operation as its wire hash.
    pub fn to_value(&self) -> Value {
        match self {
            Operation::Increment { amount } => {
                json!({ OP_KEY: "Increment", "amount": amount })
            }
            Operation::Add { objects } => json!({ OP_KEY: "Add", "objects": objects }),
            Operation::AddUnique { objects } => {
                json!({ OP_KEY: "AddUnique", "objects": objects })
            }
            Operation::Remove { objects } => json!({ OP_KEY: "Remove", "objects": objects }),
            Operation::Delete => json!({ OP_KEY: "Delete" }),
            Operation::AddRelation { objects } => {
                json!({ OP_KEY: "AddRelation", "objects": objects })
            }
            Operation::RemoveRelation { objects } => {
                json!({ OP_KEY: "RemoveRelation", "objects": objects })
            }
        }
    }

    /// Resolves this operation against a current attribute value, producing
    /// the value the field holds after the operation is applied.
    ///
    /// `Increment` treats an absent or non-numeric current value as zero.
    /// The list operations treat an absent current value as an empty list.
    /// Relation operations resolve like their array counterparts — a relation
    /// read is decoded as a full replacement of the local reference list.
    pub fn apply(&self, current: Option<&Value>) -> Value {
        match self {
            Operation::Increment { amount } => {
                let base = current.and_then(Value::as_f64).unwrap_or(0.0);
                number(base + amount)
            }
            Operation::Add { objects } => {
                let mut items = current_items(current);
                items.extend(objects.iter().cloned());
                Value::Array(items)
            }
            Operation::AddUnique { objects } | Operation::AddRelation { objects } => {
                let mut items = current_items(current);
                for object in objects {
                    if !items.contains(object) {
                        items.push(object.clone());
                    }
                }
                Value::Array(items)
            }
            Operation::Remove { objects } | Operation::RemoveRelation { objects } => {
                let items = current_items(current)
                    .into_iter()
                    .filter(|item| !objects.contains(item))
                    .collect();
                Value::Array(items)
            }
            Operation::Delete => Value::Null,
        }
    }
}

fn objects_of(map: &Map<String, Value>) -> Vec<Value> {
    map.get("objects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn current_items(current: Option<&Value>) -> Vec<Value> {
    match current {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

// Keeps integral results integral on the wire: 10 + 5 is 15, not 15.0.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < (i64::MAX as f64) {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn increment_resolves_arithmetically() {
        let op = Operation::from_value(&json!({"__op": "Increment", "amount": 5})).unwrap();

        assert_eq!(op.apply(Some(&json!(10))), json!(15));
        assert_eq!(op.apply(None), json!(5));
        assert_eq!(op.apply(Some(&json!("not a number"))), json!(5));
    }

    #[test]
    fn increment_defaults_to_one() {
        let op = Operation::from_value(&json!({"__op": "Increment"})).unwrap();
        assert_eq!(op.apply(Some(&json!(2))), json!(3));
    }

    #[test]
    fn increment_keeps_floats() {
        let op = Operation::Increment { amount: 0.5 };
        assert_eq!(op.apply(Some(&json!(1))), json!(1.5));
    }

    #[test]
    fn add_appends() {
        let op = Operation::Add { objects: vec![json!("b"), json!("a")] };
        assert_eq!(op.apply(Some(&json!(["a"]))), json!(["a", "b", "a"]));
    }

    #[test]
    fn add_unique_skips_present() {
        let op = Operation::AddUnique { objects: vec![json!("b"), json!("a")] };
        assert_eq!(op.apply(Some(&json!(["a"]))), json!(["a", "b"]));
    }

    #[test]
    fn remove_filters_all_occurrences() {
        let op = Operation::Remove { objects: vec![json!("a")] };
        assert_eq!(op.apply(Some(&json!(["a", "b", "a"]))), json!(["b"]));
    }

    #[test]
    fn delete_resolves_to_null() {
        let op = Operation::from_value(&json!({"__op": "Delete"})).unwrap();
        assert_eq!(op.apply(Some(&json!("anything"))), Value::Null);
    }

    #[test]
    fn relation_ops_resolve_like_list_ops() {
        let p1 = json!({"__type": "Pointer", "className": "Song", "objectId": "s1"});
        let p2 = json!({"__type": "Pointer", "className": "Song", "objectId": "s2"});

        let add = Operation::AddRelation { objects: vec![p1.clone(), p1.clone()] };
        assert_eq!(add.apply(None), json!([p1.clone()]));

        let remove = Operation::RemoveRelation { objects: vec![p1.clone()] };
        assert_eq!(
            remove.apply(Some(&json!([p1, p2.clone()]))),
            json!([p2])
        );
    }

    #[test]
    fn unknown_op_is_not_an_operation() {
        assert_eq!(Operation::from_value(&json!({"__op": "Batch", "ops": []})), None);
        assert_eq!(Operation::from_value(&json!({"amount": 5})), None);
        assert_eq!(Operation::from_value(&json!(17)), None);
    }

    #[test]
    fn wire_roundtrip() {
        let op = Operation::Increment { amount: 5.0 };
        assert_eq!(op.to_value(), json!({"__op": "Increment", "amount": 5.0}));

        let op = Operation::AddRelation { objects: vec![json!({"x": 1})] };
        assert_eq!(
            Operation::from_value(&op.to_value()),
            Some(op)
        );
    }
}
