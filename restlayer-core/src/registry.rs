//! Schema registry: remote type names mapped to local schemas.
//!
//! Polymorphic pointer payloads name their type as a string, so decoding
//! needs a lookup from remote class name to [`ClassSchema`]. The registry is
//! explicit and injected — populated once at startup through the builder,
//! read-only thereafter.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::{record::Record, schema::ClassSchema, value::Pointer};

/// An immutable mapping from remote class names to schemas.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ClassSchema>>,
}

impl SchemaRegistry {
    /// Starts a registry builder.
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Looks up the schema registered for a remote class name.
    pub fn get(&self, class_name: &str) -> Option<Arc<ClassSchema>> {
        self.schemas.get(class_name).cloned()
    }

    /// Decodes a record body for a known class; the registered schema drives
    /// attribute-name translation.
    ///
    /// Unknown class names produce `None` — callers fall back to treating
    /// the payload as an opaque pointer.
    pub fn decode(&self, class_name: &str, body: &Value) -> Option<Record> {
        let schema = self.get(class_name)?;
        Some(Record::decode(schema, body))
    }

    /// Decodes an arbitrary reference payload: a pointer hash becomes a
    /// pointer instance of the registered type when one exists.
    pub fn decode_pointer(&self, value: &Value) -> Option<Record> {
        let Pointer { class_name, object_id } = Pointer::from_value(value)?;
        let schema = self.get(&class_name)?;

        Some(Record::pointer(schema, object_id))
    }
}

/// Builder consumed into an immutable [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: HashMap<String, Arc<ClassSchema>>,
}

impl SchemaRegistryBuilder {
    /// Registers a schema under its class name.
    pub fn register(mut self, schema: ClassSchema) -> Self {
        self.schemas
            .insert(schema.name().to_string(), Arc::new(schema));
        self
    }

    /// Freezes the builder into a shareable registry.
    pub fn build(self) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry { schemas: self.schemas })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registered_class_decodes() {
        let registry = SchemaRegistry::builder()
            .register(ClassSchema::new("Song"))
            .build();

        let record = registry
            .decode("Song", &json!({"objectId": "s1", "title": "So What"}))
            .unwrap();
        assert_eq!(record.class_name(), "Song");
        assert_eq!(record.object_id(), Some("s1"));
    }

    #[test]
    fn unknown_class_is_none() {
        let registry = SchemaRegistry::builder().build();
        assert!(registry.decode("Song", &json!({})).is_none());
    }

    #[test]
    fn pointer_payload_decodes_to_pointer_instance() {
        let registry = SchemaRegistry::builder()
            .register(ClassSchema::new("Song"))
            .build();

        let record = registry
            .decode_pointer(&json!({
                "__type": "Pointer",
                "className": "Song",
                "objectId": "s1",
            }))
            .unwrap();
        assert!(record.is_pointer());
    }
}
