//! Record type schemas: typed attribute declarations and field naming.
//!
//! A [`ClassSchema`] maps local attribute names to remote field names and data
//! kinds. Declarations are made once at startup and consulted by the generic
//! get/set entry points on [`crate::record::Record`], so no per-type code
//! generation is involved.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{RecordLayerError, RecordLayerResult};

/// The remote field name reserved for record identifiers.
pub const OBJECT_ID: &str = "objectId";
/// The remote field name for the creation timestamp.
pub const CREATED_AT: &str = "createdAt";
/// The remote field name for the last-update timestamp.
pub const UPDATED_AT: &str = "updatedAt";
/// The remote field name for the access-control list.
pub const ACL: &str = "ACL";

/// Data kinds an attribute can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Array,
    Object,
    /// A reference to a single foreign record, stored inline as a pointer.
    Pointer,
    /// A many-to-many association backed by an implicit join table.
    Relation,
    /// Access-control list hash.
    Acl,
    /// Opaque binary payload in base64 wire form.
    Bytes,
    GeoPoint,
    File,
}

/// Default value for an attribute: a literal, or a zero-argument generator
/// invoked lazily per instance.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Literal(Value),
    Generator(fn() -> Value),
}

impl DefaultValue {
    /// Produces the default value, invoking the generator if needed.
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Generator(generator) => generator(),
        }
    }
}

/// A single attribute declaration on a record type.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    /// Local attribute name.
    pub name: String,
    /// Remote field name written on the wire.
    pub remote_name: String,
    /// Declared data kind.
    pub kind: AttributeKind,
    /// Whether the attribute must be present before a save.
    pub required: bool,
    /// Default applied when the attribute is unset.
    pub default: Option<DefaultValue>,
    /// Optional enumerated-value restriction.
    pub one_of: Option<Vec<Value>>,
    /// Foreign record type for pointer and relation kinds.
    pub target_class: Option<String>,
    /// Custom coercer for kinds the built-in table does not cover.
    pub typecast: Option<fn(Value) -> Value>,
}

impl AttributeDef {
    /// Creates a declaration with the default remote name (the canonicalized
    /// local name) and no options.
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        let name = name.into();
        let remote_name = canonical_field_name(&name);

        Self {
            name,
            remote_name,
            kind,
            required: false,
            default: None,
            one_of: None,
            target_class: None,
            typecast: None,
        }
    }

    /// Overrides the remote field name.
    pub fn remote(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = remote_name.into();
        self
    }

    /// Marks the attribute required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets a literal default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    /// Sets a generated default, invoked lazily per instance.
    pub fn default_with(mut self, generator: fn() -> Value) -> Self {
        self.default = Some(DefaultValue::Generator(generator));
        self
    }

    /// Restricts the attribute to an enumerated set of values.
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.one_of = Some(values);
        self
    }

    /// Sets the foreign record type for pointer and relation kinds.
    pub fn target(mut self, class_name: impl Into<String>) -> Self {
        self.target_class = Some(class_name.into());
        self
    }

    /// Installs a custom coercer invoked in place of the built-in table.
    pub fn typecast(mut self, cast: fn(Value) -> Value) -> Self {
        self.typecast = Some(cast);
        self
    }
}

/// A named record type schema.
///
/// Invariant: every attribute name maps to exactly one remote field name and
/// one data kind, and remote field names are unique within the type. The
/// reserved base fields (`objectId`, `createdAt`, `updatedAt`, `ACL`) are
/// seeded on construction and may be redeclared only on a schema built with
/// [`ClassSchema::root`].
#[derive(Debug, Clone)]
pub struct ClassSchema {
    name: String,
    attributes: BTreeMap<String, AttributeDef>,
    remote_to_local: BTreeMap<String, String>,
    allow_base_override: bool,
}

impl ClassSchema {
    /// Creates a schema for the given record type with the base fields seeded.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_base_override(name, false)
    }

    /// Creates the root type schema, which alone may redeclare base fields.
    pub fn root(name: impl Into<String>) -> Self {
        Self::with_base_override(name, true)
    }

    fn with_base_override(name: impl Into<String>, allow_base_override: bool) -> Self {
        let mut schema = Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            remote_to_local: BTreeMap::new(),
            allow_base_override,
        };

        for def in [
            AttributeDef::new("id", AttributeKind::String).remote(OBJECT_ID),
            AttributeDef::new("created_at", AttributeKind::Date).remote(CREATED_AT),
            AttributeDef::new("updated_at", AttributeKind::Date).remote(UPDATED_AT),
            AttributeDef::new("acl", AttributeKind::Acl).remote(ACL),
        ] {
            schema.insert(def);
        }

        schema
    }

    /// Returns the record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an attribute declaration.
    ///
    /// Fails with [`RecordLayerError::DuplicateProperty`] if the attribute
    /// name or its remote field name collides with an existing declaration.
    /// Base fields count as existing unless this is the root type schema.
    pub fn declare(&mut self, def: AttributeDef) -> RecordLayerResult<&mut Self> {
        let base = is_base_field(&def.remote_name);
        if base && self.allow_base_override {
            self.insert(def);
            return Ok(self);
        }

        if self.attributes.contains_key(&def.name) {
            return Err(RecordLayerError::DuplicateProperty {
                class: self.name.clone(),
                attribute: def.name,
            });
        }
        if self.remote_to_local.contains_key(&def.remote_name) {
            return Err(RecordLayerError::DuplicateProperty {
                class: self.name.clone(),
                attribute: def.remote_name,
            });
        }

        self.insert(def);
        Ok(self)
    }

    /// Builder-style variant of [`declare`](Self::declare).
    pub fn with(mut self, def: AttributeDef) -> RecordLayerResult<Self> {
        self.declare(def)?;
        Ok(self)
    }

    fn insert(&mut self, def: AttributeDef) {
        // A base-field redeclaration replaces the seeded entry wholesale.
        if let Some(previous) = self.remote_to_local.remove(&def.remote_name) {
            self.attributes.remove(&previous);
        }

        self.remote_to_local
            .insert(def.remote_name.clone(), def.name.clone());
        self.attributes.insert(def.name.clone(), def);
    }

    /// Looks up a declaration by local attribute name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    /// Looks up a declaration by remote field name.
    pub fn by_remote(&self, remote_name: &str) -> Option<&AttributeDef> {
        self.remote_to_local
            .get(remote_name)
            .and_then(|local| self.attributes.get(local))
    }

    /// Iterates all declarations in local-name order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }
}

/// Whether a remote field name is one of the reserved base fields.
pub fn is_base_field(remote_name: &str) -> bool {
    matches!(remote_name, OBJECT_ID | CREATED_AT | UPDATED_AT | ACL)
}

/// Canonicalizes a local field name for the wire: lower camel case, with the
/// identifier field mapped to the store's reserved `objectId` name.
pub fn canonical_field_name(name: &str) -> String {
    if name == "id" || name == "object_id" {
        return OBJECT_ID.to_string();
    }

    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }

    out
}
