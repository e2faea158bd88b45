//! Convenient re-exports of commonly used types from restlayer.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use restlayer::prelude::*;
//! ```

pub use restlayer_core::{
    error::{RecordLayerError, RecordLayerResult},
    op::Operation,
    query::{Constraint, Filter, FilterMap, Operator, Query, QueryBuilder, Sort, SortDirection, combine_or, merge},
    record::Record,
    registry::{SchemaRegistry, SchemaRegistryBuilder},
    relation::{ArrayProxy, Relation},
    schema::{AttributeDef, AttributeKind, ClassSchema, DefaultValue, canonical_field_name},
    store::{ChangeRequest, RecordStore, SaveOptions},
    transport::{Method, Response, Transport},
    value::{Bytes, Date, File, GeoPoint, Pointer},
};
