//! Main restlayer crate providing a typed record layer over JSON REST
//! document stores.
//!
//! This crate is the primary entry point for users of the restlayer project.
//! It re-exports the core types and functionality from the sub-crates and
//! provides convenient access to the bundled in-memory transport.
//!
//! # Features
//!
//! - **Typed record schemas** - Declare attribute tables once, read and write
//!   through generic get/set entry points with coercion and change tracking
//! - **Composable queries** - Compile field/operator constraints into the
//!   store's JSON filter format, with compound OR support
//! - **Minimal updates** - Dirty tracking reconciles local edits into the
//!   smallest set of create/update/relation-delta requests
//! - **Injected transport** - The HTTP boundary is a trait; the bundled
//!   in-memory server stands in for the remote store in tests
//!
//! # Quick Start
//!
//! ```ignore
//! use restlayer::{memory::MemoryServer, prelude::*};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::builder()
//!         .register(
//!             ClassSchema::new("Song")
//!                 .with(AttributeDef::new("title", AttributeKind::String).required())?
//!                 .with(AttributeDef::new("play_count", AttributeKind::Integer))?,
//!         )
//!         .build();
//!     let store = RecordStore::new(MemoryServer::new(), registry.clone());
//!
//!     // Create
//!     let mut song = Record::new(registry.get("Song").unwrap());
//!     song.set("title", json!("So What"), true);
//!     store.save(&mut song, SaveOptions::default()).await?;
//!     assert!(song.object_id().is_some());
//!
//!     // Query
//!     let jazz = store
//!         .find(
//!             &registry.get("Song").unwrap(),
//!             &Query::builder()
//!                 .constraint(Filter::eq("title", "So What"))
//!                 .build(),
//!         )
//!         .await?;
//!     assert_eq!(jazz.len(), 1);
//!
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub use restlayer_core::{
    error, op, query, record, registry, relation, schema, store, transport, value,
};

// Re-export the wire value type for convenience
pub use serde_json;

/// In-memory transport implementations.
pub mod memory {
    pub use restlayer_memory::{MemoryServer, MemoryServerBuilder};
}
