//! A typed record layer over JSON REST document stores.
//!
//! This crate is the core of the restlayer project and provides:
//!
//! - **Constraint compiler** ([`query`]) - Field/operator constraints compiled into JSON filter maps
//! - **Schema declarations** ([`schema`]) - Typed attribute tables with remote field naming
//! - **Record instances** ([`record`]) - Attribute storage with per-attribute change tracking
//! - **Collection proxies** ([`relation`]) - Change-tracked array and join-table collections
//! - **Atomic operations** ([`op`]) - The store's partial-update wire instructions
//! - **Wire values** ([`value`]) - Pointer, date, geo-point, bytes and file encodings
//! - **Transport abstraction** ([`transport`]) - The injected request/response boundary
//! - **Schema registry** ([`registry`]) - Remote type names resolved to local schemas
//! - **Record store** ([`store`]) - Query execution and the persistence reconciler
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use restlayer_core::{
//!     record::Record,
//!     registry::SchemaRegistry,
//!     schema::{AttributeDef, AttributeKind, ClassSchema},
//!     store::{RecordStore, SaveOptions},
//! };
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::builder()
//!     .register(
//!         ClassSchema::new("Song")
//!             .with(AttributeDef::new("title", AttributeKind::String).required())?,
//!     )
//!     .build();
//!
//! let store = RecordStore::new(transport, registry.clone());
//! let mut song = Record::new(registry.get("Song").unwrap());
//! song.set("title", json!("So What"), true);
//! store.save(&mut song, SaveOptions::default()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as restlayer_core;

pub mod error;
pub mod op;
pub mod query;
pub mod record;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod store;
pub mod transport;
pub mod value;
