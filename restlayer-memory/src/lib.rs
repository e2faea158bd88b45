//! In-memory transport backend for restlayer.
//!
//! Provides [`MemoryServer`], a [`restlayer_core::transport::Transport`]
//! implementation that mimics the remote store: request routing, identifier
//! and timestamp minting, server-side atomic operation handling, relation
//! join tables, and full filter-map query evaluation.

mod evaluator;
mod server;

pub use server::{MemoryServer, MemoryServerBuilder};
