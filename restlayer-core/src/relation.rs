//! Change-tracked collection proxies.
//!
//! Two families: [`ArrayProxy`] wraps an array-backed collection stored
//! directly on a record's field (an ordered list, usually of pointers), and
//! [`Relation`] wraps a many-to-many association backed by an implicit join
//! table on the server, queried rather than stored inline.
//!
//! Both are lazy: a proxy starts unloaded and materializes on first access;
//! `reset` returns it to unloaded so the next access reloads. The relation
//! proxy additionally tracks pending additions and removals, which the
//! persistence reconciler turns into `AddRelation`/`RemoveRelation` requests.

use serde_json::Value;

use crate::{
    query::{Filter, Query},
    value::{Pointer, pointer_to},
};

/// A change-tracked, array-backed collection stored on a record field.
#[derive(Debug, Clone, Default)]
pub struct ArrayProxy {
    loaded: bool,
    changed: bool,
    /// When set, only record references are accepted; anything else is
    /// dropped with a diagnostic.
    references_only: bool,
    items: Vec<Value>,
}

impl ArrayProxy {
    /// Creates an unloaded proxy. `references_only` collections reject
    /// non-pointer items.
    pub fn new(references_only: bool) -> Self {
        Self {
            loaded: false,
            changed: false,
            references_only,
            items: Vec::new(),
        }
    }

    /// Materializes the proxy with server-provided content, clearing the
    /// changed flag.
    pub fn load(&mut self, items: Vec<Value>) {
        self.items = items;
        self.loaded = true;
        self.changed = false;
    }

    /// Whether local content has been materialized.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether local edits are pending.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// The local ordered content.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Appends items to the local list and marks the collection changed.
    ///
    /// Malformed items are dropped with a warning-level diagnostic, never an
    /// error.
    pub fn add(&mut self, items: Vec<Value>) {
        for item in items {
            if let Some(item) = self.accept(item) {
                self.items.push(item);
                self.changed = true;
            }
        }
        self.loaded = true;
    }

    /// Removes all occurrences of the given items from the local list.
    pub fn remove(&mut self, items: Vec<Value>) {
        let targets: Vec<Value> = items
            .into_iter()
            .filter_map(|item| self.accept(item))
            .collect();
        if targets.is_empty() {
            return;
        }

        let before = self.items.len();
        self.items.retain(|item| !targets.contains(item));
        if self.items.len() != before {
            self.changed = true;
        }
    }

    /// Returns the proxy to the unloaded state, forcing a reload on next
    /// access and discarding local edits.
    pub fn reset(&mut self) {
        self.loaded = false;
        self.changed = false;
        self.items.clear();
    }

    /// Clears the changed flag after a successful persistence.
    pub fn changes_applied(&mut self) {
        self.changed = false;
    }

    fn accept(&self, item: Value) -> Option<Value> {
        if item.is_null() {
            tracing::warn!("dropping null item from collection");
            return None;
        }
        if self.references_only {
            return match pointer_to(&item) {
                Some(pointer) => Some(pointer.to_value()),
                None => {
                    tracing::warn!(?item, "dropping non-reference item from pointer collection");
                    None
                }
            };
        }

        Some(item)
    }
}

/// A change-tracked relation proxy backed by an implicit join table.
///
/// Extends the array semantics with two ordered pending sets. Invariant: an
/// item never appears in both sets; adding an item already pending removal
/// cancels the removal, and vice versa.
#[derive(Debug, Clone)]
pub struct Relation {
    /// The remote field name of the relation on the owning record.
    key: String,
    /// The foreign record type the relation points at.
    target_class: Option<String>,
    proxy: ArrayProxy,
    pending_additions: Vec<Value>,
    pending_removals: Vec<Value>,
}

impl Relation {
    pub fn new(key: impl Into<String>, target_class: Option<String>) -> Self {
        Self {
            key: key.into(),
            target_class,
            proxy: ArrayProxy::new(true),
            pending_additions: Vec::new(),
            pending_removals: Vec::new(),
        }
    }

    /// The remote field name this relation lives under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The foreign record type, when declared.
    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    /// Materializes local content from a server read, which replaces the
    /// reference list wholesale.
    pub fn load(&mut self, items: Vec<Value>) {
        self.proxy.load(items);
    }

    pub fn is_loaded(&self) -> bool {
        self.proxy.is_loaded()
    }

    /// The locally known references.
    pub fn items(&self) -> &[Value] {
        self.proxy.items()
    }

    /// Adds references: appends to the local list and the addition set.
    ///
    /// An item pending removal has its removal cancelled instead of being
    /// recorded as an addition, so an add/remove pair nets out to nothing.
    pub fn add(&mut self, items: Vec<Value>) {
        for item in items {
            let Some(reference) = normalize(&item) else {
                tracing::warn!(?item, "dropping non-reference item from relation");
                continue;
            };

            if self.pending_removals.contains(&reference) {
                self.pending_removals.retain(|pending| pending != &reference);
            } else if !self.pending_additions.contains(&reference) {
                self.pending_additions.push(reference.clone());
            }
            self.proxy.add(vec![reference]);
        }
    }

    /// Removes references: drops from the local list and records the
    /// removal, or cancels a pending addition of the same item.
    pub fn remove(&mut self, items: Vec<Value>) {
        for item in items {
            let Some(reference) = normalize(&item) else {
                tracing::warn!(?item, "dropping non-reference item from relation");
                continue;
            };

            if self.pending_additions.contains(&reference) {
                self.pending_additions.retain(|pending| pending != &reference);
            } else if !self.pending_removals.contains(&reference) {
                self.pending_removals.push(reference.clone());
            }
            self.proxy.remove(vec![reference]);
        }
    }

    /// Whether either pending set is non-empty.
    pub fn has_pending(&self) -> bool {
        !self.pending_additions.is_empty() || !self.pending_removals.is_empty()
    }

    /// The pending delta: `(additions, removals)`.
    pub fn delta(&self) -> (&[Value], &[Value]) {
        (&self.pending_additions, &self.pending_removals)
    }

    /// Clears both pending sets after a successful commit.
    pub fn clear_pending(&mut self) {
        self.pending_additions.clear();
        self.pending_removals.clear();
        self.proxy.changes_applied();
    }

    /// Returns the proxy to the unloaded state. Pending edits are kept; only
    /// the materialized content is discarded.
    pub fn reset(&mut self) {
        self.proxy.reset();
    }

    /// Builds the foreign-class query selecting this relation's members.
    ///
    /// Returns `None` when the owning record has no identifier yet — a
    /// relation without a persisted owner has nothing to query.
    pub fn query(&self, owner: Option<Pointer>) -> Option<Query> {
        let owner = owner?;

        Some(
            Query::builder()
                .constraint(Filter::related_to(self.key.clone(), owner))
                .build(),
        )
    }
}

fn normalize(item: &Value) -> Option<Value> {
    pointer_to(item).map(|pointer| pointer.to_value())
}
