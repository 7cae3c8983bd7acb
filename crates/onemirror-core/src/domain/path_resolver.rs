//! Per-pass id→path resolution
//!
//! The change feed only tells us each item's name and parent id. The
//! [`PathResolver`] accumulates those edges as records are observed and
//! derives the mirror-relative path of an item by walking up to the mirror
//! root. A fresh resolver is built for every reconciliation pass; nothing is
//! shared across passes because names and parents may change in between.

use std::collections::HashMap;

use super::errors::DomainError;
use super::newtypes::RemoteId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PathEntry {
    name: String,
    parent_id: Option<RemoteId>,
}

/// Graph of `id → (name, parent)` edges seen so far in the current pass
#[derive(Debug)]
pub struct PathResolver {
    root: RemoteId,
    entries: HashMap<RemoteId, PathEntry>,
    cache: HashMap<RemoteId, String>,
}

impl PathResolver {
    /// Create an empty resolver for a mirror rooted at `root`
    pub fn new(root: RemoteId) -> Self {
        let mut cache = HashMap::new();
        cache.insert(root.clone(), String::new());
        Self {
            root,
            entries: HashMap::new(),
            cache,
        }
    }

    /// The mirror root identifier
    pub fn root(&self) -> &RemoteId {
        &self.root
    }

    /// Returns true if `id` is the mirror root
    pub fn is_root(&self, id: &RemoteId) -> bool {
        &self.root == id
    }

    /// Number of observed items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no item has been observed yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name and parent of `id` as last observed in this pass
    pub fn known(&self, id: &RemoteId) -> Option<(&str, Option<&RemoteId>)> {
        self.entries
            .get(id)
            .map(|entry| (entry.name.as_str(), entry.parent_id.as_ref()))
    }

    /// Record the name and parent of an item
    ///
    /// Observing an item again with a different name or parent (a move
    /// later in the same pass) drops every memoized path, since any
    /// descendant path may have changed.
    pub fn observe(&mut self, id: RemoteId, name: impl Into<String>, parent_id: Option<RemoteId>) {
        let entry = PathEntry {
            name: name.into(),
            parent_id,
        };
        if let Some(previous) = self.entries.insert(id, entry.clone()) {
            if previous != entry {
                self.cache.clear();
                self.cache.insert(self.root.clone(), String::new());
            }
        }
    }

    /// Resolve the mirror-relative, `/`-separated path of `id`
    ///
    /// The mirror root resolves to `""`. Results are memoized for every id
    /// on the walked chain.
    ///
    /// # Errors
    /// Returns [`DomainError::UnresolvedPath`] if an ancestor of `id` was never
    /// observed in this pass, and [`DomainError::ValidationFailed`] if the
    /// parent edges form a cycle.
    pub fn resolve(&mut self, id: &RemoteId) -> Result<String, DomainError> {
        if let Some(path) = self.cache.get(id) {
            return Ok(path.clone());
        }

        let mut chain: Vec<RemoteId> = Vec::new();
        let mut current = id.clone();
        let base = loop {
            if let Some(path) = self.cache.get(&current) {
                break path.clone();
            }
            let entry = self
                .entries
                .get(&current)
                .ok_or_else(|| DomainError::UnresolvedPath {
                    id: id.to_string(),
                    missing: current.to_string(),
                })?;
            if chain.len() > self.entries.len() {
                return Err(DomainError::ValidationFailed(format!(
                    "parent cycle detected while resolving {id}"
                )));
            }
            chain.push(current.clone());
            match &entry.parent_id {
                Some(parent) => current = parent.clone(),
                None => {
                    return Err(DomainError::UnresolvedPath {
                        id: id.to_string(),
                        missing: format!("parent of {current}"),
                    })
                }
            }
        };

        let mut path = base;
        for item in chain.into_iter().rev() {
            let name = self
                .entries
                .get(&item)
                .map(|e| e.name.as_str())
                .unwrap_or_default();
            path = if path.is_empty() {
                name.to_string()
            } else {
                format!("{path}/{name}")
            };
            self.cache.insert(item, path.clone());
        }
        Ok(path)
    }
}
