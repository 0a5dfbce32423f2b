//! Catalog of node types keyed by type id.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use sluice_types::{Result, SluiceError};

use crate::engine::EXPORT_TYPE_ID;
use crate::node::{Instancing, Node, NodeCharacteristics, NodeFactory, NodeType};

struct Entry {
    characteristics: NodeCharacteristics,
    factory: NodeFactory,
    shared: OnceLock<Arc<dyn Node>>,
}

impl Entry {
    fn instance(&self) -> Arc<dyn Node> {
        match self.characteristics.instancing {
            Instancing::Shared => Arc::clone(self.shared.get_or_init(|| (self.factory)())),
            Instancing::Exclusive => (self.factory)(),
        }
    }
}

/// Registered node types.
///
/// Shared instances are cached by type id for the life of the registry.
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, Entry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with `candidates`.
    ///
    /// Candidates with missing metadata, or whose type id is already taken,
    /// are rejected. Every valid candidate is registered even when some are
    /// rejected; the rejections are returned together as
    /// [`SluiceError::RegistryLoad`].
    pub fn load(&mut self, candidates: impl IntoIterator<Item = NodeType>) -> Result<()> {
        let mut entries: HashMap<String, Entry> = HashMap::new();
        let mut errors = Vec::new();

        for candidate in candidates {
            let characteristics = match candidate.characteristics() {
                Ok(c) => c,
                Err(missing) => {
                    let message = format!(
                        "node type '{}' is missing {}",
                        candidate.name(),
                        missing.join(", ")
                    );
                    tracing::error!(node_type = candidate.name(), "{message}");
                    errors.push(message);
                    continue;
                }
            };

            let type_id = characteristics.type_id.clone();
            if type_id == EXPORT_TYPE_ID {
                let message = format!(
                    "node type '{}' uses the reserved type id '{EXPORT_TYPE_ID}'",
                    candidate.name()
                );
                tracing::error!(node_type = candidate.name(), "{message}");
                errors.push(message);
                continue;
            }
            if entries.contains_key(&type_id) {
                let message = format!(
                    "node type '{}' duplicates type id '{type_id}'",
                    candidate.name()
                );
                tracing::error!(node_type = candidate.name(), %type_id, "{message}");
                errors.push(message);
                continue;
            }

            tracing::debug!(%type_id, usage = %characteristics.usage, "Registered node type");
            entries.insert(
                type_id,
                Entry {
                    characteristics,
                    factory: candidate.factory(),
                    shared: OnceLock::new(),
                },
            );
        }

        self.entries = entries;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SluiceError::RegistryLoad { errors })
        }
    }

    /// An instance of `type_id`: the cached one for shared types, a new one
    /// for exclusive types.
    pub fn get_instance(&self, type_id: &str) -> Option<Arc<dyn Node>> {
        self.entries.get(type_id).map(Entry::instance)
    }

    pub fn characteristics(&self, type_id: &str) -> Option<&NodeCharacteristics> {
        self.entries.get(type_id).map(|e| &e.characteristics)
    }

    pub fn has(&self, type_id: &str) -> bool {
        self.entries.contains_key(type_id)
    }

    /// Registered type ids, highest priority first, then alphabetical.
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&NodeCharacteristics> =
            self.entries.values().map(|e| &e.characteristics).collect();
        ids.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.type_id.cmp(&b.type_id)));
        ids.into_iter().map(|c| c.type_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("type_ids", &self.type_ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

/// A registry loaded with the built-in node types.
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    if let Err(err) = registry.load(crate::nodes::builtin_node_types()) {
        tracing::error!(error = %err, "Built-in node types failed to load");
    }
    registry
}
