// 🗄️ Record store seam
//
// The import core only ever talks to storage through these two traits.
// `SqliteStore` (db.rs) is the persistent implementation; `MemoryStore`
// below keeps everything in process, which is what the unit tests use.

use std::collections::HashMap;

use crate::context::AuditContext;
use crate::entities::{
    Framework, FrameworkDraft, FrameworkId, Node, NodeDraft, NodeId, Parent, Scale, ScaleId,
};
use crate::error::{StoreError, StoreResult};

/// Generic create/read/update store for frameworks and their nodes.
///
/// Implementations must reject a second node with the same
/// (framework, external id) pair instead of silently merging it.
pub trait RecordStore {
    /// Look up a node by its business key
    fn find(&self, framework_id: FrameworkId, external_id: &str) -> StoreResult<Option<Node>>;

    fn create(&mut self, draft: &NodeDraft, ctx: &AuditContext) -> StoreResult<NodeId>;

    /// Persist name, description and parent of an existing node.
    /// The external id is never rewritten.
    fn update(&mut self, node: &Node, ctx: &AuditContext) -> StoreResult<()>;

    /// All nodes sitting directly under the framework root
    fn levels(&self, framework_id: FrameworkId) -> StoreResult<Vec<Node>>;

    fn framework(&self, id: FrameworkId) -> StoreResult<Option<Framework>>;

    fn framework_exists(&self, external_id: &str) -> StoreResult<bool>;

    fn create_framework(&mut self, draft: &FrameworkDraft, ctx: &AuditContext)
        -> StoreResult<FrameworkId>;
}

/// Read-only access to rating scales
pub trait ScaleLookup {
    fn get_scale(&self, id: ScaleId) -> StoreResult<Option<Scale>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    frameworks: Vec<Framework>,
    nodes: Vec<Node>,
    /// (framework, external id) -> position in `nodes`
    index: HashMap<(FrameworkId, String), usize>,
    scales: Vec<Scale>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn add_scale(&mut self, name: &str, values: &[&str]) -> ScaleId {
        let id = self.scales.len() as ScaleId + 1;
        self.scales.push(Scale {
            id,
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        id
    }

    pub fn nodes(&self, framework_id: FrameworkId) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| n.framework_id == framework_id)
            .cloned()
            .collect()
    }

    pub fn children(&self, parent_id: NodeId) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| n.parent == Parent::Node(parent_id))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }
}

impl RecordStore for MemoryStore {
    fn find(&self, framework_id: FrameworkId, external_id: &str) -> StoreResult<Option<Node>> {
        Ok(self
            .index
            .get(&(framework_id, external_id.to_string()))
            .map(|&pos| self.nodes[pos].clone()))
    }

    fn create(&mut self, draft: &NodeDraft, ctx: &AuditContext) -> StoreResult<NodeId> {
        let key = (draft.framework_id, draft.external_id.clone());
        if self.index.contains_key(&key) {
            return Err(StoreError::DuplicateExternalId {
                framework_id: draft.framework_id,
                external_id: draft.external_id.clone(),
            });
        }
        if !self.frameworks.iter().any(|f| f.id == draft.framework_id) {
            return Err(StoreError::FrameworkNotFound(draft.framework_id));
        }
        if let Parent::Node(parent_id) = draft.parent {
            if !self.nodes.iter().any(|n| n.id == parent_id) {
                return Err(StoreError::NodeNotFound(parent_id));
            }
        }

        let now = ctx.now();
        let id = self.nodes.len() as NodeId + 1;
        self.nodes.push(Node {
            id,
            framework_id: draft.framework_id,
            external_id: draft.external_id.clone(),
            short_name: draft.short_name.clone(),
            description: draft.description.clone(),
            parent: draft.parent,
            created_at: now,
            modified_at: now,
            modified_by: ctx.user_id,
        });
        self.index.insert(key, self.nodes.len() - 1);

        Ok(id)
    }

    fn update(&mut self, node: &Node, ctx: &AuditContext) -> StoreResult<()> {
        if let Parent::Node(parent_id) = node.parent {
            if !self.nodes.iter().any(|n| n.id == parent_id) {
                return Err(StoreError::NodeNotFound(parent_id));
            }
        }

        let stored = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node.id)
            .ok_or(StoreError::NodeNotFound(node.id))?;

        stored.short_name = node.short_name.clone();
        stored.description = node.description.clone();
        stored.parent = node.parent;
        stored.modified_at = ctx.now();
        stored.modified_by = ctx.user_id;

        Ok(())
    }

    fn levels(&self, framework_id: FrameworkId) -> StoreResult<Vec<Node>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.framework_id == framework_id && n.is_level())
            .cloned()
            .collect())
    }

    fn framework(&self, id: FrameworkId) -> StoreResult<Option<Framework>> {
        Ok(self.frameworks.iter().find(|f| f.id == id).cloned())
    }

    fn framework_exists(&self, external_id: &str) -> StoreResult<bool> {
        Ok(self.frameworks.iter().any(|f| f.external_id == external_id))
    }

    fn create_framework(
        &mut self,
        draft: &FrameworkDraft,
        ctx: &AuditContext,
    ) -> StoreResult<FrameworkId> {
        if self.frameworks.iter().any(|f| f.external_id == draft.external_id) {
            return Err(StoreError::DuplicateFramework(draft.external_id.clone()));
        }

        let now = ctx.now();
        let id = self.frameworks.len() as FrameworkId + 1;
        self.frameworks.push(Framework {
            id,
            short_name: draft.short_name.clone(),
            external_id: draft.external_id.clone(),
            description: draft.description.clone(),
            scale_configuration: draft.scale_configuration.clone(),
            visible: true,
            created_at: now,
            modified_at: now,
            modified_by: ctx.user_id,
        });
        Ok(id)
    }
}

impl ScaleLookup for MemoryStore {
    fn get_scale(&self, id: ScaleId) -> StoreResult<Option<Scale>> {
        Ok(self.scales.iter().find(|s| s.id == id).cloned())
    }
}
