// 🌳 Node Entity - levels and competencies share one record shape
//
// "External id is IDENTITY (never changes), name and description are VALUES"
//
// The structural role is derived from the parent link:
// - parent = framework root  -> Level
// - parent = a level node    -> Competency

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FrameworkId;

/// Store-assigned internal identifier
pub type NodeId = i64;

// ============================================================================
// PARENT LINK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parent {
    /// Directly under the framework
    Root,
    Node(NodeId),
}

impl Parent {
    /// Column value used by the SQL store (0 = root)
    pub fn as_column(&self) -> NodeId {
        match self {
            Parent::Root => 0,
            Parent::Node(id) => *id,
        }
    }

    pub fn from_column(value: NodeId) -> Self {
        if value == 0 {
            Parent::Root
        } else {
            Parent::Node(value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Level,
    Competency,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Level => "level",
            NodeRole::Competency => "competency",
        }
    }
}

// ============================================================================
// NODE
// ============================================================================

/// Values needed to create a node; the store assigns the id and audit fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub framework_id: FrameworkId,
    pub external_id: String,
    pub short_name: String,
    pub description: String,
    pub parent: Parent,
}

impl NodeDraft {
    pub fn level(framework_id: FrameworkId, external_id: &str, name: &str, description: &str) -> Self {
        NodeDraft {
            framework_id,
            external_id: external_id.to_string(),
            short_name: name.to_string(),
            description: description.to_string(),
            parent: Parent::Root,
        }
    }

    pub fn competency(
        framework_id: FrameworkId,
        parent_id: NodeId,
        external_id: &str,
        name: &str,
        description: &str,
    ) -> Self {
        NodeDraft {
            framework_id,
            external_id: external_id.to_string(),
            short_name: name.to_string(),
            description: description.to_string(),
            parent: Parent::Node(parent_id),
        }
    }
}

/// A persisted level or competency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub framework_id: FrameworkId,

    /// Business key, unique within the framework - NEVER changes once created
    pub external_id: String,

    pub short_name: String,
    pub description: String,
    pub parent: Parent,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub modified_by: i64,
}

impl Node {
    pub fn role(&self) -> NodeRole {
        match self.parent {
            Parent::Root => NodeRole::Level,
            Parent::Node(_) => NodeRole::Competency,
        }
    }

    pub fn is_level(&self) -> bool {
        self.role() == NodeRole::Level
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        match self.parent {
            Parent::Root => None,
            Parent::Node(id) => Some(id),
        }
    }
}
