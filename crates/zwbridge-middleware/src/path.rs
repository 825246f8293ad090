//! [`Namespace`] – layout of the published path tree.
//!
//! ```text
//! <base>/state
//! <base>/ready
//! <base>/home_id
//! <base>/nodes/<node_id>/<attribute or command>
//! <base>/nodes/<node_id>/values/<label>
//! <base>/nodes/<node_id>/values/<label>/set
//! ```

use zwbridge_types::NodeId;

/// Leaf of the network state property.
pub const STATE: &str = "state";
/// Leaf of the network readiness property.
pub const READY: &str = "ready";
/// Leaf of the network home-id property.
pub const HOME_ID: &str = "home_id";
/// Leaf appended to a value path to form its setter event.
pub const SETTER: &str = "set";

/// Builds published paths from a base path.
///
/// A trailing `/` on the base is ignored, so `sys/zwave` and `sys/zwave/`
/// produce the same tree.  An empty base roots the tree at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    base: String,
}

impl Namespace {
    /// Create a namespace rooted at `base`.
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The normalised base path.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `<base>/<leaf>`.
    pub fn network(&self, leaf: &str) -> String {
        if self.base.is_empty() {
            leaf.to_string()
        } else {
            format!("{}/{leaf}", self.base)
        }
    }

    /// `<base>/nodes/<node_id>`.
    pub fn node(&self, node_id: NodeId) -> String {
        self.network(&format!("nodes/{node_id}"))
    }

    /// `<base>/nodes/<node_id>/<leaf>`.
    pub fn node_leaf(&self, node_id: NodeId, leaf: &str) -> String {
        format!("{}/{leaf}", self.node(node_id))
    }

    /// `<base>/nodes/<node_id>/values/<label>`.
    pub fn value(&self, node_id: NodeId, label: &str) -> String {
        format!("{}/values/{label}", self.node(node_id))
    }

    /// `<base>/nodes/<node_id>/values/<label>/set`.
    pub fn value_setter(&self, node_id: NodeId, label: &str) -> String {
        format!("{}/{SETTER}", self.value(node_id, label))
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new("sys/zwave")
    }
}
