//! Generic `Topology` trait for device-network sources.
//!
//! A topology source owns the live object graph of nodes and values.  The
//! bridge only needs read access to current attribute values, a way to
//! enumerate nodes and values, a way to issue commands, and a feed of
//! [`TopologyNotification`]s naming *which* entity may have changed.
//!
//! Reads and commands are synchronous: they operate on the source's
//! in-memory graph and queue any device traffic internally.

use std::collections::BTreeSet;

use serde_json::Value;
use zwbridge_types::{
    BridgeError, HomeId, NetworkState, NodeAttribute, NodeCommandRequest, NodeId, ValueId,
};

/// An externally owned, mutable network of nodes and values.
pub trait Topology: Send + Sync {
    /// Current state of the network.
    fn state(&self) -> NetworkState;

    /// Identifier of the network.
    fn home_id(&self) -> HomeId;

    /// Identifiers of every node currently present.
    fn node_ids(&self) -> BTreeSet<NodeId>;

    /// Current value of a fixed node attribute.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is gone.
    fn node_attribute(
        &self,
        node_id: NodeId,
        attribute: NodeAttribute,
    ) -> Result<Value, BridgeError>;

    /// Whether the node is currently marked failed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is gone.
    fn is_failed(&self, node_id: NodeId) -> Result<bool, BridgeError> {
        Ok(self
            .node_attribute(node_id, NodeAttribute::IsFailed)?
            .as_bool()
            .unwrap_or(false))
    }

    /// Identifiers of every value currently present on a node.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is gone.
    fn value_ids(&self, node_id: NodeId) -> Result<BTreeSet<ValueId>, BridgeError>;

    /// Human-readable label of a value.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownValue`] if the value is gone.
    fn value_label(&self, node_id: NodeId, value_id: ValueId) -> Result<String, BridgeError>;

    /// Current data of a value.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownValue`] if the value is gone.
    fn value_data(&self, node_id: NodeId, value_id: ValueId) -> Result<Value, BridgeError>;

    /// Write new data into a value.  The source may coerce the data; the
    /// caller re-reads [`Topology::value_data`] to learn the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Topology`] when the write is rejected.
    fn set_value_data(
        &self,
        node_id: NodeId,
        value_id: ValueId,
        data: Value,
    ) -> Result<(), BridgeError>;

    /// Execute a validated node command.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CommandRejected`] when the source refuses the
    /// command and [`BridgeError::UnknownNode`] if the node is gone.
    fn execute(&self, node_id: NodeId, request: &NodeCommandRequest) -> Result<(), BridgeError>;
}

/// A coarse change notification.  It names the entity that *may* have
/// changed, never what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyNotification {
    NetworkStateChanged,
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    NodeEvent(NodeId),
    ValueAdded { node_id: NodeId, value_id: ValueId },
    ValueRemoved { node_id: NodeId, value_id: ValueId },
    ValueRefreshed { node_id: NodeId, value_id: ValueId },
    ValueChanged { node_id: NodeId, value_id: ValueId },
}

impl TopologyNotification {
    /// The node the notification concerns, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match *self {
            TopologyNotification::NetworkStateChanged => None,
            TopologyNotification::NodeAdded(node_id)
            | TopologyNotification::NodeRemoved(node_id)
            | TopologyNotification::NodeEvent(node_id)
            | TopologyNotification::ValueAdded { node_id, .. }
            | TopologyNotification::ValueRemoved { node_id, .. }
            | TopologyNotification::ValueRefreshed { node_id, .. }
            | TopologyNotification::ValueChanged { node_id, .. } => Some(node_id),
        }
    }
}

/// Receiver of the notification feed.
///
/// Topology sources call [`NotificationSink::notify`] from their own
/// execution context (typically a worker thread), so implementations must
/// only hand the notification off and return.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: TopologyNotification);
}
