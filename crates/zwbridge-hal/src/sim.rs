//! In-process simulated device network for tests and headless runs.
//!
//! [`SimTopology`] implements [`Topology`] over a small in-memory graph of
//! nodes and values.  Every mutation helper emits the notification a real
//! source would emit for that change to the attached [`NotificationSink`],
//! and every executed command and value write is recorded so tests can
//! assert on what reached the "device".
//!
//! # Stub behaviour
//!
//! | Operation | Behaviour |
//! |---|---|
//! | `execute(RemoveFailedNode)` | Removes the node and emits `NodeRemoved` when it is failed; rejected otherwise. |
//! | `execute(..)` (any other) | Recorded; always succeeds for a known node. |
//! | `set_value_data` | Rejected for values marked with [`SimTopology::reject_writes`]; floats written to integer values are rounded; emits `ValueChanged`. |
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use zwbridge_hal::{SimNode, SimTopology, Topology};
//!
//! let topology = SimTopology::builder()
//!     .home_id(0xcafe_f00d)
//!     .with_node(SimNode::new(1).with_product("Flush Dimmer"))
//!     .with_value(1, 100, "Level", json!(10))
//!     .build();
//!
//! assert_eq!(topology.value_data(1, 100).unwrap(), json!(10));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;
use zwbridge_types::{
    BridgeError, HomeId, NetworkState, NodeAttribute, NodeCommandRequest, NodeId, ValueId,
};

use crate::topology::{NotificationSink, Topology, TopologyNotification};

// ────────────────────────────────────────────────────────────────────────────
// Simulated node description
// ────────────────────────────────────────────────────────────────────────────

/// Static description of a simulated node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimNode {
    pub node_id: NodeId,
    pub manufacturer_id: String,
    pub manufacturer_name: String,
    pub product_id: String,
    pub product_name: String,
    pub product_type: String,
    pub neighbours: Vec<NodeId>,
    pub failed: bool,
}

impl SimNode {
    /// A node with empty attributes.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Set the product name.
    pub fn with_product(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Set the manufacturer id and name.
    pub fn with_manufacturer(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.manufacturer_id = id.into();
        self.manufacturer_name = name.into();
        self
    }

    /// Set the neighbour list.
    pub fn with_neighbours(mut self, neighbours: Vec<NodeId>) -> Self {
        self.neighbours = neighbours;
        self
    }

    /// Mark the node failed.
    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }

    fn attribute(&self, attribute: NodeAttribute) -> Value {
        match attribute {
            NodeAttribute::IsFailed => Value::Bool(self.failed),
            NodeAttribute::ManufacturerId => Value::String(self.manufacturer_id.clone()),
            NodeAttribute::ManufacturerName => Value::String(self.manufacturer_name.clone()),
            NodeAttribute::Neighbours => Value::from(self.neighbours.clone()),
            NodeAttribute::ProductId => Value::String(self.product_id.clone()),
            NodeAttribute::ProductName => Value::String(self.product_name.clone()),
            NodeAttribute::ProductType => Value::String(self.product_type.clone()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

struct SimValue {
    label: String,
    data: Value,
    reject_writes: bool,
}

struct SimNodeState {
    info: SimNode,
    values: BTreeMap<ValueId, SimValue>,
}

#[derive(Default)]
struct SimState {
    network: NetworkState,
    home_id: HomeId,
    nodes: BTreeMap<NodeId, SimNodeState>,
    commands: Vec<(NodeId, NodeCommandRequest)>,
    writes: Vec<(NodeId, ValueId, Value)>,
}

impl SimState {
    fn node(&self, node_id: NodeId) -> Result<&SimNodeState, BridgeError> {
        self.nodes.get(&node_id).ok_or(BridgeError::UnknownNode(node_id))
    }

    fn node_mut(&mut self, node_id: NodeId) -> Result<&mut SimNodeState, BridgeError> {
        self.nodes.get_mut(&node_id).ok_or(BridgeError::UnknownNode(node_id))
    }

    fn value(&self, node_id: NodeId, value_id: ValueId) -> Result<&SimValue, BridgeError> {
        self.node(node_id)?
            .values
            .get(&value_id)
            .ok_or(BridgeError::UnknownValue { node_id, value_id })
    }

    fn value_mut(
        &mut self,
        node_id: NodeId,
        value_id: ValueId,
    ) -> Result<&mut SimValue, BridgeError> {
        self.node_mut(node_id)?
            .values
            .get_mut(&value_id)
            .ok_or(BridgeError::UnknownValue { node_id, value_id })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimTopology
// ────────────────────────────────────────────────────────────────────────────

/// Simulated topology source.  Clone it cheaply – all clones share the same
/// graph and the same attached sink.
#[derive(Clone, Default)]
pub struct SimTopology {
    state: Arc<Mutex<SimState>>,
    sink: Arc<Mutex<Option<Arc<dyn NotificationSink>>>>,
}

impl SimTopology {
    /// Start building a simulated network.
    pub fn builder() -> SimTopologyBuilder {
        SimTopologyBuilder::default()
    }

    /// Deliver future notifications to `sink`, replacing any previous sink.
    pub fn attach(&self, sink: Arc<dyn NotificationSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Change the network state.
    pub fn set_state(&self, network: NetworkState) {
        self.lock().network = network;
        self.emit(TopologyNotification::NetworkStateChanged);
    }

    /// Add (or replace) a node.
    pub fn add_node(&self, node: SimNode) {
        let node_id = node.node_id;
        self.lock().nodes.insert(
            node_id,
            SimNodeState {
                info: node,
                values: BTreeMap::new(),
            },
        );
        self.emit(TopologyNotification::NodeAdded(node_id));
    }

    /// Remove a node.  Returns `false` if it was not present.
    pub fn remove_node(&self, node_id: NodeId) -> bool {
        let removed = self.lock().nodes.remove(&node_id).is_some();
        if removed {
            self.emit(TopologyNotification::NodeRemoved(node_id));
        }
        removed
    }

    /// Mark a node failed or alive.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is not present.
    pub fn set_failed(&self, node_id: NodeId, failed: bool) -> Result<(), BridgeError> {
        self.lock().node_mut(node_id)?.info.failed = failed;
        self.emit(TopologyNotification::NodeEvent(node_id));
        Ok(())
    }

    /// Replace a node's neighbour list and emit `NodeEvent`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is not present.
    pub fn set_neighbours(
        &self,
        node_id: NodeId,
        neighbours: Vec<NodeId>,
    ) -> Result<(), BridgeError> {
        self.set_neighbours_silently(node_id, neighbours)?;
        self.emit(TopologyNotification::NodeEvent(node_id));
        Ok(())
    }

    /// Replace a node's neighbour list *without* emitting a notification,
    /// the way a real source fills neighbour tables silently while the
    /// network is coming up.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is not present.
    pub fn set_neighbours_silently(
        &self,
        node_id: NodeId,
        neighbours: Vec<NodeId>,
    ) -> Result<(), BridgeError> {
        self.lock().node_mut(node_id)?.info.neighbours = neighbours;
        Ok(())
    }

    /// Add (or replace) a value on a node.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownNode`] if the node is not present.
    pub fn add_value(
        &self,
        node_id: NodeId,
        value_id: ValueId,
        label: impl Into<String>,
        data: Value,
    ) -> Result<(), BridgeError> {
        self.lock().node_mut(node_id)?.values.insert(
            value_id,
            SimValue {
                label: label.into(),
                data,
                reject_writes: false,
            },
        );
        self.emit(TopologyNotification::ValueAdded { node_id, value_id });
        Ok(())
    }

    /// Remove a value from a node.  Returns `false` if it was not present.
    pub fn remove_value(&self, node_id: NodeId, value_id: ValueId) -> bool {
        let removed = self
            .lock()
            .nodes
            .get_mut(&node_id)
            .is_some_and(|node| node.values.remove(&value_id).is_some());
        if removed {
            self.emit(TopologyNotification::ValueRemoved { node_id, value_id });
        }
        removed
    }

    /// Change a value from the device side and emit `ValueChanged`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownValue`] if the value is not present.
    pub fn set_value(
        &self,
        node_id: NodeId,
        value_id: ValueId,
        data: Value,
    ) -> Result<(), BridgeError> {
        self.lock().value_mut(node_id, value_id)?.data = data;
        self.emit(TopologyNotification::ValueChanged { node_id, value_id });
        Ok(())
    }

    /// Emit `ValueRefreshed` for an existing value without changing it.
    pub fn refresh_value(&self, node_id: NodeId, value_id: ValueId) {
        self.emit(TopologyNotification::ValueRefreshed { node_id, value_id });
    }

    /// Make every future write to a value fail, as an unreachable device would.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownValue`] if the value is not present.
    pub fn reject_writes(&self, node_id: NodeId, value_id: ValueId) -> Result<(), BridgeError> {
        self.lock().value_mut(node_id, value_id)?.reject_writes = true;
        Ok(())
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<(NodeId, NodeCommandRequest)> {
        self.lock().commands.clone()
    }

    /// Every accepted value write so far, in order, as written by the caller.
    pub fn writes(&self) -> Vec<(NodeId, ValueId, Value)> {
        self.lock().writes.clone()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, notification: TopologyNotification) {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => sink.notify(notification),
            None => debug!(?notification, "no sink attached; notification dropped"),
        }
    }
}

impl Topology for SimTopology {
    fn state(&self) -> NetworkState {
        self.lock().network
    }

    fn home_id(&self) -> HomeId {
        self.lock().home_id
    }

    fn node_ids(&self) -> BTreeSet<NodeId> {
        self.lock().nodes.keys().copied().collect()
    }

    fn node_attribute(
        &self,
        node_id: NodeId,
        attribute: NodeAttribute,
    ) -> Result<Value, BridgeError> {
        Ok(self.lock().node(node_id)?.info.attribute(attribute))
    }

    fn value_ids(&self, node_id: NodeId) -> Result<BTreeSet<ValueId>, BridgeError> {
        Ok(self.lock().node(node_id)?.values.keys().copied().collect())
    }

    fn value_label(&self, node_id: NodeId, value_id: ValueId) -> Result<String, BridgeError> {
        Ok(self.lock().value(node_id, value_id)?.label.clone())
    }

    fn value_data(&self, node_id: NodeId, value_id: ValueId) -> Result<Value, BridgeError> {
        Ok(self.lock().value(node_id, value_id)?.data.clone())
    }

    fn set_value_data(
        &self,
        node_id: NodeId,
        value_id: ValueId,
        data: Value,
    ) -> Result<(), BridgeError> {
        {
            let mut state = self.lock();
            let value = state.value_mut(node_id, value_id)?;
            if value.reject_writes {
                return Err(BridgeError::Topology {
                    node_id,
                    details: format!("write to value {value_id} rejected: device unreachable"),
                });
            }
            value.data = match (&value.data, &data) {
                (current, Value::Number(n)) if current.is_i64() && n.is_f64() => {
                    n.as_f64().map_or(data.clone(), |f| Value::from(f.round() as i64))
                }
                _ => data.clone(),
            };
            state.writes.push((node_id, value_id, data));
        }
        self.emit(TopologyNotification::ValueChanged { node_id, value_id });
        Ok(())
    }

    fn execute(&self, node_id: NodeId, request: &NodeCommandRequest) -> Result<(), BridgeError> {
        {
            let mut state = self.lock();
            let failed = state.node(node_id)?.info.failed;
            if *request == NodeCommandRequest::RemoveFailedNode {
                if !failed {
                    return Err(BridgeError::CommandRejected {
                        node_id,
                        command: request.command().to_string(),
                        details: "node is not failed".to_string(),
                    });
                }
                state.nodes.remove(&node_id);
            }
            state.commands.push((node_id, request.clone()));
        }
        if *request == NodeCommandRequest::RemoveFailedNode {
            self.emit(TopologyNotification::NodeRemoved(node_id));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a [`SimTopology`].  Nothing built here emits notifications.
#[derive(Default)]
pub struct SimTopologyBuilder {
    network: NetworkState,
    home_id: HomeId,
    nodes: Vec<SimNode>,
    values: Vec<(NodeId, ValueId, String, Value)>,
}

impl SimTopologyBuilder {
    /// Set the network identifier.
    pub fn home_id(mut self, home_id: HomeId) -> Self {
        self.home_id = home_id;
        self
    }

    /// Set the initial network state.
    pub fn network_state(mut self, network: NetworkState) -> Self {
        self.network = network;
        self
    }

    /// Add a node.
    pub fn with_node(mut self, node: SimNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a value to a node added with [`SimTopologyBuilder::with_node`].
    /// Values for unknown nodes are ignored.
    pub fn with_value(
        mut self,
        node_id: NodeId,
        value_id: ValueId,
        label: impl Into<String>,
        data: Value,
    ) -> Self {
        self.values.push((node_id, value_id, label.into(), data));
        self
    }

    /// Consume the builder.
    pub fn build(self) -> SimTopology {
        let mut state = SimState {
            network: self.network,
            home_id: self.home_id,
            ..SimState::default()
        };
        for info in self.nodes {
            state.nodes.insert(
                info.node_id,
                SimNodeState {
                    info,
                    values: BTreeMap::new(),
                },
            );
        }
        for (node_id, value_id, label, data) in self.values {
            if let Some(node) = state.nodes.get_mut(&node_id) {
                node.values.insert(
                    value_id,
                    SimValue {
                        label,
                        data,
                        reject_writes: false,
                    },
                );
            }
        }
        SimTopology {
            state: Arc::new(Mutex::new(state)),
            sink: Arc::new(Mutex::new(None)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<TopologyNotification>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, notification: TopologyNotification) {
            self.seen.lock().unwrap().push(notification);
        }
    }

    fn sample() -> (SimTopology, Arc<RecordingSink>) {
        let topology = SimTopology::builder()
            .home_id(0x0102_0304)
            .network_state(NetworkState::Started)
            .with_node(
                SimNode::new(1)
                    .with_product("Flush Dimmer")
                    .with_manufacturer("0x0160", "Aeotec")
                    .with_neighbours(vec![2]),
            )
            .with_node(SimNode::new(2))
            .with_value(1, 100, "Level", json!(10))
            .with_value(9, 900, "Orphan", json!(0))
            .build();
        let sink = Arc::new(RecordingSink::default());
        topology.attach(Arc::clone(&sink) as Arc<dyn NotificationSink>);
        (topology, sink)
    }

    #[test]
    fn builder_populates_graph_without_notifications() {
        let (topology, sink) = sample();
        assert_eq!(topology.home_id(), 0x0102_0304);
        assert_eq!(topology.state(), NetworkState::Started);
        assert_eq!(topology.node_ids(), BTreeSet::from([1, 2]));
        assert_eq!(topology.value_ids(1).unwrap(), BTreeSet::from([100]));
        assert!(topology.value_ids(2).unwrap().is_empty());
        assert_eq!(topology.value_label(1, 100).unwrap(), "Level");
        assert_eq!(
            topology.node_attribute(1, NodeAttribute::Neighbours).unwrap(),
            json!([2])
        );
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn mutations_emit_matching_notifications() {
        let (topology, sink) = sample();
        topology.add_node(SimNode::new(3));
        topology.add_value(3, 300, "Switch", json!(false)).unwrap();
        topology.set_value(3, 300, json!(true)).unwrap();
        topology.refresh_value(3, 300);
        assert!(topology.remove_value(3, 300));
        assert!(topology.remove_node(3));
        topology.set_state(NetworkState::Ready);

        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![
                TopologyNotification::NodeAdded(3),
                TopologyNotification::ValueAdded { node_id: 3, value_id: 300 },
                TopologyNotification::ValueChanged { node_id: 3, value_id: 300 },
                TopologyNotification::ValueRefreshed { node_id: 3, value_id: 300 },
                TopologyNotification::ValueRemoved { node_id: 3, value_id: 300 },
                TopologyNotification::NodeRemoved(3),
                TopologyNotification::NetworkStateChanged,
            ]
        );
    }

    #[test]
    fn removing_absent_entities_is_silent() {
        let (topology, sink) = sample();
        assert!(!topology.remove_node(42));
        assert!(!topology.remove_value(1, 4242));
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_entities_are_errors() {
        let (topology, _) = sample();
        assert!(matches!(
            topology.value_ids(42),
            Err(BridgeError::UnknownNode(42))
        ));
        assert!(matches!(
            topology.value_data(1, 7),
            Err(BridgeError::UnknownValue { node_id: 1, value_id: 7 })
        ));
    }

    #[test]
    fn remove_failed_node_requires_failed_flag() {
        let (topology, sink) = sample();
        let result = topology.execute(2, &NodeCommandRequest::RemoveFailedNode);
        assert!(matches!(result, Err(BridgeError::CommandRejected { .. })));
        assert!(topology.node_ids().contains(&2));

        topology.set_failed(2, true).unwrap();
        assert!(topology.is_failed(2).unwrap());
        topology
            .execute(2, &NodeCommandRequest::RemoveFailedNode)
            .unwrap();
        assert!(!topology.node_ids().contains(&2));
        assert_eq!(
            sink.seen.lock().unwrap().last(),
            Some(&TopologyNotification::NodeRemoved(2))
        );
    }

    #[test]
    fn commands_are_recorded() {
        let (topology, _) = sample();
        let heal = NodeCommandRequest::Heal { update_routes: true };
        topology.execute(1, &heal).unwrap();
        assert_eq!(topology.commands(), vec![(1, heal)]);
        assert!(topology.execute(42, &NodeCommandRequest::RefreshInfo).is_err());
    }

    #[test]
    fn writes_are_coerced_or_rejected() {
        let (topology, sink) = sample();
        topology.set_value_data(1, 100, json!(42.6)).unwrap();
        assert_eq!(topology.value_data(1, 100).unwrap(), json!(43));
        assert_eq!(topology.writes(), vec![(1, 100, json!(42.6))]);
        assert_eq!(
            sink.seen.lock().unwrap().last(),
            Some(&TopologyNotification::ValueChanged { node_id: 1, value_id: 100 })
        );

        topology.reject_writes(1, 100).unwrap();
        assert!(matches!(
            topology.set_value_data(1, 100, json!(5)),
            Err(BridgeError::Topology { node_id: 1, .. })
        ));
        assert_eq!(topology.value_data(1, 100).unwrap(), json!(43));
    }

    #[test]
    fn silent_neighbour_update_is_visible_but_not_notified() {
        let (topology, sink) = sample();
        topology.set_neighbours_silently(2, vec![1]).unwrap();
        assert_eq!(
            topology.node_attribute(2, NodeAttribute::Neighbours).unwrap(),
            json!([1])
        );
        assert!(sink.seen.lock().unwrap().is_empty());
    }
}
