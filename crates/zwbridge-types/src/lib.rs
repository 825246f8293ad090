//! `zwbridge-types` – shared vocabulary of the bridge.
//!
//! Identifiers for topology entities, the network state machine, the static
//! descriptor tables for node attributes and node commands, and the single
//! error type used by every crate in the workspace.

pub mod command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::{NodeCommand, NodeCommandRequest};

/// Identifier of a node, stable for the lifetime of the device in the
/// topology source.
pub type NodeId = u8;

/// Identifier of a value, unique within the owning node's value set.
pub type ValueId = u64;

/// Identifier of the whole device network.
pub type HomeId = u32;

/// State of the device network as reported by the topology source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkState {
    #[default]
    Stopped,
    Failed,
    Resetted,
    Started,
    Awaked,
    Ready,
}

impl NetworkState {
    /// Return `true` only for [`NetworkState::Ready`].
    pub fn is_ready(self) -> bool {
        self == NetworkState::Ready
    }

    /// The string published on the `state` property.
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkState::Stopped => "Stopped",
            NetworkState::Failed => "Failed",
            NetworkState::Resetted => "Resetted",
            NetworkState::Started => "Started",
            NetworkState::Awaked => "Awaked",
            NetworkState::Ready => "Ready",
        }
    }
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed attributes published as properties for every node.
///
/// The attribute set is fixed at design time, so the table is a plain enum
/// enumerated through [`NodeAttribute::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeAttribute {
    IsFailed,
    ManufacturerId,
    ManufacturerName,
    Neighbours,
    ProductId,
    ProductName,
    ProductType,
}

impl NodeAttribute {
    /// Every attribute, in publication order.
    pub const ALL: [NodeAttribute; 7] = [
        NodeAttribute::IsFailed,
        NodeAttribute::ManufacturerId,
        NodeAttribute::ManufacturerName,
        NodeAttribute::Neighbours,
        NodeAttribute::ProductId,
        NodeAttribute::ProductName,
        NodeAttribute::ProductType,
    ];

    /// Path segment under `<base>/nodes/<node_id>/`.
    pub fn segment(self) -> &'static str {
        match self {
            NodeAttribute::IsFailed => "is_failed",
            NodeAttribute::ManufacturerId => "manufacturer_id",
            NodeAttribute::ManufacturerName => "manufacturer_name",
            NodeAttribute::Neighbours => "neighbours",
            NodeAttribute::ProductId => "product_id",
            NodeAttribute::ProductName => "product_name",
            NodeAttribute::ProductType => "product_type",
        }
    }

    /// Human-readable description sent along with the registration.
    pub fn description(self) -> &'static str {
        match self {
            NodeAttribute::IsFailed => "Has the node failed/become unavailable.",
            NodeAttribute::ManufacturerId => "ZWave manufacturer ID of the node.",
            NodeAttribute::ManufacturerName => "Manufacturer name of the node.",
            NodeAttribute::Neighbours => "List of ZWave node IDs within range.",
            NodeAttribute::ProductId => "ZWave product ID of the node.",
            NodeAttribute::ProductName => "Product name of the node.",
            NodeAttribute::ProductType => "Product type of the node.",
        }
    }
}

/// Global error type spanning transport failures, topology faults and
/// rejected commands.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Malformed argument for {command}: {details}")]
    MalformedArgument { command: String, details: String },

    #[error("Command {command} rejected for node {node_id}: {details}")]
    CommandRejected {
        node_id: NodeId,
        command: String,
        details: String,
    },

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Unknown value {value_id} on node {node_id}")]
    UnknownValue { node_id: NodeId, value_id: ValueId },

    #[error("Topology Fault on node {node_id}: {details}")]
    Topology { node_id: NodeId, details: String },

    #[error("Transport Error on {path}: {details}")]
    Transport { path: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),
}
