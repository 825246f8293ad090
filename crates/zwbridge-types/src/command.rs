//! Node commands exposed as events and the argument parsing that guards them.
//!
//! Every event published under `<base>/nodes/<node_id>/` maps to one
//! [`NodeCommand`].  The raw event argument is validated by
//! [`NodeCommand::parse`] into a typed [`NodeCommandRequest`] before anything
//! is forwarded to the topology source, so a malformed argument can never
//! reach the device.
//!
//! | Event | Argument |
//! |---|---|
//! | `heal` | optional boolean (update routes) |
//! | `set_config_param` | `[param_id, value]` or `[param_id, value, size_bytes]` |
//! | `request_config_param` | `param_id` |
//! | everything else | none |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BridgeError;

/// Accepted widths of a configuration parameter, in bytes.
const CONFIG_PARAM_SIZES: [u8; 3] = [1, 2, 4];

/// A command event registered for every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeCommand {
    Heal,
    SetConfigParam,
    RemoveFailedNode,
    AssignReturnRoute,
    RefreshInfo,
    RequestState,
    NeighbourUpdate,
    RequestAllConfigParams,
    RequestConfigParam,
}

impl NodeCommand {
    /// Every command, in registration order.
    pub const ALL: [NodeCommand; 9] = [
        NodeCommand::Heal,
        NodeCommand::SetConfigParam,
        NodeCommand::RemoveFailedNode,
        NodeCommand::AssignReturnRoute,
        NodeCommand::RefreshInfo,
        NodeCommand::RequestState,
        NodeCommand::NeighbourUpdate,
        NodeCommand::RequestAllConfigParams,
        NodeCommand::RequestConfigParam,
    ];

    /// Path segment under `<base>/nodes/<node_id>/`.
    pub fn segment(self) -> &'static str {
        match self {
            NodeCommand::Heal => "heal",
            NodeCommand::SetConfigParam => "set_config_param",
            NodeCommand::RemoveFailedNode => "remove_failed_node",
            NodeCommand::AssignReturnRoute => "assign_return_route",
            NodeCommand::RefreshInfo => "refresh_info",
            NodeCommand::RequestState => "request_state",
            NodeCommand::NeighbourUpdate => "neighbour_update",
            NodeCommand::RequestAllConfigParams => "request_all_config_params",
            NodeCommand::RequestConfigParam => "request_config_param",
        }
    }

    /// Human-readable description sent along with the registration.
    pub fn description(self) -> &'static str {
        match self {
            NodeCommand::Heal => {
                "Send the ZWave 'heal' command to the node. If the value is true, also updates \
                 routes."
            }
            NodeCommand::SetConfigParam => {
                "Set a particular config parameter to a new value. Takes an array of 2 or 3 \
                 arguments: the param ID, value and optionally the size in bytes."
            }
            NodeCommand::RemoveFailedNode => {
                "Remove this node from the network. The node must have failed."
            }
            NodeCommand::AssignReturnRoute => {
                "Request the node re-find its return route to the controller."
            }
            NodeCommand::RefreshInfo => "Request an update of all ZWave info.",
            NodeCommand::RequestState => "Trigger fetching of dynamic ZWave info (e.g. values).",
            NodeCommand::NeighbourUpdate => "Request the node update its neighbour tables.",
            NodeCommand::RequestAllConfigParams => {
                "Request known config params be fetched from the node."
            }
            NodeCommand::RequestConfigParam => "Request a particular config parameter be reported.",
        }
    }

    /// Validate a raw event argument and turn it into a typed request.
    ///
    /// An absent argument and JSON `null` are treated identically.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedArgument`] when the argument does not
    /// have the shape documented for this command.
    pub fn parse(self, arg: Option<&Value>) -> Result<NodeCommandRequest, BridgeError> {
        let arg = arg.filter(|v| !v.is_null());
        match self {
            NodeCommand::Heal => match arg {
                None => Ok(NodeCommandRequest::Heal { update_routes: false }),
                Some(Value::Bool(update_routes)) => Ok(NodeCommandRequest::Heal {
                    update_routes: *update_routes,
                }),
                Some(other) => {
                    Err(self.malformed(format!("expected an optional boolean, got {other}")))
                }
            },
            NodeCommand::SetConfigParam => self.parse_set_config_param(arg),
            NodeCommand::RequestConfigParam => {
                let Some(raw) = arg else {
                    return Err(self.malformed("expected a parameter id, got nothing"));
                };
                Ok(NodeCommandRequest::RequestConfigParam {
                    param_id: self.param_id(raw)?,
                })
            }
            NodeCommand::RemoveFailedNode
            | NodeCommand::AssignReturnRoute
            | NodeCommand::RefreshInfo
            | NodeCommand::RequestState
            | NodeCommand::NeighbourUpdate
            | NodeCommand::RequestAllConfigParams => {
                if let Some(other) = arg {
                    return Err(self.malformed(format!("takes no argument, got {other}")));
                }
                self.bare_request()
                    .ok_or_else(|| self.malformed("requires an argument"))
            }
        }
    }

    /// The request of a command that takes no argument, `None` for the
    /// commands that do.
    fn bare_request(self) -> Option<NodeCommandRequest> {
        match self {
            NodeCommand::RemoveFailedNode => Some(NodeCommandRequest::RemoveFailedNode),
            NodeCommand::AssignReturnRoute => Some(NodeCommandRequest::AssignReturnRoute),
            NodeCommand::RefreshInfo => Some(NodeCommandRequest::RefreshInfo),
            NodeCommand::RequestState => Some(NodeCommandRequest::RequestState),
            NodeCommand::NeighbourUpdate => Some(NodeCommandRequest::NeighbourUpdate),
            NodeCommand::RequestAllConfigParams => Some(NodeCommandRequest::RequestAllConfigParams),
            NodeCommand::Heal | NodeCommand::SetConfigParam | NodeCommand::RequestConfigParam => {
                None
            }
        }
    }

    fn parse_set_config_param(
        self,
        arg: Option<&Value>,
    ) -> Result<NodeCommandRequest, BridgeError> {
        let items = match arg {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(
                    self.malformed(format!("expected [param_id, value, size?], got {other}"))
                );
            }
            None => return Err(self.malformed("expected [param_id, value, size?], got nothing")),
        };
        let (raw_id, raw_value, raw_size) = match items.as_slice() {
            [id, value] => (id, value, None),
            [id, value, size] => (id, value, Some(size)),
            _ => {
                return Err(self.malformed(format!(
                    "expected 2 or 3 elements, got {}",
                    items.len()
                )));
            }
        };

        let param_id = self.param_id(raw_id)?;
        let value = raw_value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| {
                self.malformed(format!("value must be a 32-bit integer, got {raw_value}"))
            })?;
        let size = match raw_size {
            None => None,
            Some(raw) => {
                let size = raw
                    .as_u64()
                    .and_then(|s| u8::try_from(s).ok())
                    .filter(|s| CONFIG_PARAM_SIZES.contains(s))
                    .ok_or_else(|| {
                        self.malformed(format!("size must be 1, 2 or 4 bytes, got {raw}"))
                    })?;
                Some(size)
            }
        };

        Ok(NodeCommandRequest::SetConfigParam {
            param_id,
            value,
            size,
        })
    }

    fn param_id(self, raw: &Value) -> Result<u8, BridgeError> {
        raw.as_u64()
            .and_then(|id| u8::try_from(id).ok())
            .ok_or_else(|| {
                self.malformed(format!("parameter id must be an integer in 0..=255, got {raw}"))
            })
    }

    fn malformed(self, details: impl Into<String>) -> BridgeError {
        BridgeError::MalformedArgument {
            command: self.segment().to_string(),
            details: details.into(),
        }
    }
}

impl std::fmt::Display for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.segment())
    }
}

/// A validated command, ready to be executed by the topology source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args")]
pub enum NodeCommandRequest {
    Heal { update_routes: bool },
    AssignReturnRoute,
    RefreshInfo,
    RequestState,
    NeighbourUpdate,
    RequestAllConfigParams,
    RequestConfigParam { param_id: u8 },
    SetConfigParam { param_id: u8, value: i32, size: Option<u8> },
    RemoveFailedNode,
}

impl NodeCommandRequest {
    /// The command this request was parsed for.
    pub fn command(&self) -> NodeCommand {
        match self {
            NodeCommandRequest::Heal { .. } => NodeCommand::Heal,
            NodeCommandRequest::AssignReturnRoute => NodeCommand::AssignReturnRoute,
            NodeCommandRequest::RefreshInfo => NodeCommand::RefreshInfo,
            NodeCommandRequest::RequestState => NodeCommand::RequestState,
            NodeCommandRequest::NeighbourUpdate => NodeCommand::NeighbourUpdate,
            NodeCommandRequest::RequestAllConfigParams => NodeCommand::RequestAllConfigParams,
            NodeCommandRequest::RequestConfigParam { .. } => NodeCommand::RequestConfigParam,
            NodeCommandRequest::SetConfigParam { .. } => NodeCommand::SetConfigParam,
            NodeCommandRequest::RemoveFailedNode => NodeCommand::RemoveFailedNode,
        }
    }
}
