//! Collaborators shared by every mirror of one bridge.

use std::sync::Arc;

use zwbridge_hal::Topology;
use zwbridge_middleware::{Namespace, PubSubClient};

use crate::router::NotificationSender;

/// Transport, topology source, path layout and the hand-off queue back into
/// the engine.  One instance is shared (behind an `Arc`) by the whole mirror
/// tree.
pub struct Context {
    pub client: Arc<dyn PubSubClient>,
    pub topology: Arc<dyn Topology>,
    pub namespace: Namespace,
    pub sender: NotificationSender,
}
