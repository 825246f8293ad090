//! Root of the mirror tree.
//!
//! [`NetworkMirror`] publishes the network-wide properties and owns one
//! [`NodeMirror`] per node the topology source currently reports.
//!
//! ```text
//! <base>/state     property: string
//! <base>/ready     property: boolean
//! <base>/home_id   property: integer
//! <base>/nodes/…   one NodeMirror per node
//! ```
//!
//! Node-diff passes are serialised; lookups used by the router
//! ([`NetworkMirror::node`], [`NetworkMirror::value`]) never wait for a pass.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, join_all};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use zwbridge_middleware::{Behaviour, path};
use zwbridge_types::{BridgeError, HomeId, NetworkState, NodeId, ValueId};

use crate::context::Context;
use crate::node_mirror::NodeMirror;
use crate::readiness::{InitSignal, InitState};
use crate::reconcile::{ChildSet, Mirror};
use crate::value_mirror::ValueMirror;

/// Network-wide fields as last published.  `None` means never published.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetworkSnapshot {
    pub state: Option<NetworkState>,
    pub ready: Option<bool>,
    pub home_id: Option<HomeId>,
}

#[derive(Default)]
struct Publication {
    snapshot: NetworkSnapshot,
    removed: bool,
}

pub struct NetworkMirror {
    ctx: Arc<Context>,
    init: InitSignal,
    published: tokio::sync::Mutex<Publication>,
    nodes: Mutex<ChildSet<NodeId, NodeMirror>>,
    // Held for the duration of a node-diff pass; `true` once removed.
    node_pass: tokio::sync::Mutex<bool>,
}

impl NetworkMirror {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            init: InitSignal::new(),
            published: tokio::sync::Mutex::new(Publication::default()),
            nodes: Mutex::new(ChildSet::new()),
            node_pass: tokio::sync::Mutex::new(false),
        }
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    /// The mirror of `node_id`, if mirrored.
    pub fn node(&self, node_id: NodeId) -> Option<Arc<NodeMirror>> {
        self.lock_nodes().get(&node_id)
    }

    /// The mirror of a value, if both its node and the value are mirrored.
    pub fn value(&self, node_id: NodeId, value_id: ValueId) -> Option<Arc<ValueMirror>> {
        self.node(node_id)?.value(value_id)
    }

    /// Ids of every mirrored node.
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.lock_nodes().keys()
    }

    /// Network fields as last published.
    pub async fn snapshot(&self) -> NetworkSnapshot {
        self.published.lock().await.snapshot.clone()
    }

    /// Re-read state and home id and republish the fields that changed.
    ///
    /// A transition into ready re-runs [`NodeMirror::on_node_changed`] once
    /// on every mirrored node: attributes such as the neighbour list are only
    /// complete once the network is ready.
    #[instrument(skip(self))]
    pub async fn on_network_state_changed(&self) {
        let became_ready = {
            let mut publication = self.published.lock().await;
            if publication.removed {
                debug!("network already removed; refresh skipped");
                return;
            }
            let published = &mut publication.snapshot;
            let topology = &self.ctx.topology;
            let state = topology.state();
            let ready = state.is_ready();
            let home_id = topology.home_id();
            let became_ready = ready && published.ready != Some(true);

            let (state_ok, ready_ok, home_ok) = tokio::join!(
                self.publish_if_changed(
                    path::STATE,
                    published.state != Some(state),
                    json!(state.as_str())
                ),
                self.publish_if_changed(path::READY, published.ready != Some(ready), json!(ready)),
                self.publish_if_changed(
                    path::HOME_ID,
                    published.home_id != Some(home_id),
                    json!(home_id)
                ),
            );
            if state_ok {
                published.state = Some(state);
                info!(%state, "network state published");
            }
            if ready_ok {
                published.ready = Some(ready);
            }
            if home_ok {
                published.home_id = Some(home_id);
            }
            became_ready
        };

        if became_ready {
            let nodes = self.lock_nodes().children();
            debug!(nodes = nodes.len(), "network ready; refreshing every node");
            join_all(nodes.iter().map(|node| node.on_node_changed())).await;
        }
    }

    /// Reconcile the mirrored nodes against the topology's node set.
    ///
    /// Every added node is initialised and then given its first value pass.
    /// A trigger node that survives the pass without being added gets
    /// [`NodeMirror::on_node_changed`].
    #[instrument(skip(self))]
    pub async fn on_node_set_changed(&self, trigger: Option<NodeId>) {
        let removed = self.node_pass.lock().await;
        if *removed {
            debug!("network already removed; node pass skipped");
            return;
        }

        let current = self.ctx.topology.node_ids();
        let (diff, survivor) = {
            let mut nodes = self.lock_nodes();
            let diff = nodes.reconcile(&current, |node_id| {
                NodeMirror::new(Arc::clone(&self.ctx), node_id)
            });
            let survivor = trigger
                .filter(|id| !diff.touches(id))
                .and_then(|id| nodes.get(&id));
            (diff, survivor)
        };
        if !diff.is_empty() {
            info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                "node set changed"
            );
        }

        let mut ops: Vec<BoxFuture<'_, ()>> = Vec::new();
        for (_, node) in &diff.added {
            ops.push(
                async move {
                    node.initialize().await;
                    node.on_value_set_changed(None).await;
                }
                .boxed(),
            );
        }
        for (_, node) in &diff.removed {
            ops.push(node.remove());
        }
        if let Some(node) = &survivor {
            ops.push(node.on_node_changed().boxed());
        }
        join_all(ops).await;
    }

    /// Refresh the attributes of a mirrored node; no-op otherwise.
    pub async fn on_node_changed(&self, node_id: NodeId) {
        match self.node(node_id) {
            Some(node) => node.on_node_changed().await,
            None => debug!(node_id, "change for unmirrored node ignored"),
        }
    }

    /// Run a value pass on the owning node, triggered by `value_id`; no-op if
    /// the node is not mirrored.
    pub async fn on_value_changed(&self, node_id: NodeId, value_id: ValueId) {
        match self.node(node_id) {
            Some(node) => node.on_value_set_changed(Some(value_id)).await,
            None => debug!(node_id, value_id, "value change for unmirrored node ignored"),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock_nodes(&self) -> MutexGuard<'_, ChildSet<NodeId, NodeMirror>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `value` on `<base>/<leaf>` when `changed`.  Returns `true` when
    /// the field is now up to date.
    async fn publish_if_changed(&self, leaf: &str, changed: bool, value: Value) -> bool {
        if !changed {
            return false;
        }
        let path = self.ctx.namespace.network(leaf);
        match self.ctx.client.set_property(&path, value).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%path, %error, "network publish failed");
                false
            }
        }
    }

    async fn register(&self, leaf: &str, description: &str) -> Result<(), BridgeError> {
        let path = self.ctx.namespace.network(leaf);
        self.ctx
            .client
            .register(&path, Behaviour::PropertyManyToOne, description, true)
            .await
    }
}

const NETWORK_PROPERTIES: [(&str, &str); 3] = [
    (path::READY, "Is the ZWave network ready?"),
    (path::STATE, "The current ZWave network state."),
    (path::HOME_ID, "The ZWave network home ID."),
];

#[async_trait]
impl Mirror for NetworkMirror {
    #[instrument(skip(self))]
    async fn initialize(&self) {
        let registrations = join_all(
            NETWORK_PROPERTIES
                .iter()
                .map(|(leaf, description)| self.register(leaf, description)),
        );
        let (results, ()) = tokio::join!(registrations, self.on_network_state_changed());

        let mut ok = true;
        for error in results.into_iter().filter_map(Result::err) {
            warn!(%error, "network registration failed");
            ok = false;
        }
        self.init.resolve(ok);
    }

    #[instrument(skip(self))]
    async fn remove(&self) {
        let nodes = {
            let mut removed = self.node_pass.lock().await;
            *removed = true;
            self.lock_nodes().drain()
        };
        join_all(nodes.iter().map(|node| node.remove())).await;

        if self.init.wait().await == InitState::Failed {
            debug!("initialisation had failed; cleaning up best-effort");
        }
        self.published.lock().await.removed = true;
        let client = &self.ctx.client;
        for (leaf, _) in NETWORK_PROPERTIES {
            let path = self.ctx.namespace.network(leaf);
            if let Err(error) = client.unregister(&path).await {
                debug!(%path, %error, "unregister skipped");
            }
            if let Err(error) = client.delete_property(&path).await {
                debug!(%path, %error, "delete skipped");
            }
        }
    }
}
