//! Published representation of one device node.
//!
//! A [`NodeMirror`] owns the fixed attribute properties and command events
//! under `<base>/nodes/<node_id>/` plus one [`ValueMirror`] per value the
//! node currently exposes.  The value set is maintained by the value-diff
//! pass in [`NodeMirror::on_value_set_changed`]; passes of one node are
//! serialised, and the node's label table is only touched inside them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, join_all};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use zwbridge_middleware::{Behaviour, EventHandler, WatchId};
use zwbridge_types::{BridgeError, NodeAttribute, NodeCommand, NodeId, ValueId};

use crate::context::Context;
use crate::label;
use crate::readiness::{InitSignal, InitState};
use crate::reconcile::{ChildSet, Mirror};
use crate::router::EngineTask;
use crate::value_mirror::ValueMirror;

/// State owned by the value-diff pass.  Holding the lock *is* the pass.
#[derive(Default)]
struct ValuePass {
    used_labels: HashSet<String>,
    removed: bool,
}

pub struct NodeMirror {
    ctx: Arc<Context>,
    node_id: NodeId,
    init: InitSignal,
    published: Mutex<HashMap<NodeAttribute, Value>>,
    // Held across an attribute refresh; `true` once removed.
    attribute_pass: tokio::sync::Mutex<bool>,
    watches: Mutex<Vec<(String, WatchId)>>,
    values: Mutex<ChildSet<ValueId, ValueMirror>>,
    value_pass: tokio::sync::Mutex<ValuePass>,
}

impl NodeMirror {
    pub fn new(ctx: Arc<Context>, node_id: NodeId) -> Self {
        Self {
            ctx,
            node_id,
            init: InitSignal::new(),
            published: Mutex::new(HashMap::new()),
            attribute_pass: tokio::sync::Mutex::new(false),
            watches: Mutex::new(Vec::new()),
            values: Mutex::new(ChildSet::new()),
            value_pass: tokio::sync::Mutex::new(ValuePass::default()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    /// The value mirrored for `value_id`, if any.
    pub fn value(&self, value_id: ValueId) -> Option<Arc<ValueMirror>> {
        self.lock_values().get(&value_id)
    }

    /// Ids of every mirrored value.
    pub fn value_ids(&self) -> BTreeSet<ValueId> {
        self.lock_values().keys()
    }

    /// Last published attribute snapshot.
    pub fn published(&self) -> HashMap<NodeAttribute, Value> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read every fixed attribute and republish it unconditionally.
    /// Does nothing once the node has been removed.
    #[instrument(skip(self), fields(node_id = self.node_id))]
    pub async fn on_node_changed(&self) {
        let removed = self.attribute_pass.lock().await;
        if *removed {
            debug!("node already removed; refresh skipped");
            return;
        }
        let topology = &self.ctx.topology;
        let mut snapshot = Vec::with_capacity(NodeAttribute::ALL.len());
        for attribute in NodeAttribute::ALL {
            match topology.node_attribute(self.node_id, attribute) {
                Ok(value) => snapshot.push((attribute, value)),
                Err(error) => {
                    debug!(%error, "node vanished before refresh");
                    return;
                }
            }
        }

        let publishes = snapshot.iter().map(|(attribute, value)| {
            let path = self.ctx.namespace.node_leaf(self.node_id, attribute.segment());
            async move {
                let result = self.ctx.client.set_property(&path, value.clone()).await;
                if let Err(error) = &result {
                    warn!(%path, %error, "attribute publish failed");
                }
                result.is_ok()
            }
        });
        let results = join_all(publishes).await;

        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        for ((attribute, value), ok) in snapshot.into_iter().zip(results) {
            if ok {
                published.insert(attribute, value);
            }
        }
    }

    /// Reconcile the mirrored values against the node's current value set,
    /// then refresh `trigger` if it survived.
    #[instrument(skip(self), fields(node_id = self.node_id))]
    pub async fn on_value_set_changed(&self, trigger: Option<ValueId>) {
        let mut pass = self.value_pass.lock().await;
        if pass.removed {
            debug!("node already removed; value pass skipped");
            return;
        }

        let current = match self.ctx.topology.value_ids(self.node_id) {
            Ok(ids) => ids,
            Err(error) => {
                debug!(%error, "node vanished; treating as having no values");
                BTreeSet::new()
            }
        };

        let ValuePass { used_labels, .. } = &mut *pass;
        let (diff, survivor) = {
            let mut values = self.lock_values();
            let diff = values.reconcile(&current, |value_id| {
                let raw = self
                    .ctx
                    .topology
                    .value_label(self.node_id, value_id)
                    .unwrap_or_default();
                let label = label::allocate(&raw, used_labels);
                used_labels.insert(label.clone());
                ValueMirror::new(Arc::clone(&self.ctx), self.node_id, value_id, label)
            });
            let survivor = trigger
                .filter(|id| !diff.removed.iter().any(|(k, _)| k == id))
                .and_then(|id| values.get(&id));
            (diff, survivor)
        };
        if !diff.is_empty() {
            debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                "value set changed"
            );
        }

        let mut ops: Vec<BoxFuture<'_, ()>> = Vec::new();
        for (_, value) in &diff.added {
            ops.push(value.initialize());
        }
        for (_, value) in &diff.removed {
            ops.push(value.remove());
        }
        if let Some(value) = &survivor {
            ops.push(value.on_topology_value_changed().boxed());
        }
        join_all(ops).await;
    }

    /// Validate a command event's argument and forward it to the device.
    #[instrument(skip(self, arg), fields(node_id = self.node_id))]
    pub async fn on_command(&self, command: NodeCommand, arg: Option<Value>) {
        let path = self.ctx.namespace.node_leaf(self.node_id, command.segment());
        let request = match command.parse(arg.as_ref()) {
            Ok(request) => request,
            Err(error) => {
                error!(%path, %error, "command not forwarded");
                return;
            }
        };

        let topology = &self.ctx.topology;
        if command == NodeCommand::RemoveFailedNode {
            match topology.is_failed(self.node_id) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%path, "node has not failed; removal refused");
                    return;
                }
                Err(error) => {
                    debug!(%error, "node vanished before command");
                    return;
                }
            }
        }

        match topology.execute(self.node_id, &request) {
            Ok(()) => info!(%path, ?request, "command forwarded"),
            Err(error) => warn!(%path, %error, "command rejected"),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock_values(&self) -> MutexGuard<'_, ChildSet<ValueId, ValueMirror>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command_handler(&self, command: NodeCommand) -> EventHandler {
        let sender = self.ctx.sender.clone();
        let node_id = self.node_id;
        Arc::new(move |_path: &str, arg: Option<Value>| {
            sender.send(EngineTask::Command { node_id, command, arg });
        })
    }

    async fn register_command(&self, command: NodeCommand) -> Result<(), BridgeError> {
        let client = &self.ctx.client;
        let path = self.ctx.namespace.node_leaf(self.node_id, command.segment());
        client
            .register(&path, Behaviour::EventManyToOne, command.description(), true)
            .await?;
        let watch = client.watch_event(&path, self.command_handler(command)).await?;
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path, watch));
        Ok(())
    }

    async fn register_attribute(&self, attribute: NodeAttribute) -> Result<(), BridgeError> {
        let path = self.ctx.namespace.node_leaf(self.node_id, attribute.segment());
        self.ctx
            .client
            .register(&path, Behaviour::PropertyManyToOne, attribute.description(), true)
            .await
    }
}

#[async_trait]
impl Mirror for NodeMirror {
    #[instrument(skip(self), fields(node_id = self.node_id))]
    async fn initialize(&self) {
        let mut registrations: Vec<BoxFuture<'_, Result<(), BridgeError>>> = Vec::new();
        for attribute in NodeAttribute::ALL {
            registrations.push(self.register_attribute(attribute).boxed());
        }
        for command in NodeCommand::ALL {
            registrations.push(self.register_command(command).boxed());
        }

        let (results, ()) = tokio::join!(join_all(registrations), self.on_node_changed());

        let mut ok = true;
        for error in results.into_iter().filter_map(Result::err) {
            warn!(%error, "node registration failed");
            ok = false;
        }
        self.init.resolve(ok);
    }

    #[instrument(skip(self), fields(node_id = self.node_id))]
    async fn remove(&self) {
        if self.init.wait().await == InitState::Failed {
            debug!("initialisation had failed; cleaning up best-effort");
        }

        // Stop further value passes, then tear down what the last one left.
        let values = {
            let mut pass = self.value_pass.lock().await;
            pass.removed = true;
            self.lock_values().drain()
        };
        join_all(values.iter().map(|value| value.remove())).await;

        // Waits out an in-flight attribute refresh.
        *self.attribute_pass.lock().await = true;

        let client = &self.ctx.client;
        let watches = {
            let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *watches)
        };
        for (path, watch) in &watches {
            if let Err(error) = client.unwatch_event(path, *watch).await {
                debug!(%path, %error, "command already unwatched");
            }
        }

        for command in NodeCommand::ALL {
            let path = self.ctx.namespace.node_leaf(self.node_id, command.segment());
            if let Err(error) = client.unregister(&path).await {
                debug!(%path, %error, "unregister skipped");
            }
        }
        for attribute in NodeAttribute::ALL {
            let path = self.ctx.namespace.node_leaf(self.node_id, attribute.segment());
            if let Err(error) = client.unregister(&path).await {
                debug!(%path, %error, "unregister skipped");
            }
            if let Err(error) = client.delete_property(&path).await {
                debug!(%path, %error, "delete skipped");
            }
        }
    }
}
