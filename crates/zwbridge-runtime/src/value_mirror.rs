//! Published representation of one device value.
//!
//! ```text
//! <base>/nodes/<node_id>/values/<label>       property: current data
//! <base>/nodes/<node_id>/values/<label>/set   event: new data
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use zwbridge_middleware::{Behaviour, EventHandler, WatchId};
use zwbridge_types::{NodeId, ValueId};

use crate::context::Context;
use crate::readiness::{InitSignal, InitState};
use crate::reconcile::Mirror;
use crate::router::EngineTask;

/// What the mirror has put on the transport.  Holding the lock across a
/// read and its publish serialises refreshes with each other and with
/// teardown.
#[derive(Default)]
struct Publication {
    // `None` until the first successful publish.
    last: Option<Value>,
    removed: bool,
}

pub struct ValueMirror {
    ctx: Arc<Context>,
    node_id: NodeId,
    value_id: ValueId,
    label: String,
    path: String,
    setter_path: String,
    init: InitSignal,
    publication: tokio::sync::Mutex<Publication>,
    watch: Mutex<Option<WatchId>>,
}

impl ValueMirror {
    /// Construct the mirror.  Nothing is registered until
    /// [`Mirror::initialize`] runs.
    pub fn new(ctx: Arc<Context>, node_id: NodeId, value_id: ValueId, label: String) -> Self {
        let path = ctx.namespace.value(node_id, &label);
        let setter_path = ctx.namespace.value_setter(node_id, &label);
        Self {
            ctx,
            node_id,
            value_id,
            label,
            path,
            setter_path,
            init: InitSignal::new(),
            publication: tokio::sync::Mutex::new(Publication::default()),
            watch: Mutex::new(None),
        }
    }

    pub fn value_id(&self) -> ValueId {
        self.value_id
    }

    /// The allocated path segment.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Path of the value property.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    /// Re-read the value and publish it if it differs from what was last
    /// published.  The very first call always publishes; nothing is
    /// published once the mirror has been removed.
    #[instrument(skip(self), fields(node_id = self.node_id, value_id = self.value_id))]
    pub async fn on_topology_value_changed(&self) {
        let mut publication = self.publication.lock().await;
        self.refresh(&mut publication).await;
    }

    /// Write `arg` into the device value, then republish ground truth.
    #[instrument(skip(self, arg), fields(node_id = self.node_id, value_id = self.value_id))]
    pub async fn on_setter_invoked(&self, arg: Value) {
        let mut publication = self.publication.lock().await;
        if publication.removed {
            debug!(path = %self.setter_path, "value removed; write dropped");
            return;
        }
        if let Err(error) = self.ctx.topology.set_value_data(self.node_id, self.value_id, arg) {
            warn!(path = %self.setter_path, %error, "value write rejected");
        }
        self.refresh(&mut publication).await;
    }

    async fn refresh(&self, publication: &mut Publication) {
        if publication.removed {
            debug!("value removed; refresh skipped");
            return;
        }
        let data = match self.ctx.topology.value_data(self.node_id, self.value_id) {
            Ok(data) => data,
            Err(error) => {
                debug!(%error, "value vanished before refresh");
                return;
            }
        };
        if publication.last.as_ref() == Some(&data) {
            return;
        }
        match self.ctx.client.set_property(&self.path, data.clone()).await {
            Ok(()) => publication.last = Some(data),
            Err(error) => warn!(path = %self.path, %error, "value publish failed"),
        }
    }

    fn setter_handler(&self) -> EventHandler {
        let sender = self.ctx.sender.clone();
        let (node_id, value_id) = (self.node_id, self.value_id);
        Arc::new(move |_path: &str, arg: Option<Value>| {
            sender.send(EngineTask::SetValue { node_id, value_id, arg });
        })
    }

    async fn register_setter(&self) -> Result<(), zwbridge_types::BridgeError> {
        let client = &self.ctx.client;
        client
            .register(
                &self.setter_path,
                Behaviour::EventManyToOne,
                &format!("Set the value of '{}'.", self.label),
                true,
            )
            .await?;
        let watch = client.watch_event(&self.setter_path, self.setter_handler()).await?;
        *self.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch);
        Ok(())
    }
}

#[async_trait]
impl Mirror for ValueMirror {
    #[instrument(
        skip(self),
        fields(node_id = self.node_id, value_id = self.value_id, label = %self.label)
    )]
    async fn initialize(&self) {
        let description = format!("Current value of '{}'.", self.label);
        let register_property =
            self.ctx
                .client
                .register(&self.path, Behaviour::PropertyManyToOne, &description, true);
        let (property, setter, ()) = tokio::join!(
            register_property,
            self.register_setter(),
            self.on_topology_value_changed()
        );

        let mut ok = true;
        for error in [property.err(), setter.err()].into_iter().flatten() {
            warn!(%error, "value registration failed");
            ok = false;
        }
        self.init.resolve(ok);
    }

    #[instrument(
        skip(self),
        fields(node_id = self.node_id, value_id = self.value_id, label = %self.label)
    )]
    async fn remove(&self) {
        if self.init.wait().await == InitState::Failed {
            debug!("initialisation had failed; cleaning up best-effort");
        }
        // Waits out an in-flight publish; later refreshes see `removed`.
        self.publication.lock().await.removed = true;
        let client = &self.ctx.client;

        let watch = self.watch.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(watch) = watch
            && let Err(error) = client.unwatch_event(&self.setter_path, watch).await
        {
            debug!(%error, "setter already unwatched");
        }

        for path in [&self.setter_path, &self.path] {
            if let Err(error) = client.unregister(path).await {
                debug!(%path, %error, "unregister skipped");
            }
        }
        if let Err(error) = client.delete_property(&self.path).await {
            debug!(path = %self.path, %error, "delete skipped");
        }
    }
}
