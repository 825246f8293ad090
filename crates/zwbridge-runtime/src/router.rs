//! Event router: hand-off from foreign contexts onto the engine.
//!
//! The topology source and the transport's watch callbacks call into the
//! bridge from threads the engine does not own.  They only push an
//! [`EngineTask`] through a [`NotificationSender`] (a non-async, `Clone +
//! Send + Sync` handle over an unbounded Tokio `mpsc` channel).  The
//! [`EventRouter`] drains the channel on the engine's runtime and spawns one
//! dispatch task per entry, which calls the matching mirror method.
//!
//! | Task | Dispatched to |
//! |---|---|
//! | `NetworkStateChanged` | [`NetworkMirror::on_network_state_changed`] |
//! | `NodeAdded` / `NodeRemoved` | [`NetworkMirror::on_node_set_changed`] |
//! | `NodeEvent` | [`NetworkMirror::on_node_changed`] |
//! | `Value*` | [`NetworkMirror::on_value_changed`] |
//! | `SetValue` | [`ValueMirror::on_setter_invoked`] |
//! | `Command` | [`NodeMirror::on_command`] |
//!
//! [`ValueMirror::on_setter_invoked`]: crate::value_mirror::ValueMirror::on_setter_invoked
//! [`NodeMirror::on_command`]: crate::node_mirror::NodeMirror::on_command

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, trace};
use zwbridge_hal::{NotificationSink, TopologyNotification};
use zwbridge_types::{NodeCommand, NodeId, ValueId};

use crate::network_mirror::NetworkMirror;

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineTask {
    /// A change notification from the topology source.
    Topology(TopologyNotification),
    /// A value's setter event was sent on the transport.
    SetValue {
        node_id: NodeId,
        value_id: ValueId,
        arg: Option<Value>,
    },
    /// A node command event was sent on the transport.
    Command {
        node_id: NodeId,
        command: NodeCommand,
        arg: Option<Value>,
    },
}

/// Thread-safe, non-blocking handle for enqueuing [`EngineTask`]s.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<EngineTask>,
}

impl NotificationSender {
    /// Enqueue a task.  Tasks sent after the router is gone are dropped.
    pub fn send(&self, task: EngineTask) {
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            debug!(?task, "engine stopped; task dropped");
        }
    }
}

impl NotificationSink for NotificationSender {
    fn notify(&self, notification: TopologyNotification) {
        self.send(EngineTask::Topology(notification));
    }
}

/// Create the hand-off queue.
pub fn channel() -> (NotificationSender, mpsc::UnboundedReceiver<EngineTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, rx)
}

/// Drains the hand-off queue and runs every task against the mirror tree.
pub struct EventRouter {
    rx: mpsc::UnboundedReceiver<EngineTask>,
    network: Arc<NetworkMirror>,
    in_flight: JoinSet<()>,
}

impl EventRouter {
    pub fn new(rx: mpsc::UnboundedReceiver<EngineTask>, network: Arc<NetworkMirror>) -> Self {
        Self {
            rx,
            network,
            in_flight: JoinSet::new(),
        }
    }

    /// Number of dispatches that have been spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Route tasks until `shutdown` completes or every sender is dropped.
    /// In-flight dispatches are left running; see [`EventRouter::drain`].
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("router shutdown requested");
                    break;
                }
                task = self.rx.recv() => match task {
                    Some(task) => self.spawn(task),
                    None => {
                        debug!("every sender dropped; router stopping");
                        break;
                    }
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    Self::reap(joined);
                }
            }
        }
    }

    /// Route tasks until the queue is empty and no dispatch is in flight.
    ///
    /// Dispatches may enqueue further tasks (a value write makes the source
    /// emit a change notification), so this keeps going until both are
    /// exhausted.
    pub async fn run_until_idle(&mut self) {
        loop {
            while let Ok(task) = self.rx.try_recv() {
                self.spawn(task);
            }
            match self.in_flight.join_next().await {
                Some(joined) => Self::reap(joined),
                None => break,
            }
        }
    }

    /// Wait for every in-flight dispatch without accepting new tasks.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            Self::reap(joined);
        }
    }

    fn spawn(&mut self, task: EngineTask) {
        trace!(?task, "dispatching");
        let network = Arc::clone(&self.network);
        self.in_flight.spawn(dispatch(network, task));
    }

    fn reap(joined: Result<(), tokio::task::JoinError>) {
        if let Err(error) = joined {
            error!(%error, "dispatch task failed");
        }
    }
}

/// Run one task against the mirror tree.
pub async fn dispatch(network: Arc<NetworkMirror>, task: EngineTask) {
    match task {
        EngineTask::Topology(notification) => match notification {
            TopologyNotification::NetworkStateChanged => network.on_network_state_changed().await,
            TopologyNotification::NodeAdded(node_id)
            | TopologyNotification::NodeRemoved(node_id) => {
                network.on_node_set_changed(Some(node_id)).await
            }
            TopologyNotification::NodeEvent(node_id) => network.on_node_changed(node_id).await,
            TopologyNotification::ValueAdded { node_id, value_id }
            | TopologyNotification::ValueRemoved { node_id, value_id }
            | TopologyNotification::ValueRefreshed { node_id, value_id }
            | TopologyNotification::ValueChanged { node_id, value_id } => {
                network.on_value_changed(node_id, value_id).await
            }
        },
        EngineTask::SetValue {
            node_id,
            value_id,
            arg,
        } => match network.value(node_id, value_id) {
            Some(value) => value.on_setter_invoked(arg.unwrap_or(Value::Null)).await,
            None => debug!(node_id, value_id, "setter for unmirrored value ignored"),
        },
        EngineTask::Command { node_id, command, arg } => match network.node(node_id) {
            Some(node) => node.on_command(command, arg).await,
            None => debug!(node_id, %command, "command for unmirrored node ignored"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_enqueues_topology_tasks() {
        let (sender, mut rx) = channel();
        sender.notify(TopologyNotification::NodeAdded(5));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineTask::Topology(TopologyNotification::NodeAdded(5))
        );
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (sender, rx) = channel();
        drop(rx);
        sender.send(EngineTask::Topology(TopologyNotification::NetworkStateChanged));
    }

    #[test]
    fn sender_is_usable_from_foreign_threads() {
        let (sender, mut rx) = channel();
        std::thread::spawn(move || {
            sender.notify(TopologyNotification::NodeEvent(1));
        })
        .join()
        .unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
