//! In-process publish/subscribe transport.
//!
//! [`LocalBus`] implements [`PubSubClient`] entirely in memory: registered
//! paths, property values and event watchers live in one shared table.
//! Every operation is broadcast on a [`tokio::sync::broadcast`] channel so
//! observers such as the CLI's log printer can follow the traffic.  Buses
//! built with [`LocalBus::with_journal`] also keep every operation in an
//! unbounded journal, which tests use to assert on ordering.
//!
//! # Operations
//!
//! | [`BusOp`] | Produced by |
//! |---|---|
//! | `Register` / `Unregister` | [`PubSubClient::register`] / [`PubSubClient::unregister`] |
//! | `SetProperty` / `DeleteProperty` | [`PubSubClient::set_property`] / [`PubSubClient::delete_property`] |
//! | `Watch` / `Unwatch` | [`PubSubClient::watch_event`] / [`PubSubClient::unwatch_event`] |
//! | `SendEvent` | [`LocalBus::send_event`] |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use zwbridge_types::BridgeError;

use crate::transport::{Behaviour, EventHandler, PubSubClient, WatchId};

/// Default capacity of the operation broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// One operation observed by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusOp {
    Register { path: String, behaviour: Behaviour },
    Unregister { path: String },
    SetProperty { path: String, value: Value },
    DeleteProperty { path: String },
    Watch { path: String, watch: WatchId },
    Unwatch { path: String, watch: WatchId },
    SendEvent { path: String, arg: Option<Value> },
}

impl BusOp {
    /// The path the operation targeted.
    pub fn path(&self) -> &str {
        match self {
            BusOp::Register { path, .. }
            | BusOp::Unregister { path }
            | BusOp::SetProperty { path, .. }
            | BusOp::DeleteProperty { path }
            | BusOp::Watch { path, .. }
            | BusOp::Unwatch { path, .. }
            | BusOp::SendEvent { path, .. } => path,
        }
    }
}

struct Registration {
    behaviour: Behaviour,
    delete_on_unregister: bool,
}

#[derive(Default)]
struct BusState {
    registrations: HashMap<String, Registration>,
    properties: HashMap<String, Value>,
    watchers: HashMap<String, Vec<(WatchId, EventHandler)>>,
    // `None` unless the bus was built with a journal.
    journal: Option<Vec<BusOp>>,
    failing_prefixes: Vec<String>,
    next_watch: u64,
}

/// Shared in-memory transport.  Clone it cheaply – all clones share the same
/// underlying tables.
#[derive(Clone)]
pub struct LocalBus {
    state: Arc<Mutex<BusState>>,
    ops: broadcast::Sender<BusOp>,
}

impl LocalBus {
    /// Create a bus whose operation channel buffers `capacity` operations for
    /// slow observers.
    pub fn new(capacity: usize) -> Self {
        let (ops, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            ops,
        }
    }

    /// Create a bus that also records every operation; see
    /// [`LocalBus::journal`].  The journal is never trimmed.
    pub fn with_journal() -> Self {
        let bus = Self::new(DEFAULT_CAPACITY);
        bus.lock().journal = Some(Vec::new());
        bus
    }

    /// Subscribe to every future operation on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusOp> {
        self.ops.subscribe()
    }

    /// Send an event on `path`, invoking every watcher.
    ///
    /// Returns the number of handlers that were invoked.  Handlers run on
    /// the caller's thread after the internal lock has been released.
    pub fn send_event(&self, path: &str, arg: Option<Value>) -> usize {
        let handlers: Vec<EventHandler> = {
            let mut state = self.lock();
            self.record(
                &mut state,
                BusOp::SendEvent {
                    path: path.to_string(),
                    arg: arg.clone(),
                },
            );
            state
                .watchers
                .get(path)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in &handlers {
            handler(path, arg.clone());
        }
        handlers.len()
    }

    /// Make every future registration of a path starting with `prefix` fail.
    pub fn fail_registrations_under(&self, prefix: impl Into<String>) {
        self.lock().failing_prefixes.push(prefix.into());
    }

    /// Current value of a property, if any.
    pub fn property(&self, path: &str) -> Option<Value> {
        self.lock().properties.get(path).cloned()
    }

    /// Return `true` if `path` is currently registered.
    pub fn is_registered(&self, path: &str) -> bool {
        self.lock().registrations.contains_key(path)
    }

    /// Behaviour `path` was registered with.
    pub fn behaviour(&self, path: &str) -> Option<Behaviour> {
        self.lock().registrations.get(path).map(|r| r.behaviour)
    }

    /// Number of handlers currently watching `path`.
    pub fn watcher_count(&self, path: &str) -> usize {
        self.lock().watchers.get(path).map_or(0, Vec::len)
    }

    /// Every registered path, property path or watched path that starts with
    /// `prefix`, sorted and deduplicated.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let state = self.lock();
        let mut paths: Vec<String> = state
            .registrations
            .keys()
            .chain(state.properties.keys())
            .chain(state.watchers.iter().filter(|(_, w)| !w.is_empty()).map(|(p, _)| p))
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Snapshot of every operation recorded so far.  Always empty for a
    /// bus built without a journal.
    pub fn journal(&self) -> Vec<BusOp> {
        self.lock().journal.clone().unwrap_or_default()
    }

    /// Forget every recorded operation.
    pub fn clear_journal(&self) {
        if let Some(journal) = &mut self.lock().journal {
            journal.clear();
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, state: &mut BusState, op: BusOp) {
        if let Some(journal) = &mut state.journal {
            journal.push(op.clone());
        }
        // No observers is a normal condition.
        let _ = self.ops.send(op);
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl PubSubClient for LocalBus {
    async fn register(
        &self,
        path: &str,
        behaviour: Behaviour,
        _description: &str,
        delete_on_unregister: bool,
    ) -> Result<(), BridgeError> {
        let mut state = self.lock();
        if state.failing_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            warn!(path, "registration refused");
            return Err(BridgeError::Transport {
                path: path.to_string(),
                details: "registration refused".to_string(),
            });
        }
        state.registrations.insert(
            path.to_string(),
            Registration {
                behaviour,
                delete_on_unregister,
            },
        );
        self.record(
            &mut state,
            BusOp::Register {
                path: path.to_string(),
                behaviour,
            },
        );
        Ok(())
    }

    async fn unregister(&self, path: &str) -> Result<(), BridgeError> {
        let mut state = self.lock();
        let Some(registration) = state.registrations.remove(path) else {
            return Err(BridgeError::Transport {
                path: path.to_string(),
                details: "path is not registered".to_string(),
            });
        };
        if registration.delete_on_unregister && registration.behaviour.is_property() {
            state.properties.remove(path);
        }
        self.record(
            &mut state,
            BusOp::Unregister {
                path: path.to_string(),
            },
        );
        Ok(())
    }

    async fn set_property(&self, path: &str, value: Value) -> Result<(), BridgeError> {
        let mut state = self.lock();
        state.properties.insert(path.to_string(), value.clone());
        self.record(
            &mut state,
            BusOp::SetProperty {
                path: path.to_string(),
                value,
            },
        );
        Ok(())
    }

    async fn delete_property(&self, path: &str) -> Result<(), BridgeError> {
        let mut state = self.lock();
        state.properties.remove(path);
        self.record(
            &mut state,
            BusOp::DeleteProperty {
                path: path.to_string(),
            },
        );
        Ok(())
    }

    async fn watch_event(&self, path: &str, handler: EventHandler) -> Result<WatchId, BridgeError> {
        let mut state = self.lock();
        state.next_watch += 1;
        let watch = WatchId(state.next_watch);
        state
            .watchers
            .entry(path.to_string())
            .or_default()
            .push((watch, handler));
        self.record(
            &mut state,
            BusOp::Watch {
                path: path.to_string(),
                watch,
            },
        );
        Ok(watch)
    }

    async fn unwatch_event(&self, path: &str, watch: WatchId) -> Result<(), BridgeError> {
        let mut state = self.lock();
        let removed = match state.watchers.get_mut(path) {
            Some(list) => {
                let before = list.len();
                list.retain(|(id, _)| *id != watch);
                before != list.len()
            }
            None => false,
        };
        if !removed {
            debug!(path, ?watch, "unwatch of unknown handler");
            return Err(BridgeError::Transport {
                path: path.to_string(),
                details: format!("no watcher {watch:?}"),
            });
        }
        state.watchers.retain(|_, list| !list.is_empty());
        self.record(
            &mut state,
            BusOp::Unwatch {
                path: path.to_string(),
                watch,
            },
        );
        Ok(())
    }
}
