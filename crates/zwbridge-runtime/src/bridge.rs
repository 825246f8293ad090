//! [`Bridge`] – wires a transport and a topology source into one engine.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zwbridge_hal::SimTopology;
//! use zwbridge_middleware::LocalBus;
//! use zwbridge_runtime::{Bridge, BridgeConfig};
//!
//! # async fn demo() {
//! let topology = SimTopology::builder().build();
//! let mut bridge = Bridge::new(
//!     &BridgeConfig::default(),
//!     Arc::new(LocalBus::default()),
//!     Arc::new(topology.clone()),
//! );
//! topology.attach(Arc::new(bridge.notification_sender()));
//!
//! bridge.start().await;
//! bridge.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! bridge.shutdown().await;
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument};
use zwbridge_hal::Topology;
use zwbridge_middleware::{Namespace, PubSubClient};

use crate::context::Context;
use crate::network_mirror::NetworkMirror;
use crate::reconcile::Mirror;
use crate::router::{self, EventRouter, NotificationSender};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Root of the published tree.  A trailing `/` is ignored.
    pub base_path: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_path: "sys/zwave".to_string(),
        }
    }
}

pub struct Bridge {
    network: Arc<NetworkMirror>,
    router: EventRouter,
    sender: NotificationSender,
}

impl Bridge {
    pub fn new(
        config: &BridgeConfig,
        client: Arc<dyn PubSubClient>,
        topology: Arc<dyn Topology>,
    ) -> Self {
        let (sender, rx) = router::channel();
        let ctx = Arc::new(Context {
            client,
            topology,
            namespace: Namespace::new(&config.base_path),
            sender: sender.clone(),
        });
        let network = Arc::new(NetworkMirror::new(ctx));
        let router = EventRouter::new(rx, Arc::clone(&network));
        Self {
            network,
            router,
            sender,
        }
    }

    /// Handle to attach to the topology source as its notification sink.
    pub fn notification_sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    /// Root of the mirror tree.
    pub fn network(&self) -> &Arc<NetworkMirror> {
        &self.network
    }

    /// Publish the network properties, then mirror whatever the topology
    /// already contains.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        self.network.initialize().await;
        self.network.on_node_set_changed(None).await;
        info!(nodes = self.network.node_ids().len(), "initial sync complete");
    }

    /// Route notifications until `shutdown` completes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        self.router.run(shutdown).await;
    }

    /// Route notifications until nothing is queued or in flight.
    pub async fn run_until_idle(&mut self) {
        self.router.run_until_idle().await;
    }

    /// Let in-flight dispatches finish, then withdraw every published path.
    /// Notifications still queued are discarded.
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) {
        self.router.drain().await;
        self.network.remove().await;
        info!("bridge stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::time::Duration;
    use zwbridge_hal::{SimNode, SimTopology};
    use zwbridge_middleware::{Behaviour, BusOp, EventHandler, LocalBus, WatchId};
    use zwbridge_types::{BridgeError, NetworkState, NodeAttribute, NodeCommand, NodeCommandRequest};

    use crate::readiness::InitState;

    const LEVEL: &str = "sys/zwave/nodes/1/values/level";
    const LEVEL_SET: &str = "sys/zwave/nodes/1/values/level/set";

    fn harness(topology: SimTopology) -> (Bridge, LocalBus, SimTopology) {
        let bus = LocalBus::with_journal();
        let bridge = Bridge::new(
            &BridgeConfig::default(),
            Arc::new(bus.clone()),
            Arc::new(topology.clone()),
        );
        topology.attach(Arc::new(bridge.notification_sender()));
        (bridge, bus, topology)
    }

    fn two_nodes() -> SimTopology {
        SimTopology::builder()
            .home_id(0xdead_beef)
            .network_state(NetworkState::Started)
            .with_node(SimNode::new(1).with_product("Dimmer"))
            .with_node(SimNode::new(2).with_product("Sensor"))
            .with_value(1, 100, "Level", json!(10))
            .build()
    }

    async fn started(topology: SimTopology) -> (Bridge, LocalBus, SimTopology) {
        let (mut bridge, bus, topology) = harness(topology);
        bridge.start().await;
        bridge.run_until_idle().await;
        (bridge, bus, topology)
    }

    /// Transport whose registrations and publishes suspend before reaching
    /// the wrapped bus.  Every other operation yields once.
    struct SlowBus {
        inner: LocalBus,
        register_delay: Duration,
        publish_delay: Duration,
    }

    #[async_trait::async_trait]
    impl PubSubClient for SlowBus {
        async fn register(
            &self,
            path: &str,
            behaviour: Behaviour,
            description: &str,
            delete_on_unregister: bool,
        ) -> Result<(), BridgeError> {
            tokio::time::sleep(self.register_delay).await;
            self.inner
                .register(path, behaviour, description, delete_on_unregister)
                .await
        }

        async fn unregister(&self, path: &str) -> Result<(), BridgeError> {
            tokio::task::yield_now().await;
            self.inner.unregister(path).await
        }

        async fn set_property(&self, path: &str, value: Value) -> Result<(), BridgeError> {
            tokio::time::sleep(self.publish_delay).await;
            self.inner.set_property(path, value).await
        }

        async fn delete_property(&self, path: &str) -> Result<(), BridgeError> {
            tokio::task::yield_now().await;
            self.inner.delete_property(path).await
        }

        async fn watch_event(
            &self,
            path: &str,
            handler: EventHandler,
        ) -> Result<WatchId, BridgeError> {
            tokio::task::yield_now().await;
            self.inner.watch_event(path, handler).await
        }

        async fn unwatch_event(&self, path: &str, watch: WatchId) -> Result<(), BridgeError> {
            tokio::task::yield_now().await;
            self.inner.unwatch_event(path, watch).await
        }
    }

    /// Started bridge over a [`SlowBus`].  Run under a paused clock.
    async fn started_slow(
        topology: SimTopology,
        register_delay: Duration,
        publish_delay: Duration,
    ) -> (Bridge, LocalBus, SimTopology) {
        let bus = LocalBus::with_journal();
        let client = SlowBus {
            inner: bus.clone(),
            register_delay,
            publish_delay,
        };
        let mut bridge = Bridge::new(
            &BridgeConfig::default(),
            Arc::new(client),
            Arc::new(topology.clone()),
        );
        topology.attach(Arc::new(bridge.notification_sender()));
        bridge.start().await;
        bridge.run_until_idle().await;
        bus.clear_journal();
        (bridge, bus, topology)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn count(journal: &[BusOp], wanted: impl Fn(&BusOp) -> bool) -> usize {
        journal.iter().filter(|op| wanted(op)).count()
    }

    fn set_count(journal: &[BusOp], path: &str) -> usize {
        journal
            .iter()
            .filter(|op| matches!(op, BusOp::SetProperty { path: p, .. } if p == path))
            .count()
    }

    fn position(journal: &[BusOp], wanted: impl Fn(&BusOp) -> bool) -> usize {
        journal
            .iter()
            .position(wanted)
            .unwrap_or_else(|| panic!("operation missing from journal: {journal:#?}"))
    }

    #[tokio::test]
    async fn initial_sync_publishes_network_nodes_and_values() {
        let (bridge, bus, _) = started(two_nodes()).await;

        assert_eq!(bus.property("sys/zwave/state"), Some(json!("Started")));
        assert_eq!(bus.property("sys/zwave/ready"), Some(json!(false)));
        assert_eq!(bus.property("sys/zwave/home_id"), Some(json!(0xdead_beef_u32)));
        assert_eq!(bus.property("sys/zwave/nodes/1/product_name"), Some(json!("Dimmer")));
        assert_eq!(bus.property("sys/zwave/nodes/2/is_failed"), Some(json!(false)));
        assert_eq!(bus.property(LEVEL), Some(json!(10)));
        assert_eq!(bus.behaviour(LEVEL), Some(Behaviour::PropertyManyToOne));
        assert_eq!(bus.behaviour(LEVEL_SET), Some(Behaviour::EventManyToOne));
        assert_eq!(bus.watcher_count(LEVEL_SET), 1);
        assert_eq!(bus.watcher_count("sys/zwave/nodes/2/heal"), 1);
        assert!(bus.paths_under("sys/zwave/nodes/2/values").is_empty());
        assert_eq!(bridge.network().init_state(), InitState::Ready);
    }

    #[tokio::test]
    async fn removed_node_leaves_no_paths_behind() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        assert!(!bus.paths_under("sys/zwave/nodes/2/").is_empty());

        topology.remove_node(2);
        bridge.run_until_idle().await;

        assert!(bus.paths_under("sys/zwave/nodes/2/").is_empty());
        assert_eq!(bus.property(LEVEL), Some(json!(10)));
        assert!(bridge.network().node(2).is_none());
    }

    #[tokio::test]
    async fn colliding_labels_get_suffixes() {
        let topology = SimTopology::builder()
            .with_node(SimNode::new(3))
            .with_value(3, 31, "Switch", json!(false))
            .with_value(3, 30, "Switch", json!(true))
            .build();
        let (bridge, bus, _) = started(topology).await;

        assert_eq!(bus.property("sys/zwave/nodes/3/values/switch"), Some(json!(true)));
        assert_eq!(bus.property("sys/zwave/nodes/3/values/switch2"), Some(json!(false)));
        let node = bridge.network().node(3).unwrap();
        assert_eq!(node.value(30).unwrap().label(), "switch");
        assert_eq!(node.value(31).unwrap().label(), "switch2");
    }

    #[tokio::test]
    async fn node_diff_is_complete() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        bus.clear_journal();

        topology.add_node(SimNode::new(3));
        topology.remove_node(1);
        bridge.run_until_idle().await;

        assert_eq!(bridge.network().node_ids(), topology.node_ids());
        let journal = bus.journal();
        let registered = |path: &str| {
            journal
                .iter()
                .filter(|op| matches!(op, BusOp::Register { path: p, .. } if p == path))
                .count()
        };
        let unregistered = |path: &str| {
            journal
                .iter()
                .filter(|op| matches!(op, BusOp::Unregister { path: p } if p == path))
                .count()
        };
        assert_eq!(registered("sys/zwave/nodes/3/heal"), 1);
        assert_eq!(unregistered("sys/zwave/nodes/1/heal"), 1);
        assert_eq!(unregistered(LEVEL), 1);
        assert_eq!(registered("sys/zwave/nodes/2/heal"), 0);
    }

    #[tokio::test]
    async fn unchanged_value_is_not_republished() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        bus.clear_journal();

        topology.refresh_value(1, 100);
        bridge.run_until_idle().await;
        assert_eq!(set_count(&bus.journal(), LEVEL), 0);

        topology.set_value(1, 100, json!(11)).unwrap();
        topology.refresh_value(1, 100);
        bridge.run_until_idle().await;
        assert_eq!(set_count(&bus.journal(), LEVEL), 1);
        assert_eq!(bus.property(LEVEL), Some(json!(11)));
    }

    #[tokio::test]
    async fn null_value_is_published_first_time() {
        let topology = SimTopology::builder()
            .with_node(SimNode::new(1))
            .with_value(1, 100, "Level", json!(null))
            .build();
        let (_bridge, bus, _) = started(topology).await;

        let journal = bus.journal();
        assert_eq!(set_count(&journal, LEVEL), 1);
        assert!(journal.contains(&BusOp::SetProperty {
            path: LEVEL.to_string(),
            value: json!(null),
        }));
    }

    #[tokio::test]
    async fn setter_is_unwatched_before_property_teardown() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        bus.clear_journal();

        topology.remove_value(1, 100);
        bridge.run_until_idle().await;

        let journal = bus.journal();
        let unwatch = position(&journal, |op| {
            matches!(op, BusOp::Unwatch { path, .. } if path == LEVEL_SET)
        });
        let unregister = position(&journal, |op| {
            matches!(op, BusOp::Unregister { path } if path == LEVEL)
        });
        let delete = position(&journal, |op| {
            matches!(op, BusOp::DeleteProperty { path } if path == LEVEL)
        });
        assert!(unwatch < unregister);
        assert!(unwatch < delete);
        assert!(bus.paths_under(LEVEL).is_empty());
    }

    #[tokio::test]
    async fn ready_transition_refreshes_every_node_once() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        topology.set_neighbours_silently(1, vec![2]).unwrap();
        bus.clear_journal();

        topology.set_state(NetworkState::Ready);
        bridge.run_until_idle().await;

        let journal = bus.journal();
        assert_eq!(set_count(&journal, "sys/zwave/nodes/1/neighbours"), 1);
        assert_eq!(set_count(&journal, "sys/zwave/nodes/2/neighbours"), 1);
        assert_eq!(set_count(&journal, "sys/zwave/home_id"), 0);
        assert_eq!(bus.property("sys/zwave/ready"), Some(json!(true)));
        assert_eq!(bus.property("sys/zwave/state"), Some(json!("Ready")));
        assert_eq!(bus.property("sys/zwave/nodes/1/neighbours"), Some(json!([2])));

        // Still ready: no second refresh.
        bus.clear_journal();
        topology.set_state(NetworkState::Ready);
        bridge.run_until_idle().await;
        assert_eq!(set_count(&bus.journal(), "sys/zwave/nodes/1/neighbours"), 0);
    }

    #[tokio::test]
    async fn setter_writes_and_republishes_ground_truth() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;

        assert_eq!(bus.send_event(LEVEL_SET, Some(json!(41.7))), 1);
        bridge.run_until_idle().await;

        assert_eq!(topology.writes(), vec![(1, 100, json!(41.7))]);
        assert_eq!(bus.property(LEVEL), Some(json!(42)));
    }

    #[tokio::test]
    async fn rejected_write_keeps_published_value() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        topology.reject_writes(1, 100).unwrap();
        bus.clear_journal();

        bus.send_event(LEVEL_SET, Some(json!(99)));
        bridge.run_until_idle().await;

        assert!(topology.writes().is_empty());
        assert_eq!(bus.property(LEVEL), Some(json!(10)));
        assert_eq!(set_count(&bus.journal(), LEVEL), 0);
    }

    #[tokio::test]
    async fn commands_are_parsed_before_forwarding() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;

        bus.send_event("sys/zwave/nodes/1/heal", Some(json!(true)));
        bus.send_event("sys/zwave/nodes/1/set_config_param", Some(json!("oops")));
        bus.send_event("sys/zwave/nodes/1/set_config_param", Some(json!([3, 255, 1])));
        bus.send_event("sys/zwave/nodes/2/request_config_param", Some(json!(7)));
        bridge.run_until_idle().await;

        let mut commands = topology.commands();
        commands.sort_by_key(|(node_id, _)| *node_id);
        assert_eq!(commands.len(), 3);
        assert!(commands.contains(&(1, NodeCommandRequest::Heal { update_routes: true })));
        assert!(commands.contains(&(
            1,
            NodeCommandRequest::SetConfigParam {
                param_id: 3,
                value: 255,
                size: Some(1),
            }
        )));
        assert_eq!(commands[2], (2, NodeCommandRequest::RequestConfigParam { param_id: 7 }));
    }

    #[tokio::test]
    async fn remove_failed_node_only_for_failed_nodes() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;

        bus.send_event("sys/zwave/nodes/2/remove_failed_node", None);
        bridge.run_until_idle().await;
        assert!(topology.commands().is_empty());
        assert!(bridge.network().node(2).is_some());

        topology.set_failed(2, true).unwrap();
        bridge.run_until_idle().await;
        assert_eq!(bus.property("sys/zwave/nodes/2/is_failed"), Some(json!(true)));

        bus.send_event("sys/zwave/nodes/2/remove_failed_node", None);
        bridge.run_until_idle().await;
        assert_eq!(topology.commands(), vec![(2, NodeCommandRequest::RemoveFailedNode)]);
        assert!(bus.paths_under("sys/zwave/nodes/2/").is_empty());
    }

    #[tokio::test]
    async fn registration_failure_is_isolated_and_cleaned_up() {
        let (mut bridge, bus, topology) = harness(two_nodes());
        bus.fail_registrations_under("sys/zwave/nodes/2/");
        bridge.start().await;
        bridge.run_until_idle().await;

        let network = bridge.network();
        assert_eq!(network.node(2).unwrap().init_state(), InitState::Failed);
        assert_eq!(network.node(1).unwrap().init_state(), InitState::Ready);
        assert_eq!(bus.property(LEVEL), Some(json!(10)));

        topology.remove_node(2);
        bridge.run_until_idle().await;
        assert!(bus.paths_under("sys/zwave/nodes/2/").is_empty());
    }

    #[tokio::test]
    async fn value_added_later_is_mirrored() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;

        topology.add_value(2, 200, "Temperature (°C)", json!(21.5)).unwrap();
        bridge.run_until_idle().await;

        assert_eq!(bus.property("sys/zwave/nodes/2/values/temperature_c"), Some(json!(21.5)));
        assert_eq!(bus.watcher_count("sys/zwave/nodes/2/values/temperature_c/set"), 1);
    }

    #[tokio::test]
    async fn notifications_for_unmirrored_entities_are_ignored() {
        let (mut bridge, bus, topology) = started(two_nodes()).await;
        bus.clear_journal();

        topology.refresh_value(9, 900);
        bridge.run_until_idle().await;
        bus.send_event("sys/zwave/nodes/9/values/ghost/set", Some(json!(1)));
        bridge.run_until_idle().await;

        assert!(bus
            .journal()
            .iter()
            .all(|op| matches!(op, BusOp::SendEvent { .. })));
    }

    #[tokio::test]
    async fn shutdown_withdraws_every_path() {
        let (bridge, bus, _) = started(two_nodes()).await;
        assert!(!bus.paths_under("sys/zwave").is_empty());

        bridge.shutdown().await;
        assert!(bus.paths_under("sys/zwave").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn node_refresh_in_flight_does_not_outlive_removal() {
        let (mut bridge, bus, topology) = started_slow(two_nodes(), Duration::ZERO, ms(100)).await;

        // The refresh for this change is still publishing when the node goes.
        topology.set_failed(2, true).unwrap();
        let source = topology.clone();
        bridge
            .run(async move {
                tokio::time::sleep(ms(20)).await;
                source.remove_node(2);
                tokio::time::sleep(ms(500)).await;
            })
            .await;
        bridge.run_until_idle().await;

        assert!(bridge.network().node(2).is_none());
        assert_eq!(bus.paths_under("sys/zwave/nodes/2/"), Vec::<String>::new());
        assert_eq!(bus.property("sys/zwave/nodes/2/is_failed"), None);
        assert_eq!(bus.property(LEVEL), Some(json!(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn value_publish_in_flight_does_not_outlive_removal() {
        let (bridge, bus, topology) = started_slow(two_nodes(), Duration::ZERO, ms(100)).await;
        let value = bridge.network().value(1, 100).unwrap();

        topology.set_value(1, 100, json!(11)).unwrap();
        tokio::join!(value.on_topology_value_changed(), async {
            tokio::time::sleep(ms(20)).await;
            value.remove().await;
        });
        assert!(bus.paths_under(LEVEL).is_empty());

        // A setter task that outlived the removal neither writes nor publishes.
        value.on_setter_invoked(json!(5)).await;
        value.on_topology_value_changed().await;
        assert!(topology.writes().is_empty());
        assert!(bus.paths_under(LEVEL).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn node_removed_while_initialising_is_withdrawn_once() {
        let (mut bridge, bus, topology) = started_slow(two_nodes(), ms(100), Duration::ZERO).await;

        let source = topology.clone();
        bridge
            .run(async move {
                source.add_node(SimNode::new(3));
                tokio::time::sleep(ms(20)).await;
                source.remove_node(3);
                tokio::time::sleep(ms(500)).await;
            })
            .await;
        bridge.run_until_idle().await;

        assert!(bridge.network().node(3).is_none());
        assert!(bus.paths_under("sys/zwave/nodes/3/").is_empty());
        let journal = bus.journal();
        let registered: BTreeSet<&str> = journal
            .iter()
            .filter_map(|op| match op {
                BusOp::Register { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(registered.len(), NodeAttribute::ALL.len() + NodeCommand::ALL.len());
        for path in registered {
            assert!(path.starts_with("sys/zwave/nodes/3/"), "{path}");
            let registers =
                count(&journal, |op| matches!(op, BusOp::Register { path: p, .. } if p == path));
            let unregisters =
                count(&journal, |op| matches!(op, BusOp::Unregister { path: p } if p == path));
            assert_eq!((registers, unregisters), (1, 1), "{path}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remove_waits_for_initialisation() {
        let (mut bridge, bus, topology) = started_slow(two_nodes(), ms(100), Duration::ZERO).await;
        let network = Arc::clone(bridge.network());

        bridge
            .run(async move {
                topology.add_node(SimNode::new(3));
                tokio::time::sleep(ms(20)).await;
                let node = network.node(3).unwrap();
                assert_eq!(node.init_state(), InitState::Pending);
                node.remove().await;
                assert_eq!(node.init_state(), InitState::Ready);
            })
            .await;
        bridge.run_until_idle().await;

        assert!(bus.paths_under("sys/zwave/nodes/3/").is_empty());
        let heal = "sys/zwave/nodes/3/heal";
        let journal = bus.journal();
        let register = position(&journal, |op| {
            matches!(op, BusOp::Register { path, .. } if path == heal)
        });
        let unregister = position(&journal, |op| {
            matches!(op, BusOp::Unregister { path } if path == heal)
        });
        assert!(register < unregister);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_value_passes_allocate_distinct_labels() {
        let (mut bridge, bus, topology) = started_slow(two_nodes(), ms(100), Duration::ZERO).await;

        let source = topology.clone();
        bridge
            .run(async move {
                source.add_value(1, 101, "Level", json!(1)).unwrap();
                tokio::time::sleep(ms(20)).await;
                source.add_value(1, 102, "Level", json!(2)).unwrap();
                tokio::time::sleep(ms(500)).await;
            })
            .await;
        bridge.run_until_idle().await;

        let node = bridge.network().node(1).unwrap();
        assert_eq!(node.value_ids(), BTreeSet::from([100, 101, 102]));
        assert_eq!(node.value(100).unwrap().label(), "level");
        assert_eq!(node.value(101).unwrap().label(), "level2");
        assert_eq!(node.value(102).unwrap().label(), "level3");

        let journal = bus.journal();
        let registers = |path: &str| {
            count(&journal, |op| matches!(op, BusOp::Register { path: p, .. } if p == path))
        };
        assert_eq!(registers(LEVEL), 0);
        assert_eq!(registers("sys/zwave/nodes/1/values/level2"), 1);
        assert_eq!(registers("sys/zwave/nodes/1/values/level3"), 1);
        assert_eq!(bus.property("sys/zwave/nodes/1/values/level2"), Some(json!(1)));
        assert_eq!(bus.property("sys/zwave/nodes/1/values/level3"), Some(json!(2)));
    }

    #[tokio::test]
    async fn custom_base_path() {
        let bus = LocalBus::default();
        let topology = two_nodes();
        let bridge = Bridge::new(
            &BridgeConfig {
                base_path: "home/zw/".to_string(),
            },
            Arc::new(bus.clone()),
            Arc::new(topology),
        );
        bridge.start().await;

        assert_eq!(bus.property("home/zw/nodes/1/values/level"), Some(json!(10)));
        assert!(bus.paths_under("sys/zwave").is_empty());
    }
}
