//! `zwbridge-hal` – the device-topology side of the bridge.
//!
//! The bridge does not drive devices itself.  It reads an externally owned
//! object graph through the [`Topology`] trait and learns about changes from
//! coarse [`TopologyNotification`]s pushed into a [`NotificationSink`].
//!
//! # Modules
//!
//! - [`topology`] – the [`Topology`] trait, the notification feed and the
//!   sink it is delivered to.
//! - [`sim`] – [`SimTopology`]: an in-process simulated device network for
//!   tests and headless runs.

pub mod sim;
pub mod topology;

pub use sim::{SimNode, SimTopology, SimTopologyBuilder};
pub use topology::{NotificationSink, Topology, TopologyNotification};
