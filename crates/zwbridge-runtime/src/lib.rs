//! `zwbridge-runtime` – the synchronization engine.
//!
//! Mirrors an externally owned device topology into a publish/subscribe
//! namespace and routes control events sent through that namespace back to
//! the devices.
//!
//! # Modules
//!
//! - [`bridge`] – [`Bridge`]: the facade that wires a
//!   [`PubSubClient`][zwbridge_middleware::PubSubClient] and a
//!   [`Topology`][zwbridge_hal::Topology] into one engine, runs the initial
//!   sync and tears everything down on shutdown.
//! - [`network_mirror`] – [`NetworkMirror`][network_mirror::NetworkMirror]:
//!   network-wide properties and the node-diff pass.
//! - [`node_mirror`] – [`NodeMirror`][node_mirror::NodeMirror]: fixed node
//!   attributes, command events and the value-diff pass.
//! - [`value_mirror`] – [`ValueMirror`][value_mirror::ValueMirror]: one value
//!   property and its setter event.
//! - [`reconcile`] – [`ChildSet`][reconcile::ChildSet] and the
//!   [`Mirror`][reconcile::Mirror] lifecycle shared by every mirror.
//! - [`router`] – [`EventRouter`][router::EventRouter]: marshals
//!   notifications from foreign threads onto the engine.
//! - [`label`] – value-label to path-segment allocation.
//! - [`readiness`] – the one-shot initialisation signal `remove()` waits on.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Scheduling
//!
//! Every mirror method runs as a task on the caller's Tokio runtime.  Within
//! one diff pass child `initialize()`/`remove()` calls run concurrently;
//! passes of the same parent are serialised.

pub mod bridge;
mod context;
pub mod label;
pub mod network_mirror;
pub mod node_mirror;
pub mod readiness;
pub mod reconcile;
pub mod router;
pub mod telemetry;
pub mod value_mirror;

pub use bridge::{Bridge, BridgeConfig};
pub use network_mirror::NetworkMirror;
pub use router::{EngineTask, EventRouter, NotificationSender};
