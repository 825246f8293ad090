//! `zwbridge-middleware` – the publish/subscribe side of the bridge.
//!
//! The bridge never talks to a broker directly.  It speaks to a
//! [`PubSubClient`] and lays its paths out through a [`Namespace`].
//!
//! # Modules
//!
//! - [`transport`] – the [`PubSubClient`] trait every transport implements,
//!   together with path [`Behaviour`]s and event handler types.
//! - [`path`] – [`Namespace`]: builds every published path from the
//!   configured base path.
//! - [`bus`] – [`LocalBus`]: an in-process transport that keeps properties
//!   and watchers in memory and broadcasts every operation.  Used by the CLI
//!   and, with its optional journal, by the engine's tests.

pub mod bus;
pub mod path;
pub mod transport;

pub use bus::{BusOp, LocalBus};
pub use path::Namespace;
pub use transport::{Behaviour, EventHandler, PubSubClient, WatchId};
