//! The Transport Trait.
//!
//! The engine publishes through a [`PubSubClient`] and never cares which
//! broker sits behind it.  A path is registered either as a *property*
//! (last-value-wins state) or as an *event* (fire-and-forget message with an
//! argument payload).  Delivery ordering and persistence are the transport's
//! business.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use zwbridge_types::BridgeError;

/// How a registered path is produced and consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behaviour {
    /// Property with a single writer and any number of readers.
    PropertyOneToMany,
    /// Property with many writers and a single consumer.
    PropertyManyToOne,
    /// Event sent by a single producer to any number of watchers.
    EventOneToMany,
    /// Event sent by anyone and consumed by a single watcher.
    EventManyToOne,
}

impl Behaviour {
    /// Return `true` for the two property behaviours.
    pub fn is_property(self) -> bool {
        matches!(self, Behaviour::PropertyOneToMany | Behaviour::PropertyManyToOne)
    }
}

/// Handle returned by [`PubSubClient::watch_event`], used to unwatch later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Callback invoked for every event sent on a watched path.
///
/// Receives the event path and its argument (`None` when the event carried
/// no payload).  Transports may invoke it from any thread, so implementations
/// must only hand the event off and return.
pub type EventHandler = Arc<dyn Fn(&str, Option<Value>) + Send + Sync>;

/// Every publish/subscribe transport must implement this trait.
///
/// # Contract
///
/// * `register` / `unregister` – announce or withdraw a path.  With
///   `delete_on_unregister` set, a property's value disappears together with
///   its registration.
/// * `set_property` / `delete_property` – push or remove a property value.
/// * `watch_event` / `unwatch_event` – attach or detach an [`EventHandler`].
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Register `path` with the given behaviour and description.
    async fn register(
        &self,
        path: &str,
        behaviour: Behaviour,
        description: &str,
        delete_on_unregister: bool,
    ) -> Result<(), BridgeError>;

    /// Withdraw a previously registered path.
    async fn unregister(&self, path: &str) -> Result<(), BridgeError>;

    /// Set the value of a property.
    async fn set_property(&self, path: &str, value: Value) -> Result<(), BridgeError>;

    /// Delete the value of a property.
    async fn delete_property(&self, path: &str) -> Result<(), BridgeError>;

    /// Invoke `handler` for every event sent on `path`.
    async fn watch_event(&self, path: &str, handler: EventHandler) -> Result<WatchId, BridgeError>;

    /// Detach the handler identified by `watch` from `path`.
    async fn unwatch_event(&self, path: &str, watch: WatchId) -> Result<(), BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_behaviours_are_properties() {
        assert!(Behaviour::PropertyOneToMany.is_property());
        assert!(Behaviour::PropertyManyToOne.is_property());
        assert!(!Behaviour::EventOneToMany.is_property());
        assert!(!Behaviour::EventManyToOne.is_property());
    }
}
