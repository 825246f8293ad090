//! Generic child reconciler.
//!
//! Change notifications only say *that* something under a parent may have
//! changed.  A parent re-reads its current member ids from the topology and
//! hands them to [`ChildSet::reconcile`], which returns the [`Diff`] against
//! what is already mirrored: freshly constructed children for new ids and the
//! detached children of vanished ids.  The parent then runs the async
//! lifecycle phases of both sides concurrently.
//!
//! The same reconciler serves the network/node and node/value scopes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

/// Lifecycle shared by every mirrored entity.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Register published paths and perform the first publish.  Called
    /// exactly once per instance.
    async fn initialize(&self);

    /// Tear down every published path.  Waits for [`Mirror::initialize`] to
    /// have completed first.
    async fn remove(&self);
}

/// Result of one reconciliation pass.
pub struct Diff<K, M> {
    pub added: Vec<(K, Arc<M>)>,
    pub removed: Vec<(K, Arc<M>)>,
}

impl<K: PartialEq, M> Diff<K, M> {
    /// Return `true` if `key` was added or removed by this pass.
    pub fn touches(&self, key: &K) -> bool {
        self.added.iter().chain(&self.removed).any(|(k, _)| k == key)
    }

    /// Return `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Mirrored children of one parent, keyed by topology id.
pub struct ChildSet<K, M> {
    children: BTreeMap<K, Arc<M>>,
}

impl<K: Ord + Copy, M> ChildSet<K, M> {
    pub fn new() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }

    /// Bring the set in line with `current`.
    ///
    /// `create` is called once per added id, in ascending id order.  Removed
    /// children are detached from the set and returned; the caller owns
    /// their teardown.
    pub fn reconcile(
        &mut self,
        current: &BTreeSet<K>,
        mut create: impl FnMut(K) -> M,
    ) -> Diff<K, M> {
        let removed_keys: Vec<K> = self
            .children
            .keys()
            .filter(|k| !current.contains(k))
            .copied()
            .collect();
        let removed = removed_keys
            .into_iter()
            .filter_map(|k| self.children.remove(&k).map(|child| (k, child)))
            .collect();

        let mut added = Vec::new();
        for &key in current {
            if !self.children.contains_key(&key) {
                let child = Arc::new(create(key));
                self.children.insert(key, Arc::clone(&child));
                added.push((key, child));
            }
        }

        Diff { added, removed }
    }

    /// The child mirrored for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<M>> {
        self.children.get(key).cloned()
    }

    /// Mirrored ids in ascending order.
    pub fn keys(&self) -> BTreeSet<K> {
        self.children.keys().copied().collect()
    }

    /// Snapshot of every mirrored child.
    pub fn children(&self) -> Vec<Arc<M>> {
        self.children.values().cloned().collect()
    }

    /// Detach every child, leaving the set empty.
    pub fn drain(&mut self) -> Vec<Arc<M>> {
        std::mem::take(&mut self.children).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<K: Ord + Copy, M> Default for ChildSet<K, M> {
    fn default() -> Self {
        Self::new()
    }
}
