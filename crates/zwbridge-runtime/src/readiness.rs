//! One-shot, level-triggered initialisation signal.
//!
//! Every mirror owns an [`InitSignal`].  `initialize()` resolves it exactly
//! once; `remove()` waits on it so teardown never overtakes registration.
//! Waiting after resolution returns immediately.

use tokio::sync::watch;

/// Outcome of a mirror's initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Pending,
    Ready,
    Failed,
}

/// Level-triggered readiness flag backed by a [`watch`] channel.
#[derive(Debug)]
pub struct InitSignal {
    tx: watch::Sender<InitState>,
}

impl InitSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(InitState::Pending);
        Self { tx }
    }

    /// Resolve the signal.  Only the first call has an effect.
    pub fn resolve(&self, ok: bool) {
        let outcome = if ok { InitState::Ready } else { InitState::Failed };
        self.tx.send_if_modified(|state| {
            if *state == InitState::Pending {
                *state = outcome;
                true
            } else {
                false
            }
        });
    }

    /// Current state without waiting.
    pub fn state(&self) -> InitState {
        *self.tx.borrow()
    }

    /// Wait until the signal is resolved and return the outcome.
    pub async fn wait(&self) -> InitState {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(|state| *state != InitState::Pending).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close while
            // we are borrowed.
            Err(_) => InitState::Failed,
        }
    }
}

impl Default for InitSignal {
    fn default() -> Self {
        Self::new()
    }
}
