//! The election lifecycle and vote integrity engine.
//!
//! [`LifecycleController`] owns election state, [`VoteLedger`] records votes
//! and [`TallyEngine`] counts them. All three share one store, and take the
//! caller's [`Identity`](crate::model::Identity) explicitly on every call.

use std::sync::Arc;

use crate::clock::Clock;
use crate::notify::NotificationDispatcher;
use crate::store::SharedStore;

mod closer;
mod ledger;
mod lifecycle;
mod tally;

pub use closer::{ElectionCloserFairing, ElectionClosers};
pub use ledger::VoteLedger;
pub use lifecycle::LifecycleController;
pub use tally::TallyEngine;

/// The engine components, wired to the same store, dispatcher and clock.
/// Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    pub lifecycle: LifecycleController,
    pub ledger: VoteLedger,
    pub tally: TallyEngine,
}

impl Engine {
    pub fn new(
        store: SharedStore,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lifecycle = LifecycleController::new(store.clone(), dispatcher, clock);
        let ledger = VoteLedger::new(store.clone(), lifecycle.clone());
        let tally = TallyEngine::new(store, lifecycle.clone());
        Self {
            lifecycle,
            ledger,
            tally,
        }
    }
}
