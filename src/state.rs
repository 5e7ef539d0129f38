use crate::challenge::TransitionGuard;
use crate::config::Clock;
use crate::storage::JsonStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: JsonStore,
    pub clock: Clock,
    pub guard: Arc<TransitionGuard>,
}

impl AppState {
    pub fn new(store: JsonStore, clock: Clock) -> Self {
        Self {
            store,
            clock,
            guard: Arc::new(TransitionGuard::new()),
        }
    }
}
