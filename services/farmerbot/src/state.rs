//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::managers::{FarmManager, Fleet, NodeManager, PowerManager};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    farms: FarmManager,
    nodes: NodeManager,
    power: PowerManager,
}

impl AppState {
    pub fn new(fleet: &Fleet, farms: FarmManager, nodes: NodeManager, power: PowerManager) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store: fleet.store.clone(),
                farms,
                nodes,
                power,
            }),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn farms(&self) -> &FarmManager {
        &self.inner.farms
    }

    pub fn nodes(&self) -> &NodeManager {
        &self.inner.nodes
    }

    pub fn power(&self) -> &PowerManager {
        &self.inner.power
    }
}
