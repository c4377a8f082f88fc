//! Cache control messages from the rest of the app (league filter changed,
//! user pulled to refresh a day, etc).

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheCoordinator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheControl {
    ClearAll,
    InvalidateDate(NaiveDate),
}

impl CacheControl {
    pub fn apply(&self, coordinator: &CacheCoordinator) {
        match self {
            CacheControl::ClearAll => coordinator.clear_all(),
            CacheControl::InvalidateDate(date) => coordinator.invalidate(*date),
        }
    }
}

/// Apply control messages to `coordinator` until every sender is dropped.
pub fn spawn_control_listener(
    coordinator: CacheCoordinator,
    mut rx: mpsc::Receiver<CacheControl>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            debug!(?message, "Cache control received");
            message.apply(&coordinator);
        }
        info!("Cache control channel closed");
    })
}
