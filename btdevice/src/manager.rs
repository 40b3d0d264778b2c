//! Manager (spec.md §4.11): a process-wide singleton enumerating the
//! controllers the OS reports, owning one [`Adapter`] per controller,
//! and publishing adapter-added/adapter-removed events.
//!
//! Controller enumeration reads `/sys/class/bluetooth/hciN` entries
//! rather than issuing `HCIGETDEVLIST` over a raw socket: the teacher
//! itself shells out to `hciconfig`/`bluetoothctl` for adapter-level
//! system operations (`nxzr_device::system`) rather than hand-rolling
//! the ioctl struct, and sysfs enumeration is the same kind of
//! standard-tool shortcut applied to discovery instead of mutation.
use crate::adapter::Adapter;
use crate::config::Config;
use crate::error::AdapterError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

const SYSFS_BLUETOOTH_CLASS: &str = "/sys/class/bluetooth";

#[derive(Clone, Debug)]
pub enum ManagerEvent {
    AdapterAdded(u16),
    AdapterRemoved(u16),
}

/// Lists the `hciN` controller indices the kernel currently exposes.
pub fn enumerate_controllers() -> std::io::Result<Vec<u16>> {
    let mut ids = Vec::new();
    let entries = match std::fs::read_dir(SYSFS_BLUETOOTH_CLASS) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(digits) = name.strip_prefix("hci") {
            if let Ok(id) = digits.parse::<u16>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Owns every open [`Adapter`] in the process. Dropping the manager (or
/// calling [`Manager::close`]) tears all of them down.
#[derive(Clone)]
pub struct Manager {
    config: Arc<Config>,
    adapters: Arc<RwLock<HashMap<u16, Adapter>>>,
    events_tx: Arc<broadcast::Sender<ManagerEvent>>,
}

impl Manager {
    pub fn new(config: Config) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self { config: Arc::new(config), adapters: Arc::new(RwLock::new(HashMap::new())), events_tx: Arc::new(events_tx) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events_tx.subscribe()
    }

    /// Opens every controller the OS currently reports, skipping any
    /// that are already open under this manager.
    #[tracing::instrument(target = "manager", skip(self))]
    pub async fn refresh(&self) -> Result<(), AdapterError> {
        let ids = enumerate_controllers().map_err(|err| AdapterError::Hci(err.into()))?;
        for dev_id in ids {
            if self.adapters.read().await.contains_key(&dev_id) {
                continue;
            }
            match Adapter::open(dev_id, self.config.clone()).await {
                Ok(adapter) => {
                    info!(dev_id, "adapter added");
                    self.adapters.write().await.insert(dev_id, adapter);
                    let _ = self.events_tx.send(ManagerEvent::AdapterAdded(dev_id));
                }
                Err(err) => warn!(dev_id, "failed to open adapter: {}", err),
            }
        }
        Ok(())
    }

    pub async fn adapter(&self, dev_id: u16) -> Option<Adapter> {
        self.adapters.read().await.get(&dev_id).cloned()
    }

    pub async fn adapters(&self) -> Vec<Adapter> {
        self.adapters.read().await.values().cloned().collect()
    }

    /// Default adapter: the lowest-indexed open controller.
    pub async fn default_adapter(&self) -> Option<Adapter> {
        let adapters = self.adapters.read().await;
        adapters.keys().min().and_then(|id| adapters.get(id)).cloned()
    }

    #[tracing::instrument(target = "manager", skip(self))]
    pub async fn remove_adapter(&self, dev_id: u16) {
        if self.adapters.write().await.remove(&dev_id).is_some() {
            info!(dev_id, "adapter removed");
            let _ = self.events_tx.send(ManagerEvent::AdapterRemoved(dev_id));
        }
    }

    /// Tears down every open adapter. No adapter-removed event is
    /// published per-adapter since the whole manager is going away;
    /// listeners should treat `close()` returning as the end of all
    /// adapter lifetimes, per spec.md §5's "no callback is invoked
    /// after `close()` returns".
    #[tracing::instrument(target = "manager", skip(self))]
    pub async fn close(&self) {
        let mut adapters = self.adapters.write().await;
        for (dev_id, _) in adapters.drain() {
            info!(dev_id, "closing adapter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_controllers_does_not_error_when_sysfs_absent() {
        // On a machine without Bluetooth hardware/sysfs mounted this
        // must report zero controllers, not fail startup.
        let result = enumerate_controllers();
        assert!(result.is_ok());
    }
}
