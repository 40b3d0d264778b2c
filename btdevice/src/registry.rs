//! Device registry (wait-for / processing / processed three-list
//! structure, per `BTDeviceRegistry.hpp`) and key-file persistence
//! (spec.md §6, byte layout in `btproto::smp::keyfile`).
//!
//! The original guards all three lists with a recursive mutex so that a
//! status listener invoked mid-scan can re-enter the registry. Rust has
//! no recursive `std::sync::Mutex`, and nothing in the example pack
//! reaches for one (e.g. `parking_lot::ReentrantMutex`); the same
//! tolerance is achieved structurally instead: every public method here
//! takes the lock only for its own list mutation/scan and releases it
//! before returning, so a listener callback invoked by the caller after
//! a registry call never observes the lock held.
use crate::error::RegistryError;
use btproto::smp::{IoCapability, KeyFile};
use btshared::addr::BdAddressAndType;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Security requirement bound to an address-prefix/name-substring
/// pattern, per spec.md §3's security registry entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SecurityPolicy {
    pub sec_level: crate::sock::l2cap::SecurityLevel,
    pub io_cap: IoCapability,
    pub io_cap_auto: bool,
    pub passkey: Option<u32>,
}

/// Per-device-pattern security policy (spec.md §3). Looked up the same
/// way as the wait-for set: first pattern match wins.
#[derive(Default)]
pub struct SecurityRegistry {
    entries: Mutex<Vec<(String, SecurityPolicy)>>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_policy(&self, pattern: impl Into<String>, policy: SecurityPolicy) {
        let pattern = pattern.into();
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.iter_mut().find(|(p, _)| *p == pattern) {
            existing.1 = policy;
        } else {
            entries.push((pattern, policy));
        }
    }

    pub fn policy_for(&self, addr: &BdAddressAndType, name: &str) -> Option<SecurityPolicy> {
        let addr_str = addr.address.to_string();
        self.entries.lock().unwrap().iter().find(|(pat, _)| addr_str.contains(pat.as_str()) || name.contains(pat.as_str())).map(|(_, policy)| *policy)
    }

    pub fn remove_policy(&self, pattern: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(p, _)| p != pattern);
        entries.len() != before
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    wait_for: Vec<String>,
    processing: Vec<(BdAddressAndType, String)>,
    processed: Vec<(BdAddressAndType, String)>,
}

/// Process-wide device accounting: which devices the embedder is
/// waiting to see (by address-prefix or name-substring), which are
/// currently mid-pairing/mid-GATT, and which have completed.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_wait_for_devices(&self, addr_or_name_sub: impl Into<String>) {
        self.state.lock().unwrap().wait_for.push(addr_or_name_sub.into());
    }

    pub fn is_waiting_for_device(&self, addr: &BdAddressAndType, name: &str) -> bool {
        let addr_str = addr.address.to_string();
        self.state.lock().unwrap().wait_for.iter().any(|pat| addr_str.contains(pat.as_str()) || name.contains(pat.as_str()))
    }

    pub fn is_waiting_for_any_device(&self) -> bool {
        !self.state.lock().unwrap().wait_for.is_empty()
    }

    pub fn wait_for_devices_count(&self) -> usize {
        self.state.lock().unwrap().wait_for.len()
    }

    pub fn add_to_devices_processed(&self, addr: BdAddressAndType, name: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.processed.push((addr, name.into()));
    }

    pub fn is_device_processed(&self, addr: &BdAddressAndType) -> bool {
        self.state.lock().unwrap().processed.iter().any(|(a, _)| a == addr)
    }

    pub fn devices_processed_count(&self) -> usize {
        self.state.lock().unwrap().processed.len()
    }

    /// True once every waited-for pattern has a matching processed entry.
    pub fn all_devices_processed(&self) -> bool {
        let state = self.state.lock().unwrap();
        if state.wait_for.is_empty() {
            return false;
        }
        state.wait_for.iter().all(|pat| state.processed.iter().any(|(a, n)| a.address.to_string().contains(pat.as_str()) || n.contains(pat.as_str())))
    }

    pub fn add_to_devices_processing(&self, addr: BdAddressAndType, name: impl Into<String>) {
        self.state.lock().unwrap().processing.push((addr, name.into()));
    }

    pub fn remove_from_devices_processing(&self, addr: &BdAddressAndType) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.processing.len();
        state.processing.retain(|(a, _)| a != addr);
        state.processing.len() != before
    }

    pub fn is_device_processing(&self, addr: &BdAddressAndType) -> bool {
        self.state.lock().unwrap().processing.iter().any(|(a, _)| a == addr)
    }

    pub fn devices_processing_count(&self) -> usize {
        self.state.lock().unwrap().processing.len()
    }
}

/// Key file storage under a caller-supplied directory. Pure byte
/// encode/decode lives in `btproto::smp::keyfile`; this adds the
/// filesystem half: atomic write-to-temp + rename, and
/// corrupt/version-mismatched file removal.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    dir: PathBuf,
}

fn file_name(local: &BdAddressAndType, remote: &BdAddressAndType) -> String {
    let type_suffix = match remote.address_type {
        btshared::addr::BdAddressType::BrEdr => 'b',
        btshared::addr::BdAddressType::LePublic => 'p',
        btshared::addr::BdAddressType::LeRandom => 'r',
        btshared::addr::BdAddressType::Undefined => 'u',
    };
    format!(
        "bd_{}_{}{}.key",
        local.address.to_string().replace(':', ""),
        remote.address.to_string().replace(':', ""),
        type_suffix
    )
}

impl KeyRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, local: &BdAddressAndType, remote: &BdAddressAndType) -> PathBuf {
        self.dir.join(file_name(local, remote))
    }

    #[tracing::instrument(target = "registry", skip(self))]
    pub async fn load(&self, local: &BdAddressAndType, remote: &BdAddressAndType) -> Option<KeyFile> {
        let path = self.path_for(local, remote);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match KeyFile::decode(&bytes) {
            Ok(key_file) => Some(key_file),
            Err(err) => {
                warn!("removing corrupt key file {}: {}", path.display(), err);
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    /// Atomic replacement: write to `<name>.tmp` in the same directory
    /// then rename over the destination, so a reader never observes a
    /// partially written file.
    #[tracing::instrument(target = "registry", skip(self, key_file))]
    pub async fn store(&self, local: &BdAddressAndType, remote: &BdAddressAndType, key_file: &KeyFile) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(local, remote);
        let tmp_path = tmp_path_for(&path);
        tokio::fs::write(&tmp_path, key_file.encode()).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        debug!("stored key file {}", path.display());
        Ok(())
    }

    /// Removes a partial key file after pairing fails, per spec.md
    /// §5's cancellation policy.
    #[tracing::instrument(target = "registry", skip(self))]
    pub async fn remove(&self, local: &BdAddressAndType, remote: &BdAddressAndType) {
        let path = self.path_for(local, remote);
        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove key file {}: {}", path.display(), err);
            }
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use btshared::addr::{BdAddressType, Eui48};

    #[test]
    fn wait_for_matches_address_or_name_substring() {
        let registry = DeviceRegistry::new();
        registry.add_to_wait_for_devices("AA:BB");
        let addr = BdAddressAndType::new(Eui48([0xaa, 0xbb, 0, 0, 0, 0]), BdAddressType::LePublic);
        assert!(registry.is_waiting_for_device(&addr, "anything"));
        assert!(!registry.is_waiting_for_device(&BdAddressAndType::any(), "anything"));
    }

    #[test]
    fn security_policy_lookup_matches_by_pattern_and_is_overridable() {
        let registry = SecurityRegistry::new();
        let policy = SecurityPolicy { sec_level: crate::sock::l2cap::SecurityLevel::Medium, io_cap: IoCapability::NoInputNoOutput, io_cap_auto: true, passkey: None };
        registry.set_policy("AA:BB", policy);
        let addr = BdAddressAndType::new(Eui48([0xaa, 0xbb, 0, 0, 0, 0]), BdAddressType::LePublic);
        assert_eq!(registry.policy_for(&addr, "anything").unwrap().sec_level, crate::sock::l2cap::SecurityLevel::Medium);

        let stricter = SecurityPolicy { sec_level: crate::sock::l2cap::SecurityLevel::High, ..policy };
        registry.set_policy("AA:BB", stricter);
        assert_eq!(registry.policy_for(&addr, "anything").unwrap().sec_level, crate::sock::l2cap::SecurityLevel::High);
        assert!(registry.remove_policy("AA:BB"));
        assert!(registry.policy_for(&addr, "anything").is_none());
    }

    #[test]
    fn processing_set_add_remove_round_trips() {
        let registry = DeviceRegistry::new();
        let addr = BdAddressAndType::new(Eui48([1, 2, 3, 4, 5, 6]), BdAddressType::LePublic);
        registry.add_to_devices_processing(addr.clone(), "pad");
        assert!(registry.is_device_processing(&addr));
        assert!(registry.remove_from_devices_processing(&addr));
        assert!(!registry.is_device_processing(&addr));
    }

    #[tokio::test]
    async fn key_file_round_trips_through_atomic_store_and_load() {
        let dir = std::env::temp_dir().join(format!("btdevice-registry-test-{:?}", std::thread::current().id()));
        let registry = KeyRegistry::new(&dir);
        let local = BdAddressAndType::new(Eui48([1, 2, 3, 4, 5, 6]), BdAddressType::LePublic);
        let remote = BdAddressAndType::new(Eui48([6, 5, 4, 3, 2, 1]), BdAddressType::LeRandom);
        let key_file = KeyFile { version: 1, local_addr: Some(local.clone()), remote_addr: Some(remote.clone()), ..Default::default() };
        registry.store(&local, &remote, &key_file).await.unwrap();
        let loaded = registry.load(&local, &remote).await.unwrap();
        assert_eq!(loaded.local_addr.unwrap(), local);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn corrupt_key_file_is_removed_and_load_returns_none() {
        let dir = std::env::temp_dir().join(format!("btdevice-registry-test-corrupt-{:?}", std::thread::current().id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let local = BdAddressAndType::new(Eui48([1, 1, 1, 1, 1, 1]), BdAddressType::LePublic);
        let remote = BdAddressAndType::new(Eui48([2, 2, 2, 2, 2, 2]), BdAddressType::LePublic);
        let registry = KeyRegistry::new(&dir);
        let path = registry.path_for(&local, &remote);
        tokio::fs::write(&path, b"not a key file").await.unwrap();
        assert!(registry.load(&local, &remote).await.is_none());
        assert!(!path.exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
