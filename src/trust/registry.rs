//! Durable device trust registry.
//!
//! Maps a device identifier to its trust record (public key, role, enabled
//! flag). The registry holds an in-memory cache synchronized with every write
//! and persists through an injected [`RegistryStore`], so readers always see
//! the latest completed write without touching disk per request.
//!
//! Records are created by pairing and disabled by revocation; they are never
//! deleted, which keeps revocations auditable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::RegistryError;

/// Role granted to a paired device. Currently informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Admin,
    /// Unknown role strings fall back to `client`.
    #[default]
    #[serde(other)]
    Client,
}

/// Trust record for a single paired device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Hex-encoded Ed25519 verifying key.
    pub public_key: String,
    /// Role assigned at pairing time.
    pub role: DeviceRole,
    /// Disabled devices fail authentication but stay in the registry.
    pub enabled: bool,
    /// Unix seconds at pairing time.
    pub created_at: f64,
}

/// Derive the device identifier from the raw public key bytes.
///
/// The id is the first 12 hex chars of SHA-256 over the key, so re-pairing
/// the same key always lands on the same registry entry.
pub fn derive_device_id(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(digest)[..12].to_string()
}

/// Persistence interface for the device registry.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<HashMap<String, DeviceRecord>, RegistryError>;
    async fn save(&self, devices: &HashMap<String, DeviceRecord>) -> Result<(), RegistryError>;
}

/// JSON file store writing owner-only (0o600) files.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_err(&self, reason: impl ToString) -> RegistryError {
        RegistryError::Load {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn save_err(&self, reason: impl ToString) -> RegistryError {
        RegistryError::Save {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<HashMap<String, DeviceRecord>, RegistryError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.load_err(e))?;
        serde_json::from_str(&raw).map_err(|e| self.load_err(e))
    }

    async fn save(&self, devices: &HashMap<String, DeviceRecord>) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.save_err(e))?;
        }
        let raw = serde_json::to_string_pretty(devices).map_err(|e| self.save_err(e))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| self.save_err(e))?;

        // The registry holds verification keys for trusted devices; keep it
        // readable by the owner only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.save_err(e))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load(&self) -> Result<HashMap<String, DeviceRecord>, RegistryError> {
        Ok(self.devices.read().await.clone())
    }

    async fn save(&self, devices: &HashMap<String, DeviceRecord>) -> Result<(), RegistryError> {
        *self.devices.write().await = devices.clone();
        Ok(())
    }
}

/// Shared handle over the registry cache and its backing store.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn RegistryStore>,
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
}

impl DeviceRegistry {
    /// Load the registry from the store and cache it in memory.
    pub async fn open(store: Arc<dyn RegistryStore>) -> Result<Self, RegistryError> {
        let devices = store.load().await?;
        Ok(Self {
            store,
            devices: Arc::new(RwLock::new(devices)),
        })
    }

    /// Look up a device record by id.
    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Insert or overwrite a device record, persisting before the cache
    /// commits. A failed save leaves the cache on the last completed write.
    pub async fn upsert(&self, device_id: &str, record: DeviceRecord) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;
        let mut next = devices.clone();
        next.insert(device_id.to_string(), record);
        self.store.save(&next).await?;
        *devices = next;
        Ok(())
    }

    /// Set `enabled = false` on a device. Returns `false` when the device is
    /// unknown. The record itself is kept.
    pub async fn disable(&self, device_id: &str) -> Result<bool, RegistryError> {
        let mut devices = self.devices.write().await;
        if !devices.contains_key(device_id) {
            return Ok(false);
        }
        let mut next = devices.clone();
        if let Some(record) = next.get_mut(device_id) {
            record.enabled = false;
        }
        self.store.save(&next).await?;
        *devices = next;
        Ok(true)
    }

    /// List all records, oldest pairing first.
    pub async fn list(&self) -> Vec<(String, DeviceRecord)> {
        let devices = self.devices.read().await;
        let mut list: Vec<(String, DeviceRecord)> =
            devices.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        list.sort_by(|a, b| a.1.created_at.total_cmp(&b.1.created_at));
        list
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(public_key: &str, enabled: bool) -> DeviceRecord {
        DeviceRecord {
            public_key: public_key.to_string(),
            role: DeviceRole::Client,
            enabled,
            created_at: 1_700_000_000.0,
        }
    }

    #[test]
    fn test_derive_device_id_is_stable_and_short() {
        let key = [7u8; 32];
        let id = derive_device_id(&key);
        assert_eq!(id.len(), 12);
        assert_eq!(id, derive_device_id(&key));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let other = derive_device_id(&[8u8; 32]);
        assert_ne!(id, other);
    }

    #[test]
    fn test_device_role_unknown_string_falls_back_to_client() {
        let role: DeviceRole = serde_json::from_str("\"laptop\"").unwrap();
        assert_eq!(role, DeviceRole::Client);

        let role: DeviceRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, DeviceRole::Admin);
    }

    #[tokio::test]
    async fn test_registry_upsert_and_get() {
        let registry = DeviceRegistry::open(Arc::new(MemoryStore::new()))
            .await
            .unwrap();

        registry.upsert("dev-1", record("aa", true)).await.unwrap();
        let fetched = registry.get("dev-1").await.unwrap();
        assert!(fetched.enabled);
        assert_eq!(fetched.public_key, "aa");

        assert!(registry.get("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_registry_disable_keeps_record() {
        let registry = DeviceRegistry::open(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        registry.upsert("dev-1", record("aa", true)).await.unwrap();

        assert!(registry.disable("dev-1").await.unwrap());
        let fetched = registry.get("dev-1").await.unwrap();
        assert!(!fetched.enabled);

        assert!(!registry.disable("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_registry_list_sorted_by_created_at() {
        let registry = DeviceRegistry::open(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let mut newer = record("bb", true);
        newer.created_at = 1_800_000_000.0;
        registry.upsert("newer", newer).await.unwrap();
        registry.upsert("older", record("aa", true)).await.unwrap();

        let list = registry.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].0, "older");
        assert_eq!(list[1].0, "newer");
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_registry.json");
        let store = JsonFileStore::new(path.clone());

        // Missing file loads as empty.
        assert!(store.load().await.unwrap().is_empty());

        let mut devices = HashMap::new();
        devices.insert("dev-1".to_string(), record("aa", true));
        store.save(&devices).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["dev-1"].public_key, "aa");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_json_store_writes_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_registry.json");
        let store = JsonFileStore::new(path.clone());
        store.save(&HashMap::new()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_json_store_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_registry.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, RegistryError::Load { .. }));
    }

    #[tokio::test]
    async fn test_registry_persists_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_registry.json");

        let registry = DeviceRegistry::open(Arc::new(JsonFileStore::new(path.clone())))
            .await
            .unwrap();
        registry.upsert("dev-1", record("aa", true)).await.unwrap();
        registry.disable("dev-1").await.unwrap();

        // A fresh handle over the same file sees the committed state.
        let reopened = DeviceRegistry::open(Arc::new(JsonFileStore::new(path)))
            .await
            .unwrap();
        let fetched = reopened.get("dev-1").await.unwrap();
        assert!(!fetched.enabled);
    }
}
