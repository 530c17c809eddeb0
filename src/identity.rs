use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Client profile the session impersonates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppInfo {
    pub os: String,
    pub kernel: String,
    pub vendor_os: String,
    pub current_version: String,
    pub misc_bitmap: i32,
    pub pt_version: String,
    pub sso_version: i32,
    pub package_name: String,
    pub wt_login_sdk: String,
    pub app_id: i32,
    pub sub_app_id: i32,
    pub app_client_version: i32,
    pub main_sig_map: i32,
    pub sub_sig_map: i32,
    #[serde(rename = "NTLoginType")]
    pub nt_login_type: i32,
}

impl Default for AppInfo {
    /// The Linux desktop client.
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            kernel: "Linux".to_string(),
            vendor_os: "linux".to_string(),
            current_version: "3.2.19-39038".to_string(),
            misc_bitmap: 32764,
            pt_version: "2.0.0".to_string(),
            sso_version: 19,
            package_name: "com.tencent.qq".to_string(),
            wt_login_sdk: "nt.wtlogin.0.0.1".to_string(),
            app_id: 1600001615,
            sub_app_id: 537313942,
            app_client_version: 39038,
            main_sig_map: 169742560,
            sub_sig_map: 0,
            nt_login_type: 1,
        }
    }
}

/// Credentials and device identity produced by login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionStore {
    pub uin: u64,
    #[serde(default)]
    pub uid: String,
    #[serde(with = "hex::serde")]
    pub guid: Vec<u8>,
    #[serde(with = "hex::serde", default)]
    pub a2: Vec<u8>,
    #[serde(with = "hex::serde", default)]
    pub d2: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub d2_key: Vec<u8>,
    pub device_name: String,
}

impl SessionStore {
    /// Fresh device with no credentials.
    pub fn empty() -> Self {
        let mut guid = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut guid);
        Self {
            uin: 0,
            uid: String::new(),
            device_name: format!("ssolink-{}", hex::encode(&guid[..3])),
            guid,
            a2: Vec::new(),
            d2: Vec::new(),
            d2_key: vec![0; 16],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Whether login has produced session tokens.
    pub fn has_credentials(&self) -> bool {
        !self.d2.is_empty() && !self.a2.is_empty()
    }
}

/// Shared, refreshable view of the [`SessionStore`]. The transport only ever
/// reads snapshots; the login subsystem writes through [`SessionHandle::update`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionStore>>,
}

impl SessionHandle {
    pub fn new(store: SessionStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn snapshot(&self) -> SessionStore {
        self.inner.read().await.clone()
    }

    pub async fn update(&self, f: impl FnOnce(&mut SessionStore)) {
        f(&mut *self.inner.write().await);
    }
}
