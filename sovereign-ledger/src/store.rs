//! Ledger persistence.
//!
//! A thin typed repository over a string key-value backend. Reads never
//! fail the caller: backend errors and malformed records are logged and
//! treated as a miss, so the pipeline degrades to defaults. Writes
//! overwrite (last writer wins) and report failures to the caller.
//!
//! The audit chain is the exception: an unreadable chain is surfaced as
//! damaged rather than empty, and a damaged chain is never written back.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::audit::AuditChain;
use crate::dataset::{DatasetRow, DatasetSnapshot};
use crate::types::{jurisdiction_key, now_ms, MissionPacket, SovereignState};

/// Error types for ledger persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored audit chain did not load cleanly and would be overwritten
    #[error("Audit chain for {0} is damaged, refusing to overwrite")]
    DamagedAudit(String),
}

/// Storage keys, partitioned by jurisdiction.
pub mod keys {
    use super::jurisdiction_key;

    pub fn state(jurisdiction: &str) -> String {
        format!("state:{}", jurisdiction_key(jurisdiction))
    }

    pub fn active_mission(jurisdiction: &str) -> String {
        format!("active_mission:{}", jurisdiction_key(jurisdiction))
    }

    pub fn mission(mission_id: &str) -> String {
        format!("mission:{}", mission_id)
    }

    pub fn dataset(jurisdiction: &str, focus: &str) -> String {
        format!("dataset:{}:{}", jurisdiction_key(jurisdiction), focus.to_lowercase())
    }

    pub fn audit(jurisdiction: &str) -> String {
        format!("audit:{}", jurisdiction_key(jurisdiction))
    }
}

/// A string key-value store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Backend identifier for logs.
    fn id(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    fn id(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// SQLite-backed durable store.
pub struct SqliteKv {
    db: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteKv {
    /// Open or create the database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("creating {}: {}", parent.display(), e)))?;
        }
        let db = Connection::open(&path)?;

        // Enable WAL mode for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;

        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;

        info!(path = %path.display(), "Ledger database initialized");

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_db<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Backend("ledger connection poisoned".to_string()))?;
            op(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl KvBackend for SqliteKv {
    fn id(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_db(move |db| {
            let mut stmt = db.prepare_cached("SELECT value FROM ledger WHERE key = ?1")?;
            match stmt.query_row([&key], |row| row.get::<_, String>(0)) {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_db(move |db| {
            db.execute(
                "INSERT INTO ledger (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
        .await
    }
}

/// Typed repository for ledger records.
#[derive(Clone)]
pub struct LedgerStore {
    kv: Arc<dyn KvBackend>,
}

impl LedgerStore {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self { kv }
    }

    /// Store backed by a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn backend_id(&self) -> &str {
        self.kv.id()
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, backend = self.kv.id(), error = %e, "Ledger read failed, treating as miss");
                None
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Malformed ledger record, treating as miss");
                None
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;
        let bytes = text.len();
        self.kv.put(key, text).await?;
        debug!(key, bytes, "Ledger record written");
        Ok(())
    }

    /// Load a jurisdiction's state, falling back to defaults.
    ///
    /// Stored fields are merged over the defaults and an unrecognized phase
    /// resets to the initial phase.
    pub async fn load_state(&self, jurisdiction: &str) -> SovereignState {
        let mut state = match self.read_json::<Value>(&keys::state(jurisdiction)).await {
            Some(value @ Value::Object(_)) => match SovereignState::from_stored(value) {
                Ok(state) => state,
                Err(e) => {
                    warn!(jurisdiction, error = %e, "Unreadable state record, using defaults");
                    SovereignState::default()
                }
            },
            Some(_) => {
                warn!(jurisdiction, "State record is not an object, using defaults");
                SovereignState::default()
            }
            None => SovereignState::default(),
        };
        state.normalize(jurisdiction);
        state
    }

    /// Stamp and overwrite a jurisdiction's state.
    pub async fn save_state(&self, state: &mut SovereignState) -> Result<(), StoreError> {
        state.last_updated_ts = now_ms();
        self.write_json(&keys::state(&state.jurisdiction), state).await
    }

    pub async fn active_mission(&self, jurisdiction: &str) -> Option<String> {
        self.read(&keys::active_mission(jurisdiction))
            .await
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub async fn set_active_mission(&self, jurisdiction: &str, mission_id: &str) -> Result<(), StoreError> {
        self.kv
            .put(&keys::active_mission(jurisdiction), mission_id.to_string())
            .await
    }

    /// Load a mission packet; a corrupt packet reads as absent.
    pub async fn load_mission(&self, mission_id: &str) -> Option<MissionPacket> {
        let value = self.read_json::<Value>(&keys::mission(mission_id)).await?;
        match MissionPacket::from_value(&value) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!(mission_id, error = %e, "Stored mission packet is invalid");
                None
            }
        }
    }

    pub async fn save_mission(&self, packet: &MissionPacket) -> Result<(), StoreError> {
        self.write_json(&keys::mission(&packet.mission_id), packet).await
    }

    pub async fn load_dataset(&self, jurisdiction: &str, focus: &str) -> Option<DatasetSnapshot> {
        self.read_json(&keys::dataset(jurisdiction, focus)).await
    }

    pub async fn save_dataset(
        &self,
        jurisdiction: &str,
        focus: &str,
        rows: &[DatasetRow],
    ) -> Result<(), StoreError> {
        let snapshot = DatasetSnapshot::new(rows.to_vec());
        self.write_json(&keys::dataset(jurisdiction, focus), &snapshot).await
    }

    /// Load a jurisdiction's audit chain.
    ///
    /// Only an absent record starts a fresh chain. A failed read, a record
    /// that is not a JSON array, or an event that does not decode yields a
    /// chain that is not intact.
    pub async fn load_audit(&self, jurisdiction: &str) -> AuditChain {
        let key = keys::audit(jurisdiction);
        let raw = match self.kv.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return AuditChain::new(),
            Err(e) => {
                error!(key, backend = self.kv.id(), error = %e, "Audit chain read failed");
                return AuditChain::unreadable(Vec::new());
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => AuditChain::from_stored(records),
            Ok(other) => {
                error!(key, "Audit chain record is not an array");
                AuditChain::unreadable(vec![other])
            }
            Err(e) => {
                error!(key, error = %e, "Malformed audit chain record");
                AuditChain::unreadable(vec![Value::String(raw)])
            }
        }
    }

    /// Overwrite a jurisdiction's audit chain.
    ///
    /// A chain that is not intact is refused so the stored history is kept.
    pub async fn save_audit(&self, jurisdiction: &str, chain: &AuditChain) -> Result<(), StoreError> {
        if !chain.is_intact() {
            return Err(StoreError::DamagedAudit(jurisdiction_key(jurisdiction)));
        }
        self.write_json(&keys::audit(jurisdiction), chain.events()).await
    }
}
