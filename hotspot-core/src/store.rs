use crate::manager::SessionStore;
use crate::session::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Session persistence as a single JSON file mapping IP to session record.
///
/// The file is small (one record per admitted client) and rewritten whole on
/// every save/clear; an internal lock serializes writers. A missing or empty
/// file reads as an empty store.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<HashMap<Ipv4Addr, Session>> {
        if !Path::new(&self.path).exists() {
            return Ok(HashMap::new());
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("reading session store {}", self.path.display()))?;
        if data.is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing session store {}", self.path.display()))
    }

    fn write_map(&self, map: &HashMap<Ipv4Addr, Session>) -> Result<()> {
        let data = serde_json::to_vec_pretty(map)?;
        fs::write(&self.path, data)
            .with_context(|| format!("writing session store {}", self.path.display()))
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<Session>> {
        let _guard = self.lock.lock().await;
        let map = self.read_map()?;
        if !map.is_empty() {
            info!(
                "Loaded {} persisted session(s) from {}",
                map.len(),
                self.path.display()
            );
        }
        Ok(map.into_values().collect())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map()?;
        map.insert(session.ip, session.clone());
        self.write_map(&map)
    }

    async fn clear(&self, ip: Ipv4Addr) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map()?;
        if map.remove(&ip).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Store used when persistence is not configured; remembers nothing.
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn load_all(&self) -> Result<Vec<Session>> {
        Ok(Vec::new())
    }

    async fn save(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _ip: Ipv4Addr) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ip: &str) -> Session {
        Session::new(ip.parse().unwrap(), "AA:BB:CC:DD:EE:01".to_string(), "alice", 300)
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_load_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions.json"));

        store.save(&session("10.0.0.5")).await.unwrap();
        store.save(&session("10.0.0.6")).await.unwrap();

        let mut loaded = store.load_all().await.unwrap();
        loaded.sort_by_key(|s| s.ip);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ip, "10.0.0.5".parse::<Ipv4Addr>().unwrap());
        assert_eq!(loaded[0].username, "alice");

        store.clear("10.0.0.5".parse().unwrap()).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ip, "10.0.0.6".parse::<Ipv4Addr>().unwrap());

        // Clearing an absent IP is a no-op, not an error.
        store.clear("10.0.0.99".parse().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_replaces_record_for_same_ip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions.json"));

        let mut first = session("10.0.0.5");
        store.save(&first).await.unwrap();
        first.mac = "AA:BB:CC:DD:EE:02".to_string();
        store.save(&first).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mac, "AA:BB:CC:DD:EE:02");
    }
}
