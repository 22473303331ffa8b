use crate::mac::is_sentinel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// One admitted client, keyed by IP in the [`SessionTable`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub ip: Ipv4Addr,
    /// Canonical hardware address, or the sentinel when not yet observed.
    pub mac: String,
    pub username: String,
    /// Unix seconds at admission or last renewal.
    pub start_time: u64,
    /// Unix seconds past which the session is invalid absent renewal.
    pub expires_at: u64,
}

impl Session {
    pub fn new(ip: Ipv4Addr, mac: String, username: &str, timeout: u64) -> Self {
        let now = unix_now();
        Self {
            ip,
            mac,
            username: username.to_string(),
            start_time: now,
            // Invariant: expires_at > start_time, even for a zero timeout.
            expires_at: now + timeout.max(1),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    pub fn has_bound_mac(&self) -> bool {
        !is_sentinel(&self.mac)
    }

    pub fn status(&self, now: u64) -> SessionStatus {
        SessionStatus {
            ip: self.ip,
            username: self.username.clone(),
            mac: self.mac.clone(),
            elapsed: now.saturating_sub(self.start_time),
            remaining: self.expires_at.saturating_sub(now),
        }
    }
}

/// Why a session ended. Carried with every termination for logging,
/// never stored.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    UserLogout,
    Timeout,
    AddressMismatch,
    SystemError,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::UserLogout => write!(f, "user logout"),
            TerminationReason::Timeout => write!(f, "session timeout"),
            TerminationReason::AddressMismatch => write!(f, "hardware address mismatch"),
            TerminationReason::SystemError => write!(f, "system error"),
        }
    }
}

/// Reporting view of a session, served to the portal status page and the
/// admin socket.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionStatus {
    pub ip: Ipv4Addr,
    pub username: String,
    pub mac: String,
    /// Seconds since admission or last renewal.
    pub elapsed: u64,
    /// Seconds until the deadline, clamped at zero.
    pub remaining: u64,
}

/// Renders a second count the way the portal and the query tool display it,
/// e.g. `1h 23m` or `45s`.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if secs > 0 && hours == 0 {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}

/// The authoritative concurrent map from IP to session.
///
/// One exclusive lock serializes every read and mutation; callers receive
/// clones, never references into the map. Nothing slow ever runs under the
/// lock: the manager copies what it needs and acts after releasing it.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<Ipv4Addr, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, ip: &Ipv4Addr) -> Option<Session> {
        let sessions = self.sessions.lock().await;
        sessions.get(ip).cloned()
    }

    /// Insert or replace; at most one session per IP.
    pub async fn put(&self, session: Session) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.ip, session);
    }

    pub async fn remove(&self, ip: &Ipv4Addr) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(ip)
    }

    /// Copy of all sessions, taken under the lock and released before the
    /// caller iterates. Sweeper and status reporting both read through this.
    pub async fn snapshot(&self) -> Vec<Session> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    /// Mutates the session in place under the lock; returns the updated
    /// session, or `None` when no session exists for `ip`.
    pub async fn update<F>(&self, ip: &Ipv4Addr, update_fn: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(ip) {
            Some(session) => {
                update_fn(session);
                Some(session.clone())
            }
            None => None,
        }
    }

    /// Removes the session only if `predicate` still holds, in one critical
    /// section. Eviction decisions taken from a snapshot go through here so
    /// a renewal racing the decision is never wrongly evicted.
    pub async fn remove_if<F>(&self, ip: &Ipv4Addr, predicate: F) -> Option<Session>
    where
        F: FnOnce(&Session) -> bool,
    {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(ip).map_or(false, predicate) {
            sessions.remove(ip)
        } else {
            None
        }
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }
}
