use crate::mac::{is_sentinel, normalize_mac};
use crate::session::{unix_now, Session, SessionStatus, SessionTable, TerminationReason};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The packet-filter enforcement point. Admits or denies traffic for an
/// (IP, hardware address) pair; both calls must be idempotent.
#[async_trait]
pub trait Enforcement: Send + Sync {
    async fn admit(&self, ip: Ipv4Addr, mac: &str) -> Result<()>;
    async fn deny(&self, ip: Ipv4Addr, mac: &str) -> Result<()>;
}

/// Best-effort lookup of the hardware address currently claiming an IP.
///
/// Always returns a canonical address; resolution failure is the sentinel,
/// never an error.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, ip: Ipv4Addr) -> String;
}

/// Opaque persistence keyed by IP, so admitted clients survive a daemon
/// restart. The manager writes through on create/terminate and reads the
/// whole set back once at startup; the storage engine is not its concern.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn clear(&self, ip: Ipv4Addr) -> Result<()>;
}

/// Why `create` refused to admit a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// The IP was empty or the any-address placeholder.
    InvalidAddress,
    /// The enforcement point rejected the admit call; no session was recorded.
    EnforcementFailure,
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::InvalidAddress => write!(f, "invalid client address"),
            CreateError::EnforcementFailure => write!(f, "enforcement point refused admission"),
        }
    }
}

impl std::error::Error for CreateError {}

/// Result of a session check. Only `Valid` admits the caller; the negative
/// variants are for logging and must all look the same to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    NotFound,
    Expired,
    Spoofed,
}

impl VerifyOutcome {
    pub fn is_valid(self) -> bool {
        self == VerifyOutcome::Valid
    }
}

/// Session lifecycle facade: the only entry point for creating, checking,
/// and tearing down client sessions.
///
/// All session state lives in the [`SessionTable`]; every decision to act is
/// taken under its lock, and every slow collaborator call (enforcement,
/// address resolution, persistence) runs after the lock is released.
pub struct SessionManager {
    table: SessionTable,
    enforcement: Arc<dyn Enforcement>,
    resolver: Arc<dyn AddressResolver>,
    store: Arc<dyn SessionStore>,
    session_timeout: u64,
}

impl SessionManager {
    pub fn new(
        enforcement: Arc<dyn Enforcement>,
        resolver: Arc<dyn AddressResolver>,
        store: Arc<dyn SessionStore>,
        session_timeout: u64,
    ) -> Self {
        Self {
            table: SessionTable::new(),
            enforcement,
            resolver,
            store,
            session_timeout,
        }
    }

    /// Admits an authenticated client, renewing or superseding any session
    /// already bound to the IP.
    ///
    /// With no `mac_hint` the hardware address is resolved from the neighbor
    /// table. An existing session with a genuinely different bound address is
    /// terminated as a suspected spoof before the new login proceeds; an
    /// existing session with a matching or unbound address is renewed in
    /// place. A fresh session is only recorded after the enforcement point
    /// accepted the admit call.
    pub async fn create(
        &self,
        ip: Ipv4Addr,
        username: &str,
        mac_hint: Option<&str>,
    ) -> Result<(), CreateError> {
        if ip.is_unspecified() {
            warn!("Rejecting session create for invalid address {}", ip);
            return Err(CreateError::InvalidAddress);
        }

        let mac = match mac_hint {
            Some(hint) => normalize_mac(hint),
            None => self.resolver.resolve(ip).await,
        };

        // A second device claiming this IP with a different bound address
        // supersedes the old session; decided and removed in one critical
        // section, denied after the lock is gone.
        let superseded = self
            .table
            .remove_if(&ip, |s| {
                s.has_bound_mac() && !is_sentinel(&mac) && s.mac != mac
            })
            .await;
        if let Some(old) = superseded {
            warn!(
                "Hardware address for {} changed from {} to {}; terminating session for {}",
                ip, old.mac, mac, old.username
            );
            self.finish_termination(&old, TerminationReason::AddressMismatch)
                .await;
        }

        let timeout = self.session_timeout;
        let observed = mac.clone();
        let renewed = self
            .table
            .update(&ip, |s| {
                let now = unix_now();
                s.start_time = now;
                s.expires_at = now + timeout.max(1);
                if !s.has_bound_mac() && !is_sentinel(&observed) {
                    s.mac = observed;
                }
            })
            .await;
        if let Some(session) = renewed {
            info!("Renewed session for {} ({})", session.username, ip);
            // Admission is idempotent; a failed re-admit leaves the prior
            // filter entry standing, so the session is kept.
            if let Err(e) = self.enforcement.admit(ip, &session.mac).await {
                warn!("Enforcement re-admit failed for {}: {}", ip, e);
            }
            self.persist(&session).await;
            return Ok(());
        }

        if let Err(e) = self.enforcement.admit(ip, &mac).await {
            error!("Enforcement admit failed for {}: {}", ip, e);
            return Err(CreateError::EnforcementFailure);
        }

        let session = Session::new(ip, mac, username, timeout);
        info!(
            "Created session for {} ({}) mac {}",
            session.username, ip, session.mac
        );
        self.table.put(session.clone()).await;
        self.persist(&session).await;
        Ok(())
    }

    /// Checks the session bound to `ip`, resolving expiry and spoofing
    /// synchronously: an expired or hijacked session is terminated before
    /// this returns, so a lookup never observes one.
    ///
    /// The spoof check runs here, on the hot path of every request, because
    /// an IP can be hijacked long after its owner authenticated. Verification
    /// never renews the deadline; renewal is an explicit re-authentication.
    pub async fn verify(&self, ip: Ipv4Addr) -> VerifyOutcome {
        let session = match self.table.get(&ip).await {
            Some(session) => session,
            None => return VerifyOutcome::NotFound,
        };

        if session.is_expired(unix_now()) {
            if let Some(old) = self
                .table
                .remove_if(&ip, |s| s.is_expired(unix_now()))
                .await
            {
                self.finish_termination(&old, TerminationReason::Timeout).await;
            }
            return VerifyOutcome::Expired;
        }

        if session.has_bound_mac() {
            let current = self.resolver.resolve(ip).await;
            if !is_sentinel(&current) && current != session.mac {
                // The resolver ran outside the lock; re-check the binding
                // before evicting in case the session changed meanwhile.
                if let Some(old) = self
                    .table
                    .remove_if(&ip, |s| s.has_bound_mac() && s.mac != current)
                    .await
                {
                    warn!(
                        "Spoofing suspected for {}: bound {}, observed {} (user {})",
                        ip, old.mac, current, old.username
                    );
                    self.finish_termination(&old, TerminationReason::AddressMismatch)
                        .await;
                }
                return VerifyOutcome::Spoofed;
            }
        }

        VerifyOutcome::Valid
    }

    /// Removes the session and tells the enforcement point to deny the pair.
    /// Returns false when no session existed for `ip`.
    pub async fn terminate(&self, ip: Ipv4Addr, reason: TerminationReason) -> bool {
        match self.table.remove(&ip).await {
            Some(session) => {
                self.finish_termination(&session, reason).await;
                true
            }
            None => false,
        }
    }

    /// Post-removal cleanup: the table row is already gone, so a failed deny
    /// leaves a stale filter entry behind as a logged inconsistency rather
    /// than resurrecting the session.
    async fn finish_termination(&self, session: &Session, reason: TerminationReason) {
        info!(
            "Terminated session for {} ({}): {}",
            session.username, session.ip, reason
        );
        if let Err(e) = self.enforcement.deny(session.ip, &session.mac).await {
            error!(
                "Enforcement deny failed for {} ({}): {}",
                session.ip,
                TerminationReason::SystemError,
                e
            );
        }
        if let Err(e) = self.store.clear(session.ip).await {
            warn!("Failed to clear persisted session for {}: {}", session.ip, e);
        }
    }

    /// Evicts every session past its deadline. Each eviction re-checks the
    /// deadline under the table lock, so a session renewed between the
    /// snapshot and its turn here survives.
    pub async fn sweep_expired(&self) -> usize {
        let now = unix_now();
        let expired: Vec<Ipv4Addr> = self
            .table
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.is_expired(now))
            .map(|s| s.ip)
            .collect();

        let mut evicted = 0;
        for ip in expired {
            if let Some(session) = self
                .table
                .remove_if(&ip, |s| s.is_expired(unix_now()))
                .await
            {
                self.finish_termination(&session, TerminationReason::Timeout)
                    .await;
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!("Expiration sweep evicted {} session(s)", evicted);
        }
        evicted
    }

    /// Reporting view over all sessions; read-only.
    pub async fn status_snapshot(&self) -> Vec<SessionStatus> {
        let now = unix_now();
        self.table
            .snapshot()
            .await
            .iter()
            .map(|s| s.status(now))
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.table.len().await
    }

    /// Re-installs persisted sessions after a restart. Unexpired records are
    /// re-admitted and put back in the table; expired ones are dropped from
    /// the store. Returns how many sessions came back.
    pub async fn restore_persisted(&self) -> usize {
        let records = match self.store.load_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load persisted sessions: {}", e);
                return 0;
            }
        };

        let now = unix_now();
        let mut restored = 0;
        for session in records {
            if session.is_expired(now) {
                if let Err(e) = self.store.clear(session.ip).await {
                    warn!(
                        "Failed to drop expired persisted session for {}: {}",
                        session.ip, e
                    );
                }
                continue;
            }
            if let Err(e) = self.enforcement.admit(session.ip, &session.mac).await {
                warn!(
                    "Not restoring session for {}: enforcement admit failed: {}",
                    session.ip, e
                );
                continue;
            }
            info!("Restored session for {} ({})", session.username, session.ip);
            self.table.put(session).await;
            restored += 1;
        }
        restored
    }

    /// Writes every live session through to the store; called at shutdown.
    pub async fn persist_all(&self) -> usize {
        let sessions = self.table.snapshot().await;
        let count = sessions.len();
        for session in &sessions {
            self.persist(session).await;
        }
        count
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session).await {
            warn!("Failed to persist session for {}: {}", session.ip, e);
        }
    }
}
