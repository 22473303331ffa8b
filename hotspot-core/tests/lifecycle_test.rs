use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hotspot_core::{
    AddressResolver, CreateError, Enforcement, Session, SessionManager, SessionStore,
    TerminationReason, VerifyOutcome, SENTINEL_MAC,
};

#[derive(Default)]
struct RecordingEnforcement {
    admits: Mutex<Vec<(Ipv4Addr, String)>>,
    denies: Mutex<Vec<(Ipv4Addr, String)>>,
    fail_admit: AtomicBool,
    admit_delay: Option<Duration>,
}

impl RecordingEnforcement {
    fn slow(delay: Duration) -> Self {
        Self {
            admit_delay: Some(delay),
            ..Self::default()
        }
    }

    fn admits(&self) -> Vec<(Ipv4Addr, String)> {
        self.admits.lock().unwrap().clone()
    }

    fn denies(&self) -> Vec<(Ipv4Addr, String)> {
        self.denies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enforcement for RecordingEnforcement {
    async fn admit(&self, ip: Ipv4Addr, mac: &str) -> Result<()> {
        if let Some(delay) = self.admit_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_admit.load(Ordering::SeqCst) {
            anyhow::bail!("packet filter refused admit");
        }
        self.admits.lock().unwrap().push((ip, mac.to_string()));
        Ok(())
    }

    async fn deny(&self, ip: Ipv4Addr, mac: &str) -> Result<()> {
        self.denies.lock().unwrap().push((ip, mac.to_string()));
        Ok(())
    }
}

/// Resolver whose answer the test can change mid-flight, standing in for a
/// neighbor table that suddenly shows a different device on the IP.
struct SwitchableResolver {
    mac: Mutex<String>,
}

impl SwitchableResolver {
    fn new(mac: &str) -> Self {
        Self {
            mac: Mutex::new(mac.to_string()),
        }
    }

    fn set(&self, mac: &str) {
        *self.mac.lock().unwrap() = mac.to_string();
    }
}

#[async_trait]
impl AddressResolver for SwitchableResolver {
    async fn resolve(&self, _ip: Ipv4Addr) -> String {
        self.mac.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<Ipv4Addr, Session>>,
}

impl MemoryStore {
    fn contains(&self, ip: Ipv4Addr) -> bool {
        self.records.lock().unwrap().contains_key(&ip)
    }

    fn insert(&self, session: Session) {
        self.records.lock().unwrap().insert(session.ip, session);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Session>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(session.ip, session.clone());
        Ok(())
    }

    async fn clear(&self, ip: Ipv4Addr) -> Result<()> {
        self.records.lock().unwrap().remove(&ip);
        Ok(())
    }
}

struct Fixture {
    manager: SessionManager,
    enforcement: Arc<RecordingEnforcement>,
    resolver: Arc<SwitchableResolver>,
    store: Arc<MemoryStore>,
}

fn fixture_with(timeout: u64, enforcement: RecordingEnforcement, resolver_mac: &str) -> Fixture {
    let enforcement = Arc::new(enforcement);
    let resolver = Arc::new(SwitchableResolver::new(resolver_mac));
    let store = Arc::new(MemoryStore::default());
    let manager = SessionManager::new(
        enforcement.clone(),
        resolver.clone(),
        store.clone(),
        timeout,
    );
    Fixture {
        manager,
        enforcement,
        resolver,
        store,
    }
}

fn fixture(timeout: u64, resolver_mac: &str) -> Fixture {
    fixture_with(timeout, RecordingEnforcement::default(), resolver_mac)
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_verify_unknown_ip_is_not_found() {
    let fx = fixture(60, SENTINEL_MAC);
    assert_eq!(fx.manager.verify(ip("10.0.0.1")).await, VerifyOutcome::NotFound);
}

#[tokio::test]
async fn test_create_rejects_unspecified_ip() {
    let fx = fixture(60, SENTINEL_MAC);
    let err = fx
        .manager
        .create(ip("0.0.0.0"), "alice", Some("AA:BB:CC:DD:EE:01"))
        .await
        .unwrap_err();
    assert_eq!(err, CreateError::InvalidAddress);
    assert!(fx.enforcement.admits().is_empty());
}

#[tokio::test]
async fn test_create_then_verify_then_expire() {
    let fx = fixture(1, "AA:BB:CC:DD:EE:01");
    let client = ip("10.0.0.5");

    fx.manager
        .create(client, "alice", Some("AA:BB:CC:DD:EE:01"))
        .await
        .unwrap();
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);
    assert!(fx.store.contains(client));

    tokio::time::sleep(Duration::from_millis(2100)).await;

    // Expiry is resolved synchronously by verify; no resurrection afterwards.
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Expired);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::NotFound);
    assert_eq!(fx.enforcement.denies(), vec![(client, "AA:BB:CC:DD:EE:01".to_string())]);
    assert!(!fx.store.contains(client));
}

#[tokio::test]
async fn test_relogin_with_new_mac_supersedes_old_session() {
    let fx = fixture(60, SENTINEL_MAC);
    let client = ip("10.0.0.5");

    fx.manager
        .create(client, "alice", Some("AA:BB:CC:DD:EE:01"))
        .await
        .unwrap();
    fx.manager
        .create(client, "bob", Some("AA:BB:CC:DD:EE:02"))
        .await
        .unwrap();

    // The old binding was denied, the new one admitted.
    assert_eq!(fx.enforcement.denies(), vec![(client, "AA:BB:CC:DD:EE:01".to_string())]);
    assert_eq!(
        fx.enforcement.admits(),
        vec![
            (client, "AA:BB:CC:DD:EE:01".to_string()),
            (client, "AA:BB:CC:DD:EE:02".to_string()),
        ]
    );

    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);
    let status = fx.manager.status_snapshot().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].username, "bob");
    assert_eq!(status[0].mac, "AA:BB:CC:DD:EE:02");
}

#[tokio::test]
async fn test_relogin_same_mac_renews_without_new_session() {
    let fx = fixture(60, SENTINEL_MAC);
    let client = ip("10.0.0.5");

    fx.manager
        .create(client, "alice", Some("AA:BB:CC:DD:EE:01"))
        .await
        .unwrap();
    fx.manager
        .create(client, "alice", Some("aa-bb-cc-dd-ee-01"))
        .await
        .unwrap();

    assert!(fx.enforcement.denies().is_empty());
    assert_eq!(fx.manager.session_count().await, 1);
    // Renewal re-admits idempotently.
    assert_eq!(fx.enforcement.admits().len(), 2);
}

#[tokio::test]
async fn test_renewal_backfills_unbound_mac() {
    let fx = fixture(60, SENTINEL_MAC);
    let client = ip("10.0.0.5");

    // First login while the neighbor table had nothing: unbound session.
    fx.manager.create(client, "alice", None).await.unwrap();
    let status = fx.manager.status_snapshot().await;
    assert_eq!(status[0].mac, SENTINEL_MAC);

    // An unbound session never trips the spoof check.
    fx.resolver.set("AA:BB:CC:DD:EE:01");
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);

    fx.manager.create(client, "alice", None).await.unwrap();
    let status = fx.manager.status_snapshot().await;
    assert_eq!(status[0].mac, "AA:BB:CC:DD:EE:01");
    assert!(fx.enforcement.denies().is_empty());
}

#[tokio::test]
async fn test_logout_terminates_once() {
    let fx = fixture(60, "AA:BB:CC:DD:EE:01");
    let client = ip("10.0.0.5");

    fx.manager.create(client, "alice", None).await.unwrap();
    assert!(fx.manager.terminate(client, TerminationReason::UserLogout).await);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::NotFound);
    assert!(!fx.store.contains(client));

    // No session left to terminate.
    assert!(!fx.manager.terminate(client, TerminationReason::UserLogout).await);
    assert_eq!(fx.enforcement.denies().len(), 1);
}

#[tokio::test]
async fn test_enforcement_failure_records_nothing() {
    let fx = fixture(60, SENTINEL_MAC);
    fx.enforcement.fail_admit.store(true, Ordering::SeqCst);
    let client = ip("10.0.0.5");

    let err = fx
        .manager
        .create(client, "alice", Some("AA:BB:CC:DD:EE:01"))
        .await
        .unwrap_err();
    assert_eq!(err, CreateError::EnforcementFailure);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::NotFound);
    assert!(!fx.store.contains(client));
}

#[tokio::test]
async fn test_spoofed_session_is_terminated_end_to_end() {
    let fx = fixture(60, "AA:BB:CC:DD:EE:01");
    let client = ip("10.0.0.5");

    fx.manager.create(client, "alice", None).await.unwrap();
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);

    // A different device starts answering for the IP.
    fx.resolver.set("AA:BB:CC:DD:EE:02");
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Spoofed);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::NotFound);
    assert_eq!(fx.enforcement.denies(), vec![(client, "AA:BB:CC:DD:EE:01".to_string())]);
}

#[tokio::test]
async fn test_sentinel_resolution_never_counts_as_spoofing() {
    let fx = fixture(60, "AA:BB:CC:DD:EE:01");
    let client = ip("10.0.0.5");

    fx.manager.create(client, "alice", None).await.unwrap();

    // Losing the neighbor entry is "address unknown", not a mismatch.
    fx.resolver.set(SENTINEL_MAC);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);
}

#[tokio::test]
async fn test_sweep_evicts_only_expired_sessions() {
    let fx = fixture(1, "AA:BB:CC:DD:EE:01");
    let expired = ip("10.0.0.5");

    fx.manager.create(expired, "alice", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(fx.manager.sweep_expired().await, 1);
    assert_eq!(fx.manager.verify(expired).await, VerifyOutcome::NotFound);
    assert_eq!(fx.enforcement.denies().len(), 1);

    // Nothing left; the sweep is idempotent.
    assert_eq!(fx.manager.sweep_expired().await, 0);
}

#[tokio::test]
async fn test_renewed_session_survives_sweep() {
    let fx = fixture(1, "AA:BB:CC:DD:EE:01");
    let client = ip("10.0.0.5");

    fx.manager.create(client, "alice", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    // Re-authentication moves the deadline before the sweep runs; the
    // sweep's under-lock re-check must leave the renewed session alone.
    fx.manager.create(client, "alice", None).await.unwrap();
    assert_eq!(fx.manager.sweep_expired().await, 0);
    assert_eq!(fx.manager.verify(client).await, VerifyOutcome::Valid);
}

#[tokio::test]
async fn test_creates_for_distinct_ips_overlap() {
    let fx = fixture_with(
        60,
        RecordingEnforcement::slow(Duration::from_millis(400)),
        SENTINEL_MAC,
    );
    let manager = Arc::new(fx.manager);

    let started = std::time::Instant::now();
    let a = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .create(ip("10.0.0.5"), "alice", Some("AA:BB:CC:DD:EE:01"))
                .await
        })
    };
    let b = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .create(ip("10.0.0.6"), "bob", Some("AA:BB:CC:DD:EE:02"))
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Two slow admit calls must not serialize behind the table lock.
    assert!(
        started.elapsed() < Duration::from_millis(750),
        "concurrent creates took {:?}",
        started.elapsed()
    );
    assert_eq!(manager.session_count().await, 2);
}

#[tokio::test]
async fn test_restore_skips_expired_and_readmits_the_rest() {
    let fx = fixture(60, SENTINEL_MAC);

    let live = Session::new(ip("10.0.0.5"), "AA:BB:CC:DD:EE:01".to_string(), "alice", 600);
    let mut stale = Session::new(ip("10.0.0.6"), "AA:BB:CC:DD:EE:02".to_string(), "bob", 600);
    stale.expires_at = stale.start_time.saturating_sub(1);
    fx.store.insert(live);
    fx.store.insert(stale);

    assert_eq!(fx.manager.restore_persisted().await, 1);
    assert_eq!(fx.manager.verify(ip("10.0.0.5")).await, VerifyOutcome::Valid);
    assert_eq!(fx.manager.verify(ip("10.0.0.6")).await, VerifyOutcome::NotFound);
    assert_eq!(
        fx.enforcement.admits(),
        vec![(ip("10.0.0.5"), "AA:BB:CC:DD:EE:01".to_string())]
    );
    assert!(!fx.store.contains(ip("10.0.0.6")));
}
