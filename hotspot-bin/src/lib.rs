pub mod cmdsock;
pub mod config;

use anyhow::Result;
use hotspot_core::{
    AuthRequest, Config, CoreRequest, CredentialFile, JsonFileStore, NullStore, SessionManager,
    SessionStore, StatusRequest, TerminationReason,
};
use hotspot_http::server;
use hotspot_net::{Firewall, NeighborResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Builds the session manager over the configured store and the given
/// collaborator ports.
pub fn build_manager(
    config: &Config,
    enforcement: Arc<dyn hotspot_core::Enforcement>,
    resolver: Arc<dyn hotspot_core::AddressResolver>,
) -> Arc<SessionManager> {
    let store: Arc<dyn SessionStore> = match &config.statusfile {
        Some(path) => Arc::new(JsonFileStore::new(path.clone())),
        None => Arc::new(NullStore),
    };
    Arc::new(SessionManager::new(
        enforcement,
        resolver,
        store,
        config.session_timeout,
    ))
}

async fn handle_auth(req: AuthRequest, manager: Arc<SessionManager>, users: CredentialFile) {
    if !users.verify_password(&req.username, &req.password) {
        info!("Authentication failed for user '{}'", req.username);
        req.tx.send(false).ok();
        return;
    }

    info!("Authentication successful for user '{}'", req.username);
    match manager
        .create(req.ip, &req.username, req.mac_hint.as_deref())
        .await
    {
        Ok(()) => {
            req.tx.send(true).ok();
        }
        Err(e) => {
            warn!("Session create failed for {}: {}", req.ip, e);
            req.tx.send(false).ok();
        }
    }
}

async fn handle_status(req: StatusRequest, manager: Arc<SessionManager>) {
    // Status is the per-request hot path: expiry and spoofing are resolved
    // here, before anything is reported back.
    if !manager.verify(req.ip).await.is_valid() {
        req.tx.send(None).ok();
        return;
    }
    let status = manager
        .status_snapshot()
        .await
        .into_iter()
        .find(|s| s.ip == req.ip);
    req.tx.send(status).ok();
}

/// Serves the HTTP layer's requests. Each one runs in its own task so a slow
/// enforcement call for one client never stalls logins from another.
async fn core_request_loop(
    mut rx: mpsc::Receiver<CoreRequest>,
    manager: Arc<SessionManager>,
    users: CredentialFile,
) {
    while let Some(request) = rx.recv().await {
        match request {
            CoreRequest::Auth(req) => {
                let manager = manager.clone();
                let users = users.clone();
                tokio::spawn(handle_auth(req, manager, users));
            }
            CoreRequest::Logoff(req) => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let existed = manager.terminate(req.ip, TerminationReason::UserLogout).await;
                    req.tx.send(existed).ok();
                });
            }
            CoreRequest::Status(req) => {
                let manager = manager.clone();
                tokio::spawn(handle_status(req, manager));
            }
        }
    }
}

async fn session_reaper_loop(manager: Arc<SessionManager>, sweep_interval: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval.max(1)));
    loop {
        interval.tick().await;
        manager.sweep_expired().await;
    }
}

async fn sighup_handler(users: CredentialFile, config: Arc<Config>) {
    let mut stream = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to create SIGHUP listener: {}", e);
            return;
        }
    };

    while stream.recv().await.is_some() {
        info!("SIGHUP received, reloading credential file...");
        match users.load(&config.usersfile) {
            Ok(()) => info!("Credential file reloaded successfully."),
            Err(e) => error!("Failed to reload credential file {}: {}", config.usersfile, e),
        }
    }
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting hotspotd");

    let config = match config::load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    info!("Config loaded: {:?}", config);

    let firewall = Arc::new(Firewall::new((*config).clone()));
    if let Err(e) = firewall.initialize().await {
        error!("Error initializing firewall: {}", e);
        std::process::exit(1);
    }

    let users = CredentialFile::new();
    if let Err(e) = users.load(&config.usersfile) {
        warn!(
            "Failed to load credential file {}: {}; no logins will succeed until SIGHUP",
            config.usersfile, e
        );
    }

    let resolver = Arc::new(NeighborResolver::new(Duration::from_secs(
        config.arp_timeout.max(1),
    )));
    let manager = build_manager(&config, firewall.clone(), resolver);

    let restored = manager.restore_persisted().await;
    if restored > 0 {
        info!("Restored {} persisted session(s)", restored);
    }

    let (core_tx, core_rx) = mpsc::channel(100);

    let listener = tokio::net::TcpListener::bind((config.uamlisten, config.uamport)).await?;
    let http_server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(listener, core_tx).await {
            error!("HTTP server error: {}", e);
        }
    });

    let core_loop_handle = tokio::spawn(core_request_loop(
        core_rx,
        manager.clone(),
        users.clone(),
    ));

    let reaper_handle = tokio::spawn(session_reaper_loop(
        manager.clone(),
        config.sweep_interval,
    ));

    let cmdsock_handle = if let Some(path) = config.cmdsocket.clone() {
        let manager = manager.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = cmdsock::run_cmdsock_listener(path, manager).await {
                error!("Cmdsock listener error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::select! {
        _ = http_server_handle => {
            info!("HTTP server finished.");
        }
        _ = core_loop_handle => {
            info!("Core request loop finished.");
        }
        _ = reaper_handle => {
            info!("Session reaper loop finished.");
        }
        _ = async { if let Some(h) = cmdsock_handle { h.await.ok(); } } => {
            info!("Cmdsock listener finished.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down.");
        }
        _ = sighup_handler(users.clone(), config.clone()) => {
            info!("SIGHUP handler finished.");
        }
    }

    let saved = manager.persist_all().await;
    if saved > 0 {
        info!("Persisted {} session(s) for restart", saved);
    }

    if let Err(e) = firewall.cleanup().await {
        warn!("Firewall cleanup failed: {}", e);
    }

    info!("Shutdown complete.");

    Ok(())
}
