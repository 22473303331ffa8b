pub mod config;
pub mod local_users;
pub mod mac;
pub mod manager;
pub mod session;
pub mod store;

use std::net::Ipv4Addr;

pub use config::Config;
pub use local_users::CredentialFile;
pub use mac::{is_sentinel, normalize_mac, SENTINEL_MAC};
pub use manager::{
    AddressResolver, CreateError, Enforcement, SessionManager, SessionStore, VerifyOutcome,
};
pub use session::{Session, SessionStatus, SessionTable, TerminationReason};
pub use store::{JsonFileStore, NullStore};

use tokio::sync::oneshot;

#[derive(Debug)]
pub struct AuthRequest {
    pub ip: Ipv4Addr,
    pub username: String,
    pub password: String,
    /// Hardware address observed by the transport, if it saw one; otherwise
    /// the manager resolves it from the neighbor table.
    pub mac_hint: Option<String>,
    pub tx: oneshot::Sender<bool>,
}

#[derive(Debug)]
pub struct LogoffRequest {
    pub ip: Ipv4Addr,
    pub tx: oneshot::Sender<bool>,
}

#[derive(Debug)]
pub struct StatusRequest {
    pub ip: Ipv4Addr,
    /// `None` when the caller has no valid session; the reason stays
    /// internal so a spoofed client cannot tell it was detected.
    pub tx: oneshot::Sender<Option<SessionStatus>>,
}

#[derive(Debug)]
pub enum CoreRequest {
    Auth(AuthRequest),
    Logoff(LogoffRequest),
    Status(StatusRequest),
}
