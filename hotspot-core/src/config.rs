use serde::Deserialize;
use std::net::Ipv4Addr;

// Helper functions for default values
fn default_session_timeout() -> u64 { 3600 }
fn default_sweep_interval() -> u64 { 60 }
fn default_net() -> Ipv4Addr { "192.168.182.0".parse().unwrap() }
fn default_mask() -> Ipv4Addr { "255.255.255.0".parse().unwrap() }
fn default_uamlisten() -> Ipv4Addr { "192.168.182.1".parse().unwrap() }
fn default_uamport() -> u16 { 3990 }
fn default_usersfile() -> String { "/etc/hotspot/users".to_string() }
fn default_ipset_name() -> String { "hotspot_auth".to_string() }
fn default_chain_name() -> String { "hotspot".to_string() }
fn default_fw_timeout() -> u64 { 3 }
fn default_arp_timeout() -> u64 { 3 }

/// The main configuration for the hotspot daemon.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Seconds a session stays valid without renewal.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,
    /// Seconds between expiration sweeps; keep shorter than the session
    /// timeout so no session outlives its deadline by more than one tick.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    #[serde(default = "default_net")]
    pub net: Ipv4Addr,
    #[serde(default = "default_mask")]
    pub mask: Ipv4Addr,

    /// Address and port the captive portal binds.
    #[serde(default = "default_uamlisten")]
    pub uamlisten: Ipv4Addr,
    #[serde(default = "default_uamport")]
    pub uamport: u16,

    /// `username:password` credential file for portal logins.
    #[serde(default = "default_usersfile")]
    pub usersfile: String,

    /// Admin command socket path; unset disables the listener.
    #[serde(default)]
    pub cmdsocket: Option<String>,
    /// Session persistence file; unset disables restart restore.
    #[serde(default)]
    pub statusfile: Option<String>,

    /// Name of the ipset holding admitted (ip, mac) pairs.
    #[serde(default = "default_ipset_name")]
    pub ipset_name: String,
    /// Name of the iptables chains the gateway owns.
    #[serde(default = "default_chain_name")]
    pub chain_name: String,
    /// Seconds before a packet-filter subprocess call is treated as failed.
    #[serde(default = "default_fw_timeout")]
    pub fw_timeout: u64,
    /// Seconds before a neighbor-table lookup gives up.
    #[serde(default = "default_arp_timeout")]
    pub arp_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_timeout: default_session_timeout(),
            sweep_interval: default_sweep_interval(),
            net: default_net(),
            mask: default_mask(),
            uamlisten: default_uamlisten(),
            uamport: default_uamport(),
            usersfile: default_usersfile(),
            cmdsocket: Some("/var/run/hotspot.sock".to_string()), // Custom default
            statusfile: Some("/var/run/hotspot.sessions".to_string()), // Custom default
            ipset_name: default_ipset_name(),
            chain_name: default_chain_name(),
            fw_timeout: default_fw_timeout(),
            arp_timeout: default_arp_timeout(),
        }
    }
}
