use async_trait::async_trait;
use hotspot_core::{is_sentinel, normalize_mac, AddressResolver, SENTINEL_MAC};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// Resolves the hardware address currently claiming an IP from the kernel
/// neighbor table, `ip neigh` first with `arp -n` as fallback.
///
/// Best effort by contract: spawn failures, timeouts, and unparsable output
/// all come back as the sentinel so the caller never handles an error here.
pub struct NeighborResolver {
    timeout: Duration,
}

impl NeighborResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query(&self, command: &str, args: &[&str]) -> Option<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(command).args(args).output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!("Neighbor lookup '{}' failed to run: {}", command, e);
                None
            }
            Err(_) => {
                warn!("Neighbor lookup '{}' timed out after {:?}", command, self.timeout);
                None
            }
        }
    }

    /// Picks the `lladdr` of a live neighbor entry out of `ip neigh show`
    /// output, e.g. `10.0.0.5 dev eth0 lladdr aa:bb:cc:dd:ee:01 REACHABLE`.
    fn parse_ip_neigh(output: &str, ip: Ipv4Addr) -> Option<String> {
        let needle = ip.to_string();
        for line in output.lines() {
            if !line.contains(&needle) {
                continue;
            }
            if !(line.contains("REACHABLE") || line.contains("STALE") || line.contains("DELAY")) {
                continue;
            }
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token == "lladdr" {
                    return tokens.next().map(str::to_string);
                }
            }
        }
        None
    }

    /// Third column of the first entry line of `arp -n <ip>` output.
    fn parse_arp(output: &str) -> Option<String> {
        let entry = output.lines().nth(1)?;
        let fields: Vec<&str> = entry.split_whitespace().collect();
        if fields.len() >= 3 {
            Some(fields[2].to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl AddressResolver for NeighborResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> String {
        let target = ip.to_string();

        if let Some(output) = self.query("ip", &["neigh", "show", &target]).await {
            if let Some(raw) = Self::parse_ip_neigh(&output, ip) {
                let mac = normalize_mac(&raw);
                if !is_sentinel(&mac) {
                    return mac;
                }
            }
        }

        if let Some(output) = self.query("arp", &["-n", &target]).await {
            if let Some(raw) = Self::parse_arp(&output) {
                let mac = normalize_mac(&raw);
                if !is_sentinel(&mac) {
                    return mac;
                }
            }
        }

        SENTINEL_MAC.to_string()
    }
}
