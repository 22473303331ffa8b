use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hotspot_core::{Config, Enforcement};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info};

/// The packet-filter enforcement point: iptables chains plus an ipset of
/// admitted `(ip, mac)` pairs.
///
/// Unauthenticated port-80 traffic is redirected to the portal; traffic
/// matching the set is accepted, everything else on the forward path is
/// dropped. Admitting and denying a client is a single set operation, so
/// both are idempotent. Every subprocess call runs under `fw_timeout`;
/// a call that outlives it is a failure, not a hang.
pub struct Firewall {
    config: Config,
}

impl Firewall {
    pub fn new(config: Config) -> Self {
        Firewall { config }
    }

    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing firewall rules");

        let set = self.config.ipset_name.clone();
        let chain = self.config.chain_name.clone();

        // Set of admitted pairs; -exist makes re-initialization idempotent.
        self.run_command("ipset", &["create", "-exist", &set, "hash:ip,mac"])
            .await?;

        // Gateway-owned chains.
        self.run_command("iptables", &["-t", "mangle", "-N", &chain]).await?;
        self.run_command("iptables", &["-t", "nat", "-N", &chain]).await?;
        self.run_command("iptables", &["-t", "filter", "-N", &chain]).await?;

        // Mangle table rules
        self.run_command("iptables", &["-t", "mangle", "-A", "PREROUTING", "-j", &chain])
            .await?;
        self.run_command(
            "iptables",
            &[
                "-t", "mangle", "-A", &chain, "-m", "set", "--match-set", &set, "src,src",
                "-j", "MARK", "--set-mark", "1",
            ],
        )
        .await?;

        // NAT table rules: unauthenticated web traffic lands on the portal.
        self.run_command("iptables", &["-t", "nat", "-A", "PREROUTING", "-j", &chain])
            .await?;
        let portal_dest = format!("{}:{}", self.config.uamlisten, self.config.uamport);
        self.run_command(
            "iptables",
            &[
                "-t", "nat", "-A", &chain, "-m", "mark", "!", "--mark", "1", "-p", "tcp",
                "--dport", "80", "-j", "DNAT", "--to-destination", &portal_dest,
            ],
        )
        .await?;

        // Filter table rules
        self.run_command("iptables", &["-t", "filter", "-A", "FORWARD", "-j", &chain])
            .await?;
        self.run_command(
            "iptables",
            &["-t", "filter", "-A", &chain, "-p", "udp", "--dport", "53", "-j", "ACCEPT"],
        )
        .await?;
        let portal_ip = self.config.uamlisten.to_string();
        let portal_port = self.config.uamport.to_string();
        self.run_command(
            "iptables",
            &[
                "-t", "filter", "-A", &chain, "-p", "tcp", "--dport", &portal_port, "-d",
                &portal_ip, "-j", "ACCEPT",
            ],
        )
        .await?;
        self.run_command(
            "iptables",
            &[
                "-t", "filter", "-A", &chain, "-m", "set", "--match-set", &set, "src,src",
                "-j", "ACCEPT",
            ],
        )
        .await?;
        self.run_command("iptables", &["-t", "filter", "-A", &chain, "-j", "DROP"])
            .await?;

        Ok(())
    }

    pub async fn cleanup(&self) -> Result<()> {
        info!("Cleaning up firewall rules");

        let set = self.config.ipset_name.clone();
        let chain = self.config.chain_name.clone();

        // Mangle table rules
        self.run_command("iptables", &["-t", "mangle", "-D", "PREROUTING", "-j", &chain])
            .await?;
        self.run_command("iptables", &["-t", "mangle", "-F", &chain]).await?;
        self.run_command("iptables", &["-t", "mangle", "-X", &chain]).await?;

        // NAT table rules
        self.run_command("iptables", &["-t", "nat", "-D", "PREROUTING", "-j", &chain])
            .await?;
        self.run_command("iptables", &["-t", "nat", "-F", &chain]).await?;
        self.run_command("iptables", &["-t", "nat", "-X", &chain]).await?;

        // Filter table rules
        self.run_command("iptables", &["-t", "filter", "-D", "FORWARD", "-j", &chain])
            .await?;
        self.run_command("iptables", &["-t", "filter", "-F", &chain]).await?;
        self.run_command("iptables", &["-t", "filter", "-X", &chain]).await?;

        // Destroy ipset
        self.run_command("ipset", &["destroy", &set]).await?;

        Ok(())
    }

    async fn run_command(&self, command: &str, args: &[&str]) -> Result<()> {
        let timeout = Duration::from_secs(self.config.fw_timeout.max(1));
        let status = tokio::time::timeout(timeout, Command::new(command).args(args).status())
            .await
            .with_context(|| {
                format!("command '{}' timed out after {:?}", command, timeout)
            })?
            .with_context(|| format!("failed to spawn '{}'", command))?;

        if !status.success() {
            let msg = format!(
                "Command '{}' with args '{:?}' failed with status {}",
                command, args, status
            );
            error!("{}", msg);
            bail!(msg);
        }
        Ok(())
    }
}

#[async_trait]
impl Enforcement for Firewall {
    async fn admit(&self, ip: Ipv4Addr, mac: &str) -> Result<()> {
        info!("Admitting {} ({}) at the packet filter", ip, mac);
        let entry = format!("{},{}", ip, mac);
        self.run_command("ipset", &["add", "-exist", &self.config.ipset_name, &entry])
            .await
    }

    async fn deny(&self, ip: Ipv4Addr, mac: &str) -> Result<()> {
        info!("Denying {} ({}) at the packet filter", ip, mac);
        let entry = format!("{},{}", ip, mac);
        self.run_command("ipset", &["del", "-exist", &self.config.ipset_name, &entry])
            .await
    }
}
