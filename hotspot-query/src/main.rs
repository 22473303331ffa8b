use anyhow::Result;
use clap::{Parser, Subcommand};
use hotspot_core::session::format_duration;
use hotspot_ipc::{Command, Response};
use std::net::Ipv4Addr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const CMDSOCK_PATH: &str = "/var/run/hotspot.sock";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path of the daemon's command socket
    #[clap(short, long, default_value = CMDSOCK_PATH)]
    socket: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List active sessions
    List,
    /// Disconnect a session by IP address
    Disconnect {
        #[clap(value_parser)]
        ip: Ipv4Addr,
    },
}

async fn send_command(socket: &str, command: Command) -> Result<Response> {
    let mut stream = UnixStream::connect(socket).await?;
    let serialized = serde_json::to_vec(&command)?;

    stream.write_all(&serialized).await?;
    stream.shutdown().await?; // Half-close the stream

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response: Response = serde_json::from_slice(&buffer)?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::List => {
            let response = send_command(&cli.socket, Command::List).await?;
            match response {
                Response::List(sessions) => {
                    println!(
                        "{:<15} {:<12} {:<17} {:<12} {:<12}",
                        "IP Address", "Username", "MAC Address", "Online", "Remaining"
                    );
                    println!("{:-<72}", "");
                    for session in sessions {
                        println!(
                            "{:<15} {:<12} {:<17} {:<12} {:<12}",
                            session.ip,
                            session.username,
                            session.mac,
                            format_duration(session.elapsed),
                            format_duration(session.remaining),
                        );
                    }
                }
                Response::Error(e) => {
                    eprintln!("Server error: {}", e);
                }
                _ => {
                    eprintln!("Unexpected response from server");
                }
            }
        }
        Commands::Disconnect { ip } => {
            let response = send_command(&cli.socket, Command::Disconnect { ip: *ip }).await?;
            match response {
                Response::Success => {
                    println!("Successfully disconnected session for IP {}", ip);
                }
                Response::Error(e) => {
                    eprintln!("Failed to disconnect session for IP {}: {}", ip, e);
                }
                _ => {
                    eprintln!("Unexpected response from server");
                }
            }
        }
    }

    Ok(())
}
