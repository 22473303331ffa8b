use hotspot_core::SessionStatus;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Admin socket commands, JSON over a Unix stream.
#[derive(Serialize, Deserialize, Debug)]
pub enum Command {
    List,
    Disconnect { ip: Ipv4Addr },
}

#[derive(Serialize, Deserialize, Debug)]
pub enum Response {
    List(Vec<SessionStatus>),
    Success,
    Error(String),
}
