pub mod firewall;
pub mod neigh;

pub use firewall::Firewall;
pub use neigh::NeighborResolver;
