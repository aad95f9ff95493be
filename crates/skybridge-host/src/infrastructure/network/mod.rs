//! Network infrastructure: LAN reachability probing and the streaming
//! session server.

pub mod probe;
pub mod server;
