//! Port probing for backends that need a TCP endpoint

use std::net::{SocketAddr, TcpListener};

/// True when 127.0.0.1:`port` can be bound right now.
pub fn is_port_available(port: u16) -> bool {
    let addr_localhost = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr_localhost).is_ok()
}

/// First bindable port in `start_port..=end_port`, if any.
pub fn find_available_port(start_port: u16, end_port: u16) -> Option<u16> {
    (start_port..=end_port).find(|&port| is_port_available(port))
}

/// Port the OS hands out for an ephemeral bind on 127.0.0.1.
pub fn ephemeral_port() -> Option<u16> {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .ok()
}
