use ethereum_types::H512;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeParseError {
    #[error("enode url must start with enode://")]
    MissingScheme,
    #[error("invalid node id")]
    InvalidNodeId,
    #[error("invalid socket address")]
    InvalidAddress,
}

/// A remote peer endpoint: where to reach it and who it must prove to be.
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub node_id: H512,
}

impl Node {
    pub fn new(ip: IpAddr, tcp_port: u16, node_id: H512) -> Self {
        Self {
            ip,
            tcp_port,
            node_id,
        }
    }

    pub fn tcp_address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port)
    }

    pub fn enode_url(&self) -> String {
        format!(
            "enode://{}@{}:{}",
            hex::encode(self.node_id),
            self.ip,
            self.tcp_port
        )
    }
}

impl FromStr for Node {
    type Err = NodeParseError;

    /// Parses an `enode://<node-id>@<ip>:<port>` url.
    fn from_str(input: &str) -> Result<Node, NodeParseError> {
        let rest = input
            .strip_prefix("enode://")
            .ok_or(NodeParseError::MissingScheme)?;
        let (id_part, addr_part) = rest.split_once('@').ok_or(NodeParseError::InvalidAddress)?;

        let id_bytes = hex::decode(id_part).map_err(|_| NodeParseError::InvalidNodeId)?;
        if id_bytes.len() != 64 {
            return Err(NodeParseError::InvalidNodeId);
        }
        let node_id = H512::from_slice(&id_bytes);

        let address: SocketAddr = addr_part
            .parse()
            .map_err(|_| NodeParseError::InvalidAddress)?;

        Ok(Node::new(address.ip(), address.port(), node_id))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.enode_url().fmt(f)
    }
}
