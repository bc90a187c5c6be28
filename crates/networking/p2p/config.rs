use ethereum_types::{H256, H512, U256};
use k256::SecretKey;

use crate::rlpx::p2p::Capability;
use crate::rlpx::utils::pubkey2id;

/// devp2p base protocol version advertised in `Hello`.
pub const BASE_PROTOCOL_VERSION: u8 = 5;
/// Default eth capability version.
pub const ETH_CAPABILITY_VERSION: u8 = 63;
/// Default devp2p TCP port.
pub const DEFAULT_LISTEN_PORT: u16 = 30303;

/// Node identity and advertisement data, read once when a session starts.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub secret_key: SecretKey,
    pub client_id: String,
    pub p2p_version: u8,
    pub capabilities: Vec<(Capability, u8)>,
    pub listen_port: u16,
    pub chain: ChainStatus,
}

/// The chain position advertised in `Status`. Chain state lives outside the
/// session core, so these are plain values refreshed by the embedder; a
/// fresh node advertises its genesis.
#[derive(Debug, Clone)]
pub struct ChainStatus {
    pub network_id: u64,
    pub genesis_hash: H256,
    pub total_difficulty: U256,
    pub best_hash: H256,
}

impl ChainStatus {
    pub fn at_genesis(network_id: u64, genesis_hash: H256, genesis_difficulty: U256) -> Self {
        Self {
            network_id,
            genesis_hash,
            total_difficulty: genesis_difficulty,
            best_hash: genesis_hash,
        }
    }
}

impl NodeConfig {
    pub fn new(secret_key: SecretKey, chain: ChainStatus) -> Self {
        Self {
            secret_key,
            client_id: format!("ethernode/{}", env!("CARGO_PKG_VERSION")),
            p2p_version: BASE_PROTOCOL_VERSION,
            capabilities: vec![(Capability::Eth, ETH_CAPABILITY_VERSION)],
            listen_port: DEFAULT_LISTEN_PORT,
            chain,
        }
    }

    /// Our node id: the uncompressed static public key without the `0x04`.
    pub fn node_id(&self) -> H512 {
        pubkey2id(&self.secret_key.public_key())
    }

    /// The eth version we advertise, used in `Status`.
    pub fn eth_version(&self) -> u8 {
        self.capabilities
            .iter()
            .find_map(|(capability, version)| {
                (*capability == Capability::Eth).then_some(*version)
            })
            .unwrap_or(ETH_CAPABILITY_VERSION)
    }
}
