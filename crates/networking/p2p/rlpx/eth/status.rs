use bytes::BufMut;
use ethereum_types::{H256, U256};
use ethernode_rlp::{
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::config::NodeConfig;
use crate::rlpx::message::RLPxMessage;

/// eth status: chain position advertisement, also reused as the session's
/// liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub protocol_version: u32,
    pub network_id: u64,
    pub total_difficulty: U256,
    pub best_hash: H256,
    pub genesis: H256,
}

impl StatusMessage {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            protocol_version: config.eth_version().into(),
            network_id: config.chain.network_id,
            total_difficulty: config.chain.total_difficulty,
            best_hash: config.chain.best_hash,
            genesis: config.chain.genesis_hash,
        }
    }
}

impl RLPxMessage for StatusMessage {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.protocol_version)
            .encode_field(&self.network_id)
            .encode_field(&self.total_difficulty)
            .encode_field(&self.best_hash)
            .encode_field(&self.genesis)
            .finish();
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (protocol_version, decoder) = decoder.decode_field("protocolVersion")?;
        let (network_id, decoder) = decoder.decode_field("networkId")?;
        let (total_difficulty, decoder) = decoder.decode_field("totalDifficulty")?;
        let (best_hash, decoder) = decoder.decode_field("bestHash")?;
        let (genesis, decoder) = decoder.decode_field("genesisHash")?;
        // Implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self {
            protocol_version,
            network_id,
            total_difficulty,
            best_hash,
            genesis,
        })
    }
}
