use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H256, H64, U256};
use ethernode_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use super::transactions::Transaction;
use crate::rlpx::message::RLPxMessage;

// A 32-byte hash is a string of length 32, so its RLP prefix is 0x80 + 32.
const HASH_PREFIX: u8 = 0xa0;

/// Either a block hash or a block number, used as the starting point of a
/// headers request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOrNumber {
    Hash(H256),
    Number(u64),
}

impl From<H256> for HashOrNumber {
    fn from(hash: H256) -> Self {
        HashOrNumber::Hash(hash)
    }
}

impl From<u64> for HashOrNumber {
    fn from(number: u64) -> Self {
        HashOrNumber::Number(number)
    }
}

impl RLPEncode for HashOrNumber {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            HashOrNumber::Hash(hash) => hash.encode(buf),
            HashOrNumber::Number(number) => number.encode(buf),
        }
    }

    fn length(&self) -> usize {
        match self {
            HashOrNumber::Hash(hash) => hash.length(),
            HashOrNumber::Number(number) => number.length(),
        }
    }
}

impl RLPDecode for HashOrNumber {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first_byte = buf.first().ok_or(RLPDecodeError::InvalidLength)?;
        if *first_byte == HASH_PREFIX {
            let (hash, rest) = H256::decode_unfinished(buf)?;
            return Ok((Self::Hash(hash), rest));
        }
        let (number, rest) = u64::decode_unfinished(buf)?;
        Ok((Self::Number(number), rest))
    }
}

/// A block header, pre-merge shape: fifteen fields ending in the
/// proof-of-work mix hash and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub ommers_hash: H256,
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: H256,
    pub nonce: H64,
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.ommers_hash)
            .encode_field(&self.coinbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.receipts_root)
            .encode_field(&self.logs_bloom)
            .encode_field(&self.difficulty)
            .encode_field(&self.number)
            .encode_field(&self.gas_limit)
            .encode_field(&self.gas_used)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .encode_field(&self.mix_hash)
            .encode_field(&self.nonce)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parentHash")?;
        let (ommers_hash, decoder) = decoder.decode_field("ommersHash")?;
        let (coinbase, decoder) = decoder.decode_field("coinbase")?;
        let (state_root, decoder) = decoder.decode_field("stateRoot")?;
        let (transactions_root, decoder) = decoder.decode_field("transactionsRoot")?;
        let (receipts_root, decoder) = decoder.decode_field("receiptsRoot")?;
        let (logs_bloom, decoder) = decoder.decode_field("logsBloom")?;
        let (difficulty, decoder) = decoder.decode_field("difficulty")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (gas_limit, decoder) = decoder.decode_field("gasLimit")?;
        let (gas_used, decoder) = decoder.decode_field("gasUsed")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        let (extra_data, decoder) = decoder.decode_field("extraData")?;
        let (mix_hash, decoder) = decoder.decode_field("mixHash")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let rest = decoder.finish()?;

        let this = Self {
            parent_hash,
            ommers_hash,
            coinbase,
            state_root,
            transactions_root,
            receipts_root,
            logs_bloom,
            difficulty,
            number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            mix_hash,
            nonce,
        };
        Ok((this, rest))
    }
}

/// A block body: the transactions plus the ommer headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
    pub ommers: Vec<BlockHeader>,
}

impl RLPEncode for BlockBody {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.transactions)
            .encode_field(&self.ommers)
            .finish();
    }
}

impl RLPDecode for BlockBody {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let (ommers, decoder) = decoder.decode_field("ommers")?;
        let rest = decoder.finish()?;
        Ok((
            Self {
                transactions,
                ommers,
            },
            rest,
        ))
    }
}

/// A full block as carried by `NewBlock`: `[header, transactions, ommers]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub ommers: Vec<BlockHeader>,
}

impl RLPEncode for Block {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.header)
            .encode_field(&self.transactions)
            .encode_field(&self.ommers)
            .finish();
    }
}

impl RLPDecode for Block {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (header, decoder) = decoder.decode_field("header")?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let (ommers, decoder) = decoder.decode_field("ommers")?;
        let rest = decoder.finish()?;
        Ok((
            Self {
                header,
                transactions,
                ommers,
            },
            rest,
        ))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblockhashes-0x01
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlockHashes {
    /// `[[hash, number], ...]`
    pub block_hashes: Vec<(H256, u64)>,
}

impl NewBlockHashes {
    pub fn new(block_hashes: Vec<(H256, u64)>) -> Self {
        Self { block_hashes }
    }
}

impl RLPxMessage for NewBlockHashes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.block_hashes.encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self::new(Vec::decode(msg_data)?))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockheaders-0x03
// The eth/63 request has no request id: [startblock, limit, skip, reverse].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockHeaders {
    pub startblock: HashOrNumber,
    pub limit: u64,
    pub skip: u64,
    pub reverse: bool,
}

impl GetBlockHeaders {
    pub fn new(startblock: HashOrNumber, limit: u64, skip: u64, reverse: bool) -> Self {
        Self {
            startblock,
            limit,
            skip,
            reverse,
        }
    }
}

impl RLPxMessage for GetBlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.startblock)
            .encode_field(&self.limit)
            .encode_field(&self.skip)
            .encode_field(&self.reverse)
            .finish();
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (startblock, decoder) = decoder.decode_field("startblock")?;
        let (limit, decoder) = decoder.decode_field("limit")?;
        let (skip, decoder) = decoder.decode_field("skip")?;
        let (reverse, decoder) = decoder.decode_field("reverse")?;
        decoder.finish()?;
        Ok(Self::new(startblock, limit, skip, reverse))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockheaders-0x04
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaders {
    pub block_headers: Vec<BlockHeader>,
}

impl BlockHeaders {
    pub fn new(block_headers: Vec<BlockHeader>) -> Self {
        Self { block_headers }
    }
}

impl RLPxMessage for BlockHeaders {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.block_headers.encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self::new(Vec::decode(msg_data)?))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#getblockbodies-0x05
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockBodies {
    pub block_hashes: Vec<H256>,
}

impl GetBlockBodies {
    pub fn new(block_hashes: Vec<H256>) -> Self {
        Self { block_hashes }
    }
}

impl RLPxMessage for GetBlockBodies {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.block_hashes.encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self::new(Vec::decode(msg_data)?))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#blockbodies-0x06
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBodies {
    pub block_bodies: Vec<BlockBody>,
}

impl BlockBodies {
    pub fn new(block_bodies: Vec<BlockBody>) -> Self {
        Self { block_bodies }
    }
}

impl RLPxMessage for BlockBodies {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.block_bodies.encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self::new(Vec::decode(msg_data)?))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#newblock-0x07
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub block: Block,
    pub total_difficulty: U256,
}

impl RLPxMessage for NewBlock {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.block)
            .encode_field(&self.total_difficulty)
            .finish();
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (block, decoder) = decoder.decode_field("block")?;
        let (total_difficulty, decoder) = decoder.decode_field("totalDifficulty")?;
        decoder.finish()?;
        Ok(Self {
            block,
            total_difficulty,
        })
    }
}
