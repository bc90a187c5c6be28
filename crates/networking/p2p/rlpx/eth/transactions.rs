use bytes::{BufMut, Bytes};
use ethereum_types::{Address, U256};
use ethernode_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::rlpx::message::RLPxMessage;

/// A legacy transaction as carried by the eth wire protocol.
/// Validation and execution are the chain's business, not the session's;
/// the session only needs a faithful round-trip of the nine fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` for contract creation, encoded as the empty byte string.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl RLPEncode for Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        let to = match self.to {
            Some(address) => Bytes::copy_from_slice(address.as_bytes()),
            None => Bytes::new(),
        };
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.v)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .finish();
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gasPrice")?;
        let (gas_limit, decoder) = decoder.decode_field("gasLimit")?;
        let (to, decoder): (Bytes, _) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (v, decoder) = decoder.decode_field("v")?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;
        let rest = decoder.finish()?;

        let to = match to.len() {
            0 => None,
            20 => Some(Address::from_slice(&to)),
            _ => return Err(RLPDecodeError::InvalidLength),
        };

        let this = Self {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            v,
            r,
            s,
        };
        Ok((this, rest))
    }
}

// https://github.com/ethereum/devp2p/blob/master/caps/eth.md#transactions-0x02
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transactions {
    pub transactions: Vec<Transaction>,
}

impl Transactions {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

impl RLPxMessage for Transactions {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.transactions.encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let transactions = Vec::decode(msg_data)?;
        Ok(Self::new(transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction(to: Option<Address>) -> Transaction {
        Transaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to,
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Bytes::new(),
            v: 37,
            r: U256::from(0x1c8aff95u64),
            s: U256::from(0x6bd1bdu64),
        }
    }

    #[test]
    fn transaction_round_trip() {
        let tx = sample_transaction(Some(Address::from([0x35; 20])));
        let encoded = tx.encode_to_vec();
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn contract_creation_has_empty_to_field() {
        let tx = sample_transaction(None);
        let encoded = tx.encode_to_vec();
        let decoded = Transaction::decode(&encoded).unwrap();
        assert_eq!(decoded.to, None);
    }

    #[test]
    fn transactions_message_round_trip() {
        let message = Transactions::new(vec![
            sample_transaction(Some(Address::from([0x35; 20]))),
            sample_transaction(None),
        ]);

        let mut buf = Vec::new();
        message.encode(&mut buf);
        let decoded = Transactions::decode(&buf).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn empty_transactions_message() {
        let message = Transactions::new(vec![]);
        let mut buf = Vec::new();
        message.encode(&mut buf);
        assert_eq!(buf, vec![0xc0]);
        assert!(Transactions::decode(&buf).unwrap().transactions.is_empty());
    }
}
