use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H128, H256, H512, H520, H64, U256};

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

/// Function for encoding a value to RLP.
/// For encoding the value into a buffer directly, use [`RLPEncode::encode`].
pub fn encode<T: RLPEncode>(value: T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl RLPEncode for bool {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }

    #[inline(always)]
    fn length(&self) -> usize {
        1
    }
}

// Unsigned integers encode as their big-endian bytes with leading zeros
// stripped; zero itself is the empty string.
macro_rules! impl_encode_uint {
    ($($t:ty),*) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                match *self {
                    0 => buf.put_u8(RLP_NULL),
                    n @ 1..=0x7f => buf.put_u8(n as u8),
                    n => {
                        let bytes = n.to_be_bytes();
                        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
                        buf.put_u8(RLP_NULL + (bytes.len() - start) as u8);
                        buf.put_slice(&bytes[start..]);
                    }
                }
            }
        })*
    };
}

impl_encode_uint!(u8, u16, u32, u64, usize);

impl RLPEncode for () {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(RLP_NULL);
    }
}

impl RLPEncode for [u8] {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
        } else {
            if self.len() < 56 {
                buf.put_u8(RLP_NULL + self.len() as u8);
            } else {
                let be_len = self.len().to_be_bytes();
                let start = be_len.iter().position(|&b| b != 0).unwrap_or(be_len.len());
                buf.put_u8(0xb7 + (be_len.len() - start) as u8);
                buf.put_slice(&be_len[start..]);
            }
            buf.put_slice(self);
        }
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for &str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let leading_zero_bytes = (self.leading_zeros() / 8) as usize;
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        bytes[leading_zero_bytes..].encode(buf)
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.is_empty() {
            buf.put_u8(RLP_EMPTY_LIST);
        } else {
            let total_len: usize = self.iter().map(|item| item.length()).sum();
            encode_length(total_len, buf);
            for item in self {
                item.encode(buf);
            }
        }
    }
}

pub fn encode_length(total_len: usize, buf: &mut dyn BufMut) {
    if total_len < 56 {
        buf.put_u8(RLP_EMPTY_LIST + total_len as u8);
    } else {
        let be_len = total_len.to_be_bytes();
        let start = be_len.iter().position(|&b| b != 0).unwrap_or(be_len.len());
        buf.put_u8(0xf7 + (be_len.len() - start) as u8);
        buf.put_slice(&be_len[start..]);
    }
}

impl<S: RLPEncode, T: RLPEncode> RLPEncode for (S, T) {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_length(self.0.length() + self.1.length(), buf);
        self.0.encode(buf);
        self.1.encode(buf);
    }
}

impl<S: RLPEncode, T: RLPEncode, U: RLPEncode> RLPEncode for (S, T, U) {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_length(self.0.length() + self.1.length() + self.2.length(), buf);
        self.0.encode(buf);
        self.1.encode(buf);
        self.2.encode(buf);
    }
}

// Hashes and hash-sized values encode as plain byte strings.
macro_rules! impl_encode_hash {
    ($($t:ty),*) => {
        $(impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                self.as_bytes().encode(buf)
            }
        })*
    };
}

impl_encode_hash!(H64, H128, H256, H512, H520, Address);

impl RLPEncode for Bloom {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.0.encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::{encode, RLPEncode};
    use crate::constants::{RLP_EMPTY_LIST, RLP_NULL};
    use ethereum_types::{Address, U256};
    use hex_literal::hex;

    #[test]
    fn encode_booleans() {
        assert_eq!(encode(true), vec![0x01]);
        assert_eq!(encode(false), vec![RLP_NULL]);
    }

    #[test]
    fn encode_unsigned_integers() {
        assert_eq!(encode(0u8), vec![RLP_NULL]);
        assert_eq!(encode(1u16), vec![0x01]);
        assert_eq!(encode(0x7fu32), vec![0x7f]);
        assert_eq!(encode(0x80u64), vec![RLP_NULL + 1, 0x80]);
        assert_eq!(encode(0x0400usize), vec![RLP_NULL + 2, 0x04, 0x00]);
        assert_eq!(encode(0xffffffu64), vec![RLP_NULL + 3, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn encode_byte_strings() {
        // single bytes below 0x80 are their own encoding
        assert_eq!(encode([0x00u8]), vec![0x00]);
        assert_eq!(encode([0x0fu8]), vec![0x0f]);
        assert_eq!(encode([0x04u8, 0x00]), vec![RLP_NULL + 2, 0x04, 0x00]);

        // 56 bytes crosses into the long-string form
        let long = [0xaau8; 56];
        let encoded = encode(long);
        assert_eq!(encoded[0], 0xb8);
        assert_eq!(encoded[1], 56);
        assert_eq!(&encoded[2..], &long[..]);
    }

    #[test]
    fn encode_strings() {
        assert_eq!(encode("dog"), vec![RLP_NULL + 3, b'd', b'o', b'g']);
        assert_eq!(encode(""), vec![RLP_NULL]);
    }

    #[test]
    fn encode_string_lists() {
        assert_eq!(
            encode(vec!["cat", "dog"]),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(encode(Vec::<&str>::new()), vec![RLP_EMPTY_LIST]);
    }

    #[test]
    fn encode_addresses() {
        let address = Address::from(hex!("ef2d6d194084c2de36e0dabfce45d046b37d1106"));
        assert_eq!(
            encode(address),
            hex!("94ef2d6d194084c2de36e0dabfce45d046b37d1106")
        );
    }

    #[test]
    fn encode_u256() {
        assert_eq!(encode(U256::from(1)), vec![0x01]);
        assert_eq!(encode(U256::from(128)), vec![RLP_NULL + 1, 128]);

        let mut expected = vec![RLP_NULL + 32];
        expected.extend([0xff; 32]);
        assert_eq!(encode(U256::max_value()), expected);
    }

    #[test]
    fn encode_tuples() {
        assert_eq!(encode((1u8, 2u8)), vec![RLP_EMPTY_LIST + 2, 0x01, 0x02]);
        assert_eq!(
            encode((1u8, 2u8, 3u8)),
            vec![RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03]
        );
    }
}
