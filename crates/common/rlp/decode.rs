use bytes::{Bytes, BytesMut};
use ethereum_types::{Bloom, H128, H160, H256, H512, H520, H64, U256};

use super::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};

/// Trait for decoding RLP encoded slices of data.
/// See <https://ethereum.org/en/developers/docs/data-structures-and-encoding/rlp/#rlp-decoding>.
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which returns the decoded value along with the bytes remaining after it;
/// consumers normally call [`decode`](RLPDecode::decode), which requires the
/// input to be fully consumed.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

impl RLPDecode for bool {
    #[inline(always)]
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let value = match buf.first() {
            Some(&RLP_NULL) => false,
            Some(0x01) => true,
            Some(_) => return Err(RLPDecodeError::MalformedBoolean),
            None => return Err(RLPDecodeError::InvalidLength),
        };
        Ok((value, &buf[1..]))
    }
}

macro_rules! impl_decode_uint {
    ($($t:ty),*) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (bytes, rest) = decode_bytes(rlp)?;
                let padded = static_left_pad(bytes)?;
                Ok((<$t>::from_be_bytes(padded), rest))
            }
        })*
    };
}

impl_decode_uint!(u8, u16, u32, u64, usize);

// A fixed-size array is a byte string of exactly that length, never a list.
impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = bytes.try_into().map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl RLPDecode for BytesMut {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((BytesMut::from(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

macro_rules! impl_decode_hash {
    ($($t:ident),*) => {
        $(impl RLPDecode for $t {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (value, rest) = RLPDecode::decode_unfinished(rlp)?;
                Ok(($t(value), rest))
            }
        })*
    };
}

impl_decode_hash!(H64, H128, H160, H256, H512, H520, Bloom);

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded: [u8; 32] = static_left_pad(bytes)?;
        Ok((U256::from_big_endian(&padded), rest))
    }
}

// A Vec<T> is a list of elements of the same type. To decode a slice of
// bytes, use the [u8; N] implementation or similar (Bytes, BytesMut).
impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        if rlp.first() == Some(&RLP_EMPTY_LIST) {
            return Ok((Vec::new(), &rlp[1..]));
        }

        let (is_list, mut payload, input_rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::MalformedData);
        }

        let mut result = Vec::new();
        while !payload.is_empty() {
            let (item, rest) = T::decode_unfinished(payload)?;
            result.push(item);
            payload = rest;
        }
        Ok((result, input_rest))
    }
}

impl<T1: RLPDecode, T2: RLPDecode> RLPDecode for (T1, T2) {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, input_rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::MalformedData);
        }
        let (first, payload) = T1::decode_unfinished(payload)?;
        let (second, payload) = T2::decode_unfinished(payload)?;
        if !payload.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(((first, second), input_rest))
    }
}

impl<T1: RLPDecode, T2: RLPDecode, T3: RLPDecode> RLPDecode for (T1, T2, T3) {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, input_rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::MalformedData);
        }
        let (first, payload) = T1::decode_unfinished(payload)?;
        let (second, payload) = T2::decode_unfinished(payload)?;
        let (third, payload) = T3::decode_unfinished(payload)?;
        if !payload.is_empty() {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok(((first, second, third), input_rest))
    }
}

/// Splits off the first RLP item of `data`.
/// Returns whether the item is a list, the item's payload (without its
/// prefix), and the remaining bytes after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first_byte = *data.first().ok_or(RLPDecodeError::InvalidLength)?;

    let (is_list, payload_start, payload_len) = match first_byte {
        0..=0x7f => (false, 0, 1),
        0x80..=0xb7 => (false, 1, (first_byte - 0x80) as usize),
        0xb8..=0xbf => {
            let len_len = (first_byte - 0xb7) as usize;
            (false, 1 + len_len, long_length(data, len_len)?)
        }
        RLP_EMPTY_LIST..=0xf7 => (true, 1, (first_byte - RLP_EMPTY_LIST) as usize),
        0xf8..=0xff => {
            let len_len = (first_byte - 0xf7) as usize;
            (true, 1 + len_len, long_length(data, len_len)?)
        }
    };

    let payload_end = payload_start
        .checked_add(payload_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if data.len() < payload_end {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok((is_list, &data[payload_start..payload_end], &data[payload_end..]))
}

/// Splits off the first RLP item of `data`, keeping its prefix.
/// Returns the whole encoded item and the remaining bytes after it.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, _, rest) = decode_rlp_item(data)?;
    let consumed = data.len() - rest.len();
    Ok((&data[..consumed], rest))
}

// Reads the big-endian payload length that follows a long-form prefix.
fn long_length(data: &[u8], len_len: usize) -> Result<usize, RLPDecodeError> {
    let length_bytes = data
        .get(1..1 + len_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    Ok(usize::from_be_bytes(static_left_pad(length_bytes)?))
}

/// Decodes the payload of a byte-string item.
/// Returns the payload and the remaining bytes after the item.
fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Left-pads a big-endian byte slice with zeros to a fixed-size array.
/// Rejects leading zeros, which are non-canonical in RLP integers.
#[inline]
pub(crate) fn static_left_pad<const N: usize>(data: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    let mut result = [0; N];
    if data.is_empty() {
        return Ok(result);
    }
    if data[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }
    let start = N.checked_sub(data.len()).ok_or(RLPDecodeError::InvalidLength)?;
    result[start..].copy_from_slice(data);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_unsigned_integers() {
        assert_eq!(u8::decode(&[0x01]).unwrap(), 1);
        assert_eq!(u8::decode(&[RLP_NULL]).unwrap(), 0);
        assert_eq!(u8::decode(&[0x7f]).unwrap(), 127);
        assert_eq!(u8::decode(&[RLP_NULL + 1, 0xff]).unwrap(), 255);
        assert_eq!(u16::decode(&[RLP_NULL + 2, 0x01, 0x00]).unwrap(), 256);
        assert_eq!(u32::decode(&[0x83, 0x01, 0x00, 0x00]).unwrap(), 65536);
    }

    #[test]
    fn reject_non_canonical_integers() {
        // leading zero bytes are not canonical
        assert!(u16::decode(&[RLP_NULL + 2, 0x00, 0x01]).is_err());
        // value too wide for the target type
        assert!(u8::decode(&[RLP_NULL + 2, 0x01, 0x00]).is_err());
    }

    #[test]
    fn decode_fixed_length_arrays() {
        assert_eq!(<[u8; 1]>::decode(&[0x0f]).unwrap(), [0x0f]);
        assert_eq!(
            <[u8; 3]>::decode(&[RLP_NULL + 3, 0x02, 0x03, 0x04]).unwrap(),
            [0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn decode_strings() {
        assert_eq!(
            String::decode(&[RLP_NULL + 3, b'd', b'o', b'g']).unwrap(),
            "dog"
        );
        assert_eq!(String::decode(&[RLP_NULL]).unwrap(), "");
    }

    #[test]
    fn decode_u256() {
        assert_eq!(U256::decode(&[RLP_NULL + 1, 0x01]).unwrap(), U256::from(1));

        let mut rlp = vec![RLP_NULL + 32];
        rlp.extend([0x01; 32]);
        assert_eq!(
            U256::decode(&rlp).unwrap(),
            U256::from_big_endian(&[0x01; 32])
        );
    }

    #[test]
    fn decode_lists() {
        let empty: Vec<String> = Vec::decode(&[RLP_EMPTY_LIST]).unwrap();
        assert!(empty.is_empty());

        let nums: Vec<u8> = Vec::decode(&[RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(nums, vec![1, 2, 3]);

        let strs: Vec<String> =
            Vec::decode(&[0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']).unwrap();
        assert_eq!(strs, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn decode_nested_lists() {
        let rlp = [
            RLP_EMPTY_LIST + 6,
            RLP_EMPTY_LIST + 2,
            0x01,
            0x02,
            RLP_EMPTY_LIST + 2,
            0x03,
            0x04,
        ];
        let decoded: Vec<Vec<u8>> = Vec::decode(&rlp).unwrap();
        assert_eq!(decoded, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn decode_tuples() {
        let rlp = [RLP_EMPTY_LIST + 2, 0x01, 0x02];
        assert_eq!(<(u8, u8)>::decode(&rlp).unwrap(), (1, 2));

        let rlp = [RLP_EMPTY_LIST + 5, 0x01, 0x83, b'c', b'a', b't'];
        assert_eq!(<(u8, String)>::decode(&rlp).unwrap(), (1, "cat".to_string()));

        let rlp = [RLP_EMPTY_LIST + 3, 0x01, 0x02, 0x03];
        assert_eq!(<(u8, u8, u8)>::decode(&rlp).unwrap(), (1, 2, 3));
    }

    #[test]
    fn reject_list_as_string() {
        // [1, 2, 3, 4] != 0x01020304
        let rlp = [RLP_EMPTY_LIST + 4, 0x01, 0x02, 0x03, 0x04];
        assert!(<[u8; 4]>::decode(&rlp).is_err());
        assert!(u16::decode(&[RLP_EMPTY_LIST + 2, 0x01, 0x02]).is_err());
    }

    #[test]
    fn split_item_with_prefix() {
        let data = [0x83, b'c', b'a', b't', 0x01, 0x02];
        let (item, rest) = get_item_with_prefix(&data).unwrap();
        assert_eq!(item, &[0x83, b'c', b'a', b't']);
        assert_eq!(rest, &[0x01, 0x02]);
    }

    #[test]
    fn reject_truncated_items() {
        assert!(decode_rlp_item(&[]).is_err());
        assert!(decode_rlp_item(&[0x83, b'c', b'a']).is_err());
        assert!(decode_rlp_item(&[0xb8, 0x04, 0x01]).is_err());
    }
}
