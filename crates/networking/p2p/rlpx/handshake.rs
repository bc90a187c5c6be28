//! The RLPx v4 key-agreement handshake: `auth` and `ack` messages in the
//! EIP-8 envelope (`u16 size prefix ‖ ECIES ciphertext`, with the prefix
//! authenticated as associated data).

use ethereum_types::{H256, H512, H520};
use ethernode_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use k256::{
    ecdsa::{self, RecoveryId, SigningKey, VerifyingKey},
    PublicKey, SecretKey,
};
use rand::Rng;
use thiserror::Error;

use super::{
    ecies::{self, EciesError, ECIES_OVERHEAD},
    utils::{ecdh_xchng, id2pubkey, pubkey2id},
};

/// `auth-vsn` / `ack-vsn`. Decoders tolerate higher values per EIP-8.
const HANDSHAKE_VERSION: u8 = 4;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("could not decrypt handshake message: {0}")]
    DecryptFailed(#[from] EciesError),
    #[error("malformed handshake message: {0}")]
    BadRlp(#[from] RLPDecodeError),
    #[error("invalid handshake signature")]
    BadSignature,
    #[error("handshake message truncated")]
    ShortRead,
    #[error("handshake protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Encodes an auth message, starting a handshake.
/// Returns the full wrapped bytes (`size ‖ envelope`) ready to transmit.
pub(crate) fn encode_auth_message(
    static_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
    local_ephemeral_key: &SecretKey,
) -> Result<Vec<u8>, HandshakeError> {
    let node_id = pubkey2id(&static_key.public_key());

    // The signature proves possession of the ephemeral key: it signs the
    // static shared secret xored with our nonce.
    let static_shared_secret = ecdh_xchng(static_key, remote_static_pubkey);
    let signature = sign_shared_secret(
        static_shared_secret.into(),
        local_nonce,
        local_ephemeral_key,
    )?;

    let auth = AuthMessage::new(signature, node_id, local_nonce);
    wrap_handshake_message(remote_static_pubkey, auth.encode_to_vec())
}

/// Decodes an incoming auth message and recovers the initiator's ephemeral
/// public key from its signature.
/// `msg` is the ECIES envelope, `size_data` the two-byte prefix.
pub(crate) fn decode_auth_message(
    static_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<(AuthMessage, PublicKey), HandshakeError> {
    let payload = ecies::decrypt_message(static_key, msg, size_data)?;
    let (auth, _padding) = AuthMessage::decode_unfinished(&payload)?;

    let peer_pubkey = id2pubkey(auth.node_id).ok_or_else(|| {
        HandshakeError::ProtocolViolation("initiator public key is not on the curve".to_string())
    })?;
    let static_shared_secret = ecdh_xchng(static_key, &peer_pubkey);
    let remote_ephemeral_key =
        retrieve_remote_ephemeral_key(static_shared_secret.into(), auth.nonce, auth.signature)?;

    Ok((auth, remote_ephemeral_key))
}

/// Encodes an ack message, completing a handshake on the recipient side.
/// Returns the full wrapped bytes (`size ‖ envelope`) ready to transmit.
pub(crate) fn encode_ack_message(
    local_ephemeral_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
) -> Result<Vec<u8>, HandshakeError> {
    let ack = AckMessage::new(pubkey2id(&local_ephemeral_key.public_key()), local_nonce);
    wrap_handshake_message(remote_static_pubkey, ack.encode_to_vec())
}

/// Decodes an incoming ack message.
pub(crate) fn decode_ack_message(
    static_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<AckMessage, HandshakeError> {
    let payload = ecies::decrypt_message(static_key, msg, size_data)?;
    let (ack, _padding) = AckMessage::decode_unfinished(&payload)?;
    Ok(ack)
}

// RLP-pads and ECIES-encrypts a handshake payload, prepending the
// authenticated size prefix.
fn wrap_handshake_message(
    remote_pubkey: &PublicKey,
    mut plaintext: Vec<u8>,
) -> Result<Vec<u8>, HandshakeError> {
    let mut rng = rand::thread_rng();

    // At least 100 bytes of padding are needed to make the message
    // distinguishable from pre-EIP-8 handshakes.
    let padding_length = rng.gen_range(100..=300);
    plaintext.resize(plaintext.len() + padding_length, 0);

    // The size prefix covers the ECIES envelope and is part of the MAC input,
    // so it has to be fixed before encrypting.
    let size: u16 = (plaintext.len() + ECIES_OVERHEAD).try_into().map_err(|_| {
        HandshakeError::ProtocolViolation("handshake message exceeds the u16 envelope".to_string())
    })?;
    let size_prefix = size.to_be_bytes();

    let envelope = ecies::encrypt_message(remote_pubkey, plaintext, &size_prefix)?;
    Ok([&size_prefix[..], &envelope].concat())
}

pub(crate) fn sign_shared_secret(
    shared_secret: H256,
    local_nonce: H256,
    local_ephemeral_key: &SecretKey,
) -> Result<H520, HandshakeError> {
    let prehash = shared_secret ^ local_nonce;
    let (signature, rid) = SigningKey::from(local_ephemeral_key)
        .sign_prehash_recoverable(&prehash.0)
        .map_err(|_| HandshakeError::BadSignature)?;

    let mut signature_bytes = [0; 65];
    signature_bytes[..64].copy_from_slice(signature.to_bytes().as_slice());
    signature_bytes[64] = rid.to_byte();
    Ok(signature_bytes.into())
}

pub(crate) fn retrieve_remote_ephemeral_key(
    shared_secret: H256,
    remote_nonce: H256,
    signature: H520,
) -> Result<PublicKey, HandshakeError> {
    let prehash = shared_secret ^ remote_nonce;
    let sign = ecdsa::Signature::from_slice(&signature[..64])
        .map_err(|_| HandshakeError::BadSignature)?;
    let rid = RecoveryId::from_byte(signature[64]).ok_or(HandshakeError::BadSignature)?;
    let ephemeral_key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sign, rid)
        .map_err(|_| HandshakeError::BadSignature)?;
    Ok(ephemeral_key.into())
}

#[derive(Debug)]
pub(crate) struct AuthMessage {
    /// Signature over `static-shared-secret ^ initiator-nonce` made with the
    /// initiator's ephemeral key.
    pub signature: H520,
    /// The node id of the initiator.
    pub node_id: H512,
    /// The nonce generated by the initiator.
    pub nonce: H256,
    /// `auth-vsn`; 4 for this implementation, higher values are accepted.
    pub version: u8,
}

impl AuthMessage {
    pub fn new(signature: H520, node_id: H512, nonce: H256) -> Self {
        Self {
            signature,
            node_id,
            nonce,
            version: HANDSHAKE_VERSION,
        }
    }
}

impl RLPEncode for AuthMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.signature)
            .encode_field(&self.node_id)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AuthMessage {
    // Any extra list elements are padding from future versions and ignored.
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (signature, decoder) = decoder.decode_field("signature")?;
        let (node_id, decoder) = decoder.decode_field("node_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        let rest = decoder.finish_unchecked();

        let this = Self {
            signature,
            node_id,
            nonce,
            version,
        };
        Ok((this, rest))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AckMessage {
    /// The recipient's ephemeral public key.
    pub ephemeral_pubkey: H512,
    /// The nonce generated by the recipient.
    pub nonce: H256,
    /// `ack-vsn`; 4 for this implementation, higher values are accepted.
    pub version: u8,
}

impl AckMessage {
    pub fn new(ephemeral_pubkey: H512, nonce: H256) -> Self {
        Self {
            ephemeral_pubkey,
            nonce,
            version: HANDSHAKE_VERSION,
        }
    }

    pub fn get_ephemeral_pubkey(&self) -> Option<PublicKey> {
        id2pubkey(self.ephemeral_pubkey)
    }
}

impl RLPEncode for AckMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.ephemeral_pubkey)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AckMessage {
    // Any extra list elements are padding from future versions and ignored.
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (ephemeral_pubkey, decoder) = decoder.decode_field("ephemeral_pubkey")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        let rest = decoder.finish_unchecked();

        let this = Self {
            ephemeral_pubkey,
            nonce,
            version,
        };
        Ok((this, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::str::FromStr;

    #[test]
    fn decode_eip8_ack_vector() {
        // This is the Ack₂ message from EIP-8.
        // https://github.com/ethereum/EIPs/blob/master/EIPS/eip-8.md
        let msg = hex!("01ea0451958701280a56482929d3b0757da8f7fbe5286784beead59d95089c217c9b917788989470b0e330cc6e4fb383c0340ed85fab836ec9fb8a49672712aeabbdfd1e837c1ff4cace34311cd7f4de05d59279e3524ab26ef753a0095637ac88f2b499b9914b5f64e143eae548a1066e14cd2f4bd7f814c4652f11b254f8a2d0191e2f5546fae6055694aed14d906df79ad3b407d94692694e259191cde171ad542fc588fa2b7333313d82a9f887332f1dfc36cea03f831cb9a23fea05b33deb999e85489e645f6aab1872475d488d7bd6c7c120caf28dbfc5d6833888155ed69d34dbdc39c1f299be1057810f34fbe754d021bfca14dc989753d61c413d261934e1a9c67ee060a25eefb54e81a4d14baff922180c395d3f998d70f46f6b58306f969627ae364497e73fc27f6d17ae45a413d322cb8814276be6ddd13b885b201b943213656cde498fa0e9ddc8e0b8f8a53824fbd82254f3e2c17e8eaea009c38b4aa0a3f306e8797db43c25d68e86f262e564086f59a2fc60511c42abfb3057c247a8a8fe4fb3ccbadde17514b7ac8000cdb6a912778426260c47f38919a91f25f4b5ffb455d6aaaf150f7e5529c100ce62d6d92826a71778d809bdf60232ae21ce8a437eca8223f45ac37f6487452ce626f549b3b5fdee26afd2072e4bc75833c2464c805246155289f4");
        let static_key_a = SecretKey::from_slice(&hex!(
            "49a7b37aa6f6645917e7b807e9d1c00d4fa71f18343b0d4122a4d2df64dd6fee"
        ))
        .unwrap();

        let expected_nonce_b =
            H256::from_str("559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd")
                .unwrap();
        let expected_ephemeral_key_b = pubkey2id(
            &SecretKey::from_slice(&hex!(
                "e238eb8e04fee6511ab04c6dd3c89ce097b11f25d584863ac2b6d5b35b1847e4"
            ))
            .unwrap()
            .public_key(),
        );

        let ack = decode_ack_message(&static_key_a, &msg[2..], &msg[..2]).unwrap();

        assert_eq!(ack.ephemeral_pubkey, expected_ephemeral_key_b);
        assert_eq!(ack.nonce, expected_nonce_b);
        assert_eq!(ack.version, 4u8);
    }

    #[test]
    fn auth_message_round_trip() {
        let initiator_key = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let recipient_key = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let ephemeral_key = SecretKey::from_slice(&[0x33; 32]).unwrap();
        let nonce = H256([0x44; 32]);

        let wrapped = encode_auth_message(
            &initiator_key,
            nonce,
            &recipient_key.public_key(),
            &ephemeral_key,
        )
        .unwrap();

        // The prefix matches the envelope length.
        let size = u16::from_be_bytes([wrapped[0], wrapped[1]]) as usize;
        assert_eq!(size, wrapped.len() - 2);

        let (auth, remote_ephemeral) =
            decode_auth_message(&recipient_key, &wrapped[2..], &wrapped[..2]).unwrap();

        assert_eq!(auth.node_id, pubkey2id(&initiator_key.public_key()));
        assert_eq!(auth.nonce, nonce);
        assert_eq!(auth.version, 4);
        assert_eq!(remote_ephemeral, ephemeral_key.public_key());
    }

    #[test]
    fn ack_message_round_trip() {
        let initiator_key = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let ephemeral_key = SecretKey::from_slice(&[0x55; 32]).unwrap();
        let nonce = H256([0x66; 32]);

        let wrapped =
            encode_ack_message(&ephemeral_key, nonce, &initiator_key.public_key()).unwrap();
        let ack = decode_ack_message(&initiator_key, &wrapped[2..], &wrapped[..2]).unwrap();

        assert_eq!(ack.nonce, nonce);
        assert_eq!(
            ack.get_ephemeral_pubkey().unwrap(),
            ephemeral_key.public_key()
        );
    }

    #[test]
    fn tampered_auth_message_is_rejected() {
        let initiator_key = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let recipient_key = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let ephemeral_key = SecretKey::from_slice(&[0x33; 32]).unwrap();

        let mut wrapped = encode_auth_message(
            &initiator_key,
            H256([0x44; 32]),
            &recipient_key.public_key(),
            &ephemeral_key,
        )
        .unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;

        assert!(decode_auth_message(&recipient_key, &wrapped[2..], &wrapped[..2]).is_err());
    }
}
