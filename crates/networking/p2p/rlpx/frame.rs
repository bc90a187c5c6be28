//! RLPx framing. A frame is
//! `header (16) ‖ header-mac (16) ‖ body (padded to 16) ‖ body-mac (16)`,
//! encrypted with AES-256-CTR streams that persist across frames and
//! authenticated by rolling Keccak-256 MAC states. The MAC update order
//! (raw seed for the header, ciphertext for the body, and the two-step
//! ECB-encrypt/XOR per block) must match the remote byte for byte or the
//! session dies on the first frame.

use aes::{
    cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher},
    Aes256Enc,
};
use bytes::{Buf, BytesMut};
use ethereum_types::{H128, H256};
use ethernode_rlp::encode::RLPEncode;
use k256::{PublicKey, SecretKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use super::utils::ecdh_xchng;

pub(crate) type Aes256Ctr64BE = ctr::Ctr64BE<aes::Aes256>;

const HEADER_SIZE: usize = 16;
const MAC_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame mac mismatch")]
    MacMismatch,
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// The symmetric state of an established connection. The sponges and CTR
/// streams advance with every frame and are never reset or rebuilt.
pub struct Secrets {
    mac_key: H256,
    egress_mac: Keccak256,
    ingress_mac: Keccak256,
    egress_aes: Aes256Ctr64BE,
    ingress_aes: Aes256Ctr64BE,
}

impl Secrets {
    /// Derives the session secrets on the side that sent the auth message.
    pub(crate) fn for_initiator(
        local_nonce: H256,
        local_ephemeral_key: &SecretKey,
        local_auth_bytes: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: &PublicKey,
        remote_ack_bytes: Vec<u8>,
    ) -> Self {
        // keccak256(recipient-nonce ‖ initiator-nonce); the remote is the recipient
        let hashed_nonces = Keccak256::digest([remote_nonce.0, local_nonce.0].concat()).into();
        Self::derive(
            local_nonce,
            local_ephemeral_key,
            local_auth_bytes,
            hashed_nonces,
            remote_nonce,
            remote_ephemeral_key,
            remote_ack_bytes,
        )
    }

    /// Derives the session secrets on the side that sent the ack message.
    pub(crate) fn for_receiver(
        local_nonce: H256,
        local_ephemeral_key: &SecretKey,
        local_ack_bytes: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: &PublicKey,
        remote_auth_bytes: Vec<u8>,
    ) -> Self {
        // keccak256(recipient-nonce ‖ initiator-nonce); we are the recipient
        let hashed_nonces = Keccak256::digest([local_nonce.0, remote_nonce.0].concat()).into();
        Self::derive(
            local_nonce,
            local_ephemeral_key,
            local_ack_bytes,
            hashed_nonces,
            remote_nonce,
            remote_ephemeral_key,
            remote_auth_bytes,
        )
    }

    fn derive(
        local_nonce: H256,
        local_ephemeral_key: &SecretKey,
        local_init_message: Vec<u8>,
        hashed_nonces: [u8; 32],
        remote_nonce: H256,
        remote_ephemeral_key: &PublicKey,
        remote_init_message: Vec<u8>,
    ) -> Self {
        let ephemeral_secret = ecdh_xchng(local_ephemeral_key, remote_ephemeral_key);

        // shared-secret = keccak256(ephemeral-key ‖ keccak256(nonce ‖ initiator-nonce))
        let shared_secret: [u8; 32] =
            Keccak256::digest([ephemeral_secret, hashed_nonces].concat()).into();
        // aes-secret = keccak256(ephemeral-key ‖ shared-secret)
        let aes_key = H256(Keccak256::digest([ephemeral_secret, shared_secret].concat()).into());
        // mac-secret = keccak256(ephemeral-key ‖ aes-secret)
        let mac_key = H256(Keccak256::digest([ephemeral_secret, aes_key.0].concat()).into());

        // egress-mac = keccak256.init((mac-secret ^ remote-nonce) ‖ our-sent-message)
        let egress_mac = Keccak256::default()
            .chain_update(mac_key ^ remote_nonce)
            .chain_update(&local_init_message);
        // ingress-mac = keccak256.init((mac-secret ^ our-nonce) ‖ their-message)
        let ingress_mac = Keccak256::default()
            .chain_update(mac_key ^ local_nonce)
            .chain_update(&remote_init_message);

        // Both CTR streams start from a zero IV.
        let ingress_aes = <Aes256Ctr64BE as KeyIvInit>::new(&aes_key.0.into(), &[0; 16].into());
        let egress_aes = ingress_aes.clone();

        Self {
            mac_key,
            egress_mac,
            ingress_mac,
            egress_aes,
            ingress_aes,
        }
    }

    /// Encrypts and authenticates one frame, advancing the egress state.
    pub(crate) fn encode_frame(&mut self, mut frame_data: Vec<u8>) -> Vec<u8> {
        let mac_cipher = Aes256Enc::new(&self.mac_key.0.into());

        // header = frame-size ‖ header-data ‖ padding
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&frame_data.len().to_be_bytes()[5..8]);
        // header-data = [capability-id, context-id], both always zero
        (0_u8, 0_u8).encode(&mut header);
        header.resize(HEADER_SIZE, 0);
        self.egress_aes.apply_keystream(&mut header);

        // header-mac-seed = aes(mac-secret, digest[..16]) ^ header-ciphertext
        let header_seed =
            encrypt_mac_digest(&mac_cipher, &self.egress_mac) ^ H128::from_slice(&header);
        self.egress_mac.update(header_seed);
        let header_mac = mac_digest(&self.egress_mac);

        let mut frame = Vec::with_capacity(
            HEADER_SIZE + MAC_SIZE + frame_data.len().next_multiple_of(16) + MAC_SIZE,
        );
        frame.extend_from_slice(&header);
        frame.extend_from_slice(header_mac.as_bytes());

        frame_data.resize(frame_data.len().next_multiple_of(16), 0);
        self.egress_aes.apply_keystream(&mut frame_data);
        self.egress_mac.update(&frame_data);

        // frame-mac-seed = aes(mac-secret, digest[..16]) ^ digest[..16]
        let frame_seed =
            encrypt_mac_digest(&mac_cipher, &self.egress_mac) ^ mac_digest(&self.egress_mac);
        self.egress_mac.update(frame_seed);
        let frame_mac = mac_digest(&self.egress_mac);

        frame.extend_from_slice(&frame_data);
        frame.extend_from_slice(frame_mac.as_bytes());
        frame
    }

    /// Attempts to decode one frame from the front of `buffer`.
    /// Returns `Ok(None)` while the frame is incomplete; in that case no
    /// ingress state advances (the work happens on cloned state, which is
    /// committed only when a whole frame is consumed). A MAC mismatch is
    /// fatal for the connection.
    pub(crate) fn decode_frame(
        &mut self,
        buffer: &mut BytesMut,
    ) -> Result<Option<Vec<u8>>, FrameError> {
        if buffer.len() < HEADER_SIZE + MAC_SIZE {
            return Ok(None);
        }

        let mac_cipher = Aes256Enc::new(&self.mac_key.0.into());
        let mut ingress_mac = self.ingress_mac.clone();
        let mut ingress_aes = self.ingress_aes.clone();

        let header_ciphertext = H128::from_slice(&buffer[..HEADER_SIZE]);
        let header_seed = encrypt_mac_digest(&mac_cipher, &ingress_mac) ^ header_ciphertext;
        ingress_mac.update(header_seed);
        let expected_header_mac = mac_digest(&ingress_mac);
        if !constant_time_eq(
            expected_header_mac.as_bytes(),
            &buffer[HEADER_SIZE..HEADER_SIZE + MAC_SIZE],
        ) {
            return Err(FrameError::MacMismatch);
        }

        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(&buffer[..HEADER_SIZE]);
        ingress_aes.apply_keystream(&mut header);

        let frame_size = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        if frame_size == 0 {
            return Err(FrameError::Malformed("empty frame".to_string()));
        }
        let padded_size = frame_size.next_multiple_of(16);
        let total_size = HEADER_SIZE + MAC_SIZE + padded_size + MAC_SIZE;
        if buffer.len() < total_size {
            return Ok(None);
        }

        let body_start = HEADER_SIZE + MAC_SIZE;
        let frame_ciphertext = &buffer[body_start..body_start + padded_size];
        ingress_mac.update(frame_ciphertext);
        let frame_seed = encrypt_mac_digest(&mac_cipher, &ingress_mac) ^ mac_digest(&ingress_mac);
        ingress_mac.update(frame_seed);
        let expected_frame_mac = mac_digest(&ingress_mac);
        if !constant_time_eq(
            expected_frame_mac.as_bytes(),
            &buffer[body_start + padded_size..total_size],
        ) {
            return Err(FrameError::MacMismatch);
        }

        let mut frame_data = frame_ciphertext.to_vec();
        ingress_aes.apply_keystream(&mut frame_data);
        frame_data.truncate(frame_size);

        // The whole frame checked out: commit the advanced state.
        self.ingress_mac = ingress_mac;
        self.ingress_aes = ingress_aes;
        buffer.advance(total_size);

        Ok(Some(frame_data))
    }

    #[cfg(test)]
    pub(crate) fn egress_mac_digest(&self) -> H128 {
        mac_digest(&self.egress_mac)
    }

    #[cfg(test)]
    pub(crate) fn ingress_mac_digest(&self) -> H128 {
        mac_digest(&self.ingress_mac)
    }
}

fn mac_digest(mac: &Keccak256) -> H128 {
    H128::from_slice(&mac.clone().finalize()[..MAC_SIZE])
}

// aes(mac-secret, keccak256.digest(mac)[..16])
fn encrypt_mac_digest(mac_cipher: &Aes256Enc, mac: &Keccak256) -> H128 {
    let mut block = mac_digest(mac).0.into();
    mac_cipher.encrypt_block(&mut block);
    H128(block.into())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
