//! ECIES as profiled for RLPx handshake messages: secp256k1 ECDH, the
//! NIST concat-KDF, AES-128-CTR for the payload and HMAC-SHA256 over
//! `iv ‖ ciphertext ‖ shared_mac_data` as the authentication tag.

use aes::cipher::{KeyIvInit, StreamCipher};
use ethereum_types::H128;
use k256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use thiserror::Error;

use super::utils::{ecdh_xchng, kdf, sha256, sha256_hmac, sha256_hmac_verify};

type Aes128Ctr64BE = ctr::Ctr64BE<aes::Aes128>;

pub(crate) const PUBLIC_KEY_SIZE: usize = 65;
pub(crate) const IV_SIZE: usize = 16;
pub(crate) const MAC_FOOTER_SIZE: usize = 32;
/// Size the envelope adds on top of the plaintext.
pub(crate) const ECIES_OVERHEAD: usize = PUBLIC_KEY_SIZE + IV_SIZE + MAC_FOOTER_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EciesError {
    #[error("message authentication failed")]
    TagMismatch,
    #[error("malformed ecies envelope")]
    Malformed,
}

/// Encrypts `plaintext` to the holder of `remote_pubkey`.
/// Returns `ephemeral-pubkey (65) ‖ iv (16) ‖ ciphertext ‖ mac (32)`.
/// `shared_mac_data` is authenticated but not transmitted; handshake
/// messages pass their two-byte size prefix here.
pub(crate) fn encrypt_message(
    remote_pubkey: &PublicKey,
    mut plaintext: Vec<u8>,
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let mut rng = rand::thread_rng();

    // Generate a keypair just for this message.
    let message_secret_key = SecretKey::random(&mut rng);
    let message_secret = ecdh_xchng(&message_secret_key, remote_pubkey);

    // Derive the AES and MAC keys from the message secret.
    let mut derived = [0; 32];
    kdf(&message_secret, &mut derived).map_err(|_| EciesError::Malformed)?;
    let aes_key = &derived[..16];
    let mac_key = sha256(&derived[16..]);

    let iv = H128::random_using(&mut rng);
    let mut cipher =
        Aes128Ctr64BE::new_from_slices(aes_key, &iv.0).map_err(|_| EciesError::Malformed)?;
    cipher
        .try_apply_keystream(&mut plaintext)
        .map_err(|_| EciesError::Malformed)?;
    let ciphertext = plaintext;

    let ephemeral_pubkey = message_secret_key.public_key().to_encoded_point(false);
    let mac_footer = sha256_hmac(&mac_key, &[&iv.0, &ciphertext], shared_mac_data)
        .map_err(|_| EciesError::Malformed)?;

    Ok([
        ephemeral_pubkey.as_bytes(),
        &iv.0,
        &ciphertext,
        &mac_footer,
    ]
    .concat())
}

/// Decrypts an envelope produced by [`encrypt_message`].
/// The tag is verified in constant time before any plaintext is returned.
pub(crate) fn decrypt_message(
    static_key: &SecretKey,
    msg: &[u8],
    shared_mac_data: &[u8],
) -> Result<Vec<u8>, EciesError> {
    if msg.len() < ECIES_OVERHEAD {
        return Err(EciesError::Malformed);
    }
    let (pk, rest) = msg.split_at(PUBLIC_KEY_SIZE);
    let (iv, rest) = rest.split_at(IV_SIZE);
    let (ciphertext, mac_footer) = rest.split_at(rest.len() - MAC_FOOTER_SIZE);

    let ephemeral_pubkey = PublicKey::from_sec1_bytes(pk).map_err(|_| EciesError::Malformed)?;
    let message_secret = ecdh_xchng(static_key, &ephemeral_pubkey);

    let mut derived = [0; 32];
    kdf(&message_secret, &mut derived).map_err(|_| EciesError::Malformed)?;
    let aes_key = &derived[..16];
    let mac_key = sha256(&derived[16..]);

    let tag_ok = sha256_hmac_verify(&mac_key, &[iv, ciphertext], shared_mac_data, mac_footer)
        .map_err(|_| EciesError::Malformed)?;
    if !tag_ok {
        return Err(EciesError::TagMismatch);
    }

    let mut cipher =
        Aes128Ctr64BE::new_from_slices(aes_key, iv).map_err(|_| EciesError::Malformed)?;
    let mut plaintext = ciphertext.to_vec();
    cipher
        .try_apply_keystream(&mut plaintext)
        .map_err(|_| EciesError::Malformed)?;
    Ok(plaintext)
}
