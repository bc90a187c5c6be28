use ethereum_types::H512;
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    EncodedPoint, PublicKey, SecretKey,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid secp256k1 point")]
    InvalidPoint,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid input length")]
    InvalidLength,
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    use k256::sha2::Digest;
    k256::sha2::Sha256::digest(data).into()
}

pub fn sha256_hmac(key: &[u8], inputs: &[&[u8]], auth_data: &[u8]) -> Result<[u8; 32], CryptoError> {
    use hmac::Mac;
    use k256::sha2::Sha256;

    let mut hasher =
        hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::InvalidLength)?;
    for input in inputs {
        hasher.update(input);
    }
    hasher.update(auth_data);
    Ok(hasher.finalize().into_bytes().into())
}

/// Constant-time HMAC-SHA256 verification of `tag` over `inputs ‖ auth_data`.
pub fn sha256_hmac_verify(
    key: &[u8],
    inputs: &[&[u8]],
    auth_data: &[u8],
    tag: &[u8],
) -> Result<bool, CryptoError> {
    use hmac::Mac;
    use k256::sha2::Sha256;

    let mut hasher =
        hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::InvalidLength)?;
    for input in inputs {
        hasher.update(input);
    }
    hasher.update(auth_data);
    Ok(hasher.verify_slice(tag).is_ok())
}

pub fn ecdh_xchng(secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32] {
    let shared = k256::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), public_key.as_affine());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&shared.raw_secret_bytes()[..32]);
    secret
}

pub fn kdf(secret: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
    // The `other_info` field is unused.
    concat_kdf::derive_key_into::<k256::sha2::Sha256>(secret, &[], output)
        .map_err(|_| CryptoError::InvalidLength)
}

/// Computes a node id from a public key.
/// The node id is the uncompressed public key with the leading `0x04` omitted.
pub fn pubkey2id(pk: &PublicKey) -> H512 {
    let encoded = pk.to_encoded_point(false);
    H512::from_slice(&encoded.as_bytes()[1..])
}

/// Computes a public key from a node id, rejecting points not on the curve.
pub fn id2pubkey(id: H512) -> Option<PublicKey> {
    let point = EncodedPoint::from_untagged_bytes(&id.0.into());
    PublicKey::from_encoded_point(&point).into_option()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn ecdh_xchng_is_symmetric() {
        let a_sk = SecretKey::random(&mut OsRng);
        let b_sk = SecretKey::random(&mut OsRng);

        // a * (b * G) = b * (a * G)
        let a_sk_b_pk = ecdh_xchng(&a_sk, &b_sk.public_key());
        let b_sk_a_pk = ecdh_xchng(&b_sk, &a_sk.public_key());
        assert_eq!(a_sk_b_pk, b_sk_a_pk);
    }

    #[test]
    fn id_pubkey_round_trip() {
        let sk = SecretKey::random(&mut OsRng);
        let pk = sk.public_key();
        let id = pubkey2id(&pk);
        let recovered = id2pubkey(id).unwrap();
        assert_eq!(pk, recovered);
    }

    #[test]
    fn id2pubkey_rejects_off_curve_points() {
        assert!(id2pubkey(H512::zero()).is_none());
    }

    #[test]
    fn hmac_verify_detects_tampering() {
        let key = [0x0b; 16];
        let tag = sha256_hmac(&key, &[b"some", b"data"], b"ad").unwrap();
        assert!(sha256_hmac_verify(&key, &[b"some", b"data"], b"ad", &tag).unwrap());
        assert!(!sha256_hmac_verify(&key, &[b"some", b"data"], b"xx", &tag).unwrap());

        let mut bad_tag = tag;
        bad_tag[0] ^= 0x01;
        assert!(!sha256_hmac_verify(&key, &[b"some", b"data"], b"ad", &bad_tag).unwrap());
    }
}
