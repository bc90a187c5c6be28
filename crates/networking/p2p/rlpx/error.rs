use ethernode_rlp::error::RLPDecodeError;
use thiserror::Error;

use super::ecies::EciesError;
use super::frame::FrameError;
use super::handshake::HandshakeError;
use super::utils::CryptoError;

#[derive(Debug, Error)]
pub enum RLPxError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("cryptography error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("ecies error: {0}")]
    Ecies(#[from] EciesError),
    #[error("decode error: {0}")]
    Decode(#[from] RLPDecodeError),
    #[error("unknown packet type {0:#04x}")]
    UnknownPacket(u8),
    #[error("invalid connection state")]
    InvalidState,
    #[error("session is closed")]
    SessionClosed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
