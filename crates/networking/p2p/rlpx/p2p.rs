use bytes::BufMut;
use ethereum_types::H512;
use ethernode_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use std::fmt::Display;

use super::message::RLPxMessage;

/// A named subprotocol advertised in `Hello`, e.g. `eth/63`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    P2p,
    Eth,
    Unsupported(String),
}

impl Capability {
    fn name(&self) -> &str {
        match self {
            Capability::P2p => "p2p",
            Capability::Eth => "eth",
            Capability::Unsupported(name) => name,
        }
    }
}

impl RLPEncode for Capability {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.name().encode(buf)
    }
}

impl RLPDecode for Capability {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (name, rest) = String::decode_unfinished(rlp)?;
        let capability = match name.as_str() {
            "p2p" => Capability::P2p,
            "eth" => Capability::Eth,
            _ => Capability::Unsupported(name),
        };
        Ok((capability, rest))
    }
}

#[derive(Debug)]
pub struct HelloMessage {
    pub protocol_version: u8,
    pub client_id: String,
    pub capabilities: Vec<(Capability, u8)>,
    pub listen_port: u16,
    pub node_id: H512,
}

impl HelloMessage {
    pub fn new(
        protocol_version: u8,
        client_id: String,
        capabilities: Vec<(Capability, u8)>,
        listen_port: u16,
        node_id: H512,
    ) -> Self {
        Self {
            protocol_version,
            client_id,
            capabilities,
            listen_port,
            node_id,
        }
    }
}

impl RLPxMessage for HelloMessage {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.protocol_version)
            .encode_field(&self.client_id)
            .encode_field(&self.capabilities)
            .encode_field(&self.listen_port)
            .encode_field(&self.node_id)
            .finish();
    }

    // hello = [protocolVersion: P, clientId: B, capabilities, listenPort: P, nodeId: B_64, ...]
    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (protocol_version, decoder) = decoder.decode_field("protocolVersion")?;
        let (client_id, decoder) = decoder.decode_field("clientId")?;
        // [[cap1, capVersion1], [cap2, capVersion2], ...]
        let (capabilities, decoder) = decoder.decode_field("capabilities")?;
        let (listen_port, decoder) = decoder.decode_field("listenPort")?;
        let (node_id, decoder) = decoder.decode_field("nodeId")?;
        // Implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();

        Ok(Self {
            protocol_version,
            client_id,
            capabilities,
            listen_port,
            node_id,
        })
    }
}

/// The canonical numbered disconnect reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    DisconnectRequested,
    NetworkError,
    ProtocolBreach,
    UselessPeer,
    TooManyPeers,
    AlreadyConnected,
    IncompatibleVersion,
    NullNodeIdentity,
    ClientQuitting,
    UnexpectedIdentity,
    SelfIdentity,
    PingTimeout,
    SubprotocolReason,
}

impl DisconnectReason {
    pub fn code(&self) -> u8 {
        match self {
            DisconnectReason::DisconnectRequested => 0x00,
            DisconnectReason::NetworkError => 0x01,
            DisconnectReason::ProtocolBreach => 0x02,
            DisconnectReason::UselessPeer => 0x03,
            DisconnectReason::TooManyPeers => 0x04,
            DisconnectReason::AlreadyConnected => 0x05,
            DisconnectReason::IncompatibleVersion => 0x06,
            DisconnectReason::NullNodeIdentity => 0x07,
            DisconnectReason::ClientQuitting => 0x08,
            DisconnectReason::UnexpectedIdentity => 0x09,
            DisconnectReason::SelfIdentity => 0x0a,
            DisconnectReason::PingTimeout => 0x0b,
            DisconnectReason::SubprotocolReason => 0x10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let reason = match code {
            0x00 => DisconnectReason::DisconnectRequested,
            0x01 => DisconnectReason::NetworkError,
            0x02 => DisconnectReason::ProtocolBreach,
            0x03 => DisconnectReason::UselessPeer,
            0x04 => DisconnectReason::TooManyPeers,
            0x05 => DisconnectReason::AlreadyConnected,
            0x06 => DisconnectReason::IncompatibleVersion,
            0x07 => DisconnectReason::NullNodeIdentity,
            0x08 => DisconnectReason::ClientQuitting,
            0x09 => DisconnectReason::UnexpectedIdentity,
            0x0a => DisconnectReason::SelfIdentity,
            0x0b => DisconnectReason::PingTimeout,
            0x10 => DisconnectReason::SubprotocolReason,
            _ => return None,
        };
        Some(reason)
    }
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            DisconnectReason::DisconnectRequested => "disconnect requested",
            DisconnectReason::NetworkError => "TCP sub-system error",
            DisconnectReason::ProtocolBreach => "breach of protocol",
            DisconnectReason::UselessPeer => "useless peer",
            DisconnectReason::TooManyPeers => "too many peers",
            DisconnectReason::AlreadyConnected => "already connected",
            DisconnectReason::IncompatibleVersion => "incompatible P2P protocol version",
            DisconnectReason::NullNodeIdentity => "null node identity received",
            DisconnectReason::ClientQuitting => "client quitting",
            DisconnectReason::UnexpectedIdentity => "unexpected identity in handshake",
            DisconnectReason::SelfIdentity => "identity is the same as this node",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::SubprotocolReason => "some other reason specific to a subprotocol",
        };
        message.fmt(f)
    }
}

#[derive(Debug)]
pub struct DisconnectMessage {
    pub reason: Option<DisconnectReason>,
}

impl DisconnectMessage {
    pub fn new(reason: Option<DisconnectReason>) -> Self {
        Self { reason }
    }
}

impl RLPxMessage for DisconnectMessage {
    fn encode(&self, buf: &mut dyn BufMut) {
        // disconnect = [reason] or the empty list when no reason is given
        match self.reason {
            Some(reason) => Encoder::new(buf).encode_field(&reason.code()).finish(),
            None => Vec::<u8>::new().encode(buf),
        }
    }

    // Peers encode the reason in a few ways: a one-element list, a bare
    // byte, or nothing at all. Unknown codes decode as no reason.
    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let code = match msg_data.len() {
            0 => None,
            1 if msg_data[0] < 0x80 => Some(msg_data[0]),
            _ => {
                let decoder = Decoder::new(msg_data)?;
                let (code, _): (Option<u8>, _) = decoder.decode_optional_field();
                code
            }
        };
        Ok(Self::new(code.and_then(DisconnectReason::from_code)))
    }
}

#[derive(Debug)]
pub struct PingMessage {}

impl PingMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PingMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl RLPxMessage for PingMessage {
    fn encode(&self, buf: &mut dyn BufMut) {
        // ping = []
        Vec::<u8>::new().encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        // the payload is an empty list; tolerate extra elements
        let decoder = Decoder::new(msg_data)?;
        let _padding = decoder.finish_unchecked();
        Ok(Self::new())
    }
}

#[derive(Debug)]
pub struct PongMessage {}

impl PongMessage {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PongMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl RLPxMessage for PongMessage {
    fn encode(&self, buf: &mut dyn BufMut) {
        // pong = []
        Vec::<u8>::new().encode(buf);
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let _padding = decoder.finish_unchecked();
        Ok(Self::new())
    }
}
