use bytes::BufMut;
use ethernode_rlp::encode::RLPEncode;
use ethernode_rlp::error::RLPDecodeError;
use std::fmt::Display;

use super::error::RLPxError;
use super::eth::blocks::{
    BlockBodies, BlockHeaders, GetBlockBodies, GetBlockHeaders, NewBlock, NewBlockHashes,
};
use super::eth::status::StatusMessage;
use super::eth::transactions::Transactions;
use super::p2p::{DisconnectMessage, DisconnectReason, HelloMessage, PingMessage, PongMessage};

/// A packet record: RLP payload serialization both ways.
pub trait RLPxMessage: Sized {
    fn encode(&self, buf: &mut dyn BufMut);

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError>;
}

/// What the session should do with a packet it just decoded.
#[derive(Debug)]
pub enum PacketAction {
    /// Nothing beyond subscriber delivery.
    Ok,
    /// A `Hello` completed the exchange; the session may go active.
    Activate,
    /// The remote asked to disconnect.
    PeerDisconnect,
    /// We must disconnect with the given reason.
    Disconnect(DisconnectReason),
    /// Reply with another packet.
    Send(Box<Message>),
}

#[derive(Debug)]
pub enum Message {
    Hello(HelloMessage),
    Disconnect(DisconnectMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    Status(StatusMessage),
    NewBlockHashes(NewBlockHashes),
    Transactions(Transactions),
    GetBlockHeaders(GetBlockHeaders),
    BlockHeaders(BlockHeaders),
    GetBlockBodies(GetBlockBodies),
    BlockBodies(BlockBodies),
    NewBlock(NewBlock),
}

impl Message {
    /// Decodes the packet with the given id.
    /// An id outside the registry is reported as [`RLPxError::UnknownPacket`]
    /// so the session can drop the packet without dying.
    pub fn decode(msg_id: u8, msg_data: &[u8]) -> Result<Message, RLPxError> {
        match msg_id {
            0x00 => Ok(Message::Hello(HelloMessage::decode(msg_data)?)),
            0x01 => Ok(Message::Disconnect(DisconnectMessage::decode(msg_data)?)),
            0x02 => Ok(Message::Ping(PingMessage::decode(msg_data)?)),
            0x03 => Ok(Message::Pong(PongMessage::decode(msg_data)?)),
            // Subprotocol ids start past the base protocol's reserved space;
            // the eth capability sits at offset 0x10, so eth Status (offset 0)
            // arrives as 0x10, GetBlockHeaders (offset 3) as 0x13, and so on.
            0x10 => Ok(Message::Status(StatusMessage::decode(msg_data)?)),
            0x11 => Ok(Message::NewBlockHashes(NewBlockHashes::decode(msg_data)?)),
            0x12 => Ok(Message::Transactions(Transactions::decode(msg_data)?)),
            0x13 => Ok(Message::GetBlockHeaders(GetBlockHeaders::decode(msg_data)?)),
            0x14 => Ok(Message::BlockHeaders(BlockHeaders::decode(msg_data)?)),
            0x15 => Ok(Message::GetBlockBodies(GetBlockBodies::decode(msg_data)?)),
            0x16 => Ok(Message::BlockBodies(BlockBodies::decode(msg_data)?)),
            0x17 => Ok(Message::NewBlock(NewBlock::decode(msg_data)?)),
            unknown => Err(RLPxError::UnknownPacket(unknown)),
        }
    }

    pub fn msg_id(&self) -> u8 {
        match self {
            Message::Hello(_) => 0x00,
            Message::Disconnect(_) => 0x01,
            Message::Ping(_) => 0x02,
            Message::Pong(_) => 0x03,
            Message::Status(_) => 0x10,
            Message::NewBlockHashes(_) => 0x11,
            Message::Transactions(_) => 0x12,
            Message::GetBlockHeaders(_) => 0x13,
            Message::BlockHeaders(_) => 0x14,
            Message::GetBlockBodies(_) => 0x15,
            Message::BlockBodies(_) => 0x16,
            Message::NewBlock(_) => 0x17,
        }
    }

    /// Encodes `rlp(msg_id) ‖ payload`, the plaintext of one frame.
    pub fn encode(&self, buf: &mut dyn BufMut) {
        self.msg_id().encode(buf);
        match self {
            Message::Hello(msg) => msg.encode(buf),
            Message::Disconnect(msg) => msg.encode(buf),
            Message::Ping(msg) => msg.encode(buf),
            Message::Pong(msg) => msg.encode(buf),
            Message::Status(msg) => msg.encode(buf),
            Message::NewBlockHashes(msg) => msg.encode(buf),
            Message::Transactions(msg) => msg.encode(buf),
            Message::GetBlockHeaders(msg) => msg.encode(buf),
            Message::BlockHeaders(msg) => msg.encode(buf),
            Message::GetBlockBodies(msg) => msg.encode(buf),
            Message::BlockBodies(msg) => msg.encode(buf),
            Message::NewBlock(msg) => msg.encode(buf),
        }
    }

    /// The base-protocol reaction to an inbound packet. Session policy
    /// (capability checks, chain logic) layers on top of this.
    pub fn handle(&self) -> PacketAction {
        match self {
            Message::Hello(_) => PacketAction::Activate,
            Message::Disconnect(_) => PacketAction::PeerDisconnect,
            Message::Ping(_) => PacketAction::Send(Box::new(Message::Pong(PongMessage::new()))),
            _ => PacketAction::Ok,
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Hello(_) => "p2p:Hello".fmt(f),
            Message::Disconnect(_) => "p2p:Disconnect".fmt(f),
            Message::Ping(_) => "p2p:Ping".fmt(f),
            Message::Pong(_) => "p2p:Pong".fmt(f),
            Message::Status(_) => "eth:Status".fmt(f),
            Message::NewBlockHashes(_) => "eth:NewBlockHashes".fmt(f),
            Message::Transactions(_) => "eth:Transactions".fmt(f),
            Message::GetBlockHeaders(_) => "eth:GetBlockHeaders".fmt(f),
            Message::BlockHeaders(_) => "eth:BlockHeaders".fmt(f),
            Message::GetBlockBodies(_) => "eth:GetBlockBodies".fmt(f),
            Message::BlockBodies(_) => "eth:BlockBodies".fmt(f),
            Message::NewBlock(_) => "eth:NewBlock".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{H256, H512, U256};
    use ethernode_rlp::decode::RLPDecode;

    use crate::rlpx::eth::blocks::HashOrNumber;
    use crate::rlpx::p2p::Capability;

    fn frame_round_trip(message: Message) -> Message {
        let mut plaintext = Vec::new();
        message.encode(&mut plaintext);
        let (msg_id, msg_data) = u8::decode_unfinished(&plaintext).unwrap();
        Message::decode(msg_id, msg_data).unwrap()
    }

    #[test]
    fn hello_message_id_is_zero() {
        let hello = Message::Hello(HelloMessage::new(
            5,
            "ethernode/0.1.0".to_string(),
            vec![(Capability::Eth, 63)],
            30303,
            H512([0x01; 64]),
        ));
        let mut plaintext = Vec::new();
        hello.encode(&mut plaintext);
        // id 0 encodes as the RLP empty string
        assert_eq!(plaintext[0], 0x80);
        assert!(matches!(frame_round_trip(hello), Message::Hello(_)));
    }

    #[test]
    fn eth_messages_use_the_capability_offset() {
        let status = Message::Status(StatusMessage {
            protocol_version: 63,
            network_id: 1,
            total_difficulty: U256::from(17u64),
            best_hash: H256([0x01; 32]),
            genesis: H256([0x02; 32]),
        });
        let mut plaintext = Vec::new();
        status.encode(&mut plaintext);
        assert_eq!(plaintext[0], 0x10);

        let request = Message::GetBlockHeaders(GetBlockHeaders::new(
            HashOrNumber::Number(1),
            10,
            0,
            false,
        ));
        let mut plaintext = Vec::new();
        request.encode(&mut plaintext);
        assert_eq!(plaintext[0], 0x13);
    }

    #[test]
    fn unknown_packet_id_is_reported() {
        let result = Message::decode(0x42, &[0xc0]);
        assert!(matches!(result, Err(RLPxError::UnknownPacket(0x42))));
    }

    #[test]
    fn base_protocol_reactions() {
        assert!(matches!(
            Message::Ping(PingMessage::new()).handle(),
            PacketAction::Send(reply) if matches!(*reply, Message::Pong(_))
        ));
        assert!(matches!(
            Message::Disconnect(DisconnectMessage::new(None)).handle(),
            PacketAction::PeerDisconnect
        ));
        assert!(matches!(
            Message::Pong(PongMessage::new()).handle(),
            PacketAction::Ok
        ));
    }
}
