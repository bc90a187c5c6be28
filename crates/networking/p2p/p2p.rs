pub mod config;
pub mod rlpx;
pub mod types;

pub use config::{ChainStatus, NodeConfig};
pub use rlpx::error::RLPxError;
pub use rlpx::message::Message;
pub use rlpx::p2p::{Capability, DisconnectReason};
pub use rlpx::session::{
    dial, initiate, listen, SessionEvent, SessionHandle, SessionStatus, Subscriber,
    SubscriberToken,
};
pub use types::Node;
