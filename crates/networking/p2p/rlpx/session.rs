//! The peer session actor. One spawned task owns the socket, the handshake
//! state, the frame secrets and the subscriber list; everything else talks
//! to it through a command channel. All socket writes happen inside the
//! task, so the egress MAC and CTR streams advance in lock-step with the
//! bytes on the wire.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use ethereum_types::{H256, H512};
use k256::SecretKey;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::types::Node;

use super::error::RLPxError;
use super::frame::Secrets;
use super::handshake::{self, HandshakeError};
use super::message::{Message, PacketAction};
use super::p2p::{DisconnectMessage, DisconnectReason, HelloMessage};
use super::utils::{id2pubkey, pubkey2id};

/// Liveness probe interval.
const PING_INTERVAL: Duration = Duration::from_secs(2);
/// How long a pre-`Hello` application packet waits before retrying.
const DEFERRED_SEND_DELAY: Duration = Duration::from_millis(500);
/// Grace period after writing a `Disconnect` before dropping the socket.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);
/// Command queue depth per session.
const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Auth/ack exchange in progress; only raw handshake bytes move.
    Handshaking,
    /// Secrets derived, our `Hello` sent, the remote's not yet seen.
    FrameReady,
    /// Both sides exchanged `Hello`; application packets flow.
    Active,
    /// Terminal. Nothing is written anymore.
    Closed,
}

/// What subscribers receive: decoded packets in arrival order, then one
/// synthetic disconnect event when the session dies.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Packet(Arc<Message>),
    Disconnected(Option<DisconnectReason>),
}

/// Something that can be given a packet and a peer. Delivery happens on the
/// session task, so implementations must hand the event off (to a channel,
/// a task, ...) instead of doing slow work inline. Returning `false` drops
/// the subscription.
pub trait Subscriber: Send {
    fn deliver(&self, event: &SessionEvent, peer: &Node) -> bool;
}

/// The stock subscriber: an unbounded channel sender. Never blocks the
/// session; the subscription ends when the receiving half is dropped.
impl Subscriber for mpsc::UnboundedSender<(SessionEvent, Node)> {
    fn deliver(&self, event: &SessionEvent, peer: &Node) -> bool {
        self.send((event.clone(), *peer)).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken(u64);

enum SessionCommand {
    SendPacket(Message),
    Subscribe(Box<dyn Subscriber>, oneshot::Sender<SubscriberToken>),
    Unsubscribe(SubscriberToken),
    Close(Option<DisconnectReason>),
}

/// A caller's handle to a running session. All operations enqueue a command
/// for the session task; none of them blocks on socket I/O.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    node: Node,
}

impl SessionHandle {
    /// Enqueues a packet. Returning `Ok` means the session accepted the
    /// command, not that the packet reached the socket.
    pub async fn send_packet(&self, message: Message) -> Result<(), RLPxError> {
        self.commands
            .send(SessionCommand::SendPacket(message))
            .await
            .map_err(|_| RLPxError::SessionClosed)
    }

    pub async fn subscribe(
        &self,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriberToken, RLPxError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Subscribe(subscriber, reply_tx))
            .await
            .map_err(|_| RLPxError::SessionClosed)?;
        reply_rx.await.map_err(|_| RLPxError::SessionClosed)
    }

    pub async fn unsubscribe(&self, token: SubscriberToken) -> Result<(), RLPxError> {
        self.commands
            .send(SessionCommand::Unsubscribe(token))
            .await
            .map_err(|_| RLPxError::SessionClosed)
    }

    /// Asks the session to disconnect. A reason is sent to the peer in a
    /// final `Disconnect` packet when the framed channel is up.
    pub async fn close(&self, reason: Option<DisconnectReason>) -> Result<(), RLPxError> {
        self.commands
            .send(SessionCommand::Close(reason))
            .await
            .map_err(|_| RLPxError::SessionClosed)
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// A watch on the session lifecycle, for callers that want to await
    /// `Active` or `Closed`.
    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// The peer this session was started towards. For inbound sessions the
    /// node id is only known once the peer's auth message arrives.
    pub fn node(&self) -> &Node {
        &self.node
    }
}

/// Dials `node` over TCP and spawns a session as the handshake initiator.
pub async fn dial(
    node: Node,
    config: Arc<NodeConfig>,
    subscribers: Vec<Box<dyn Subscriber>>,
) -> Result<SessionHandle, RLPxError> {
    let stream = TcpStream::connect(node.tcp_address()).await?;
    info!(peer = %short_id(&node.node_id), address = %node.tcp_address(), "connected, starting handshake");
    Ok(initiate(stream, node, config, subscribers))
}

/// Spawns an initiator session over an already-connected stream.
pub fn initiate<S>(
    stream: S,
    node: Node,
    config: Arc<NodeConfig>,
    subscribers: Vec<Box<dyn Subscriber>>,
) -> SessionHandle
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    Session::spawn(stream, node, config, subscribers, Role::Initiator)
}

/// Spawns a responder session for an accepted inbound stream. The peer's
/// identity is learned from its auth message.
pub fn listen<S>(
    stream: S,
    peer_address: SocketAddr,
    config: Arc<NodeConfig>,
    subscribers: Vec<Box<dyn Subscriber>>,
) -> SessionHandle
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let node = Node::new(peer_address.ip(), peer_address.port(), H512::zero());
    Session::spawn(stream, node, config, subscribers, Role::Receiver)
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Initiator,
    Receiver,
}

// Handshake-time state, dropped as soon as the secrets are derived.
enum HandshakeState {
    AwaitingAck {
        local_nonce: H256,
        local_ephemeral_key: SecretKey,
        local_auth: Vec<u8>,
    },
    AwaitingAuth {
        local_nonce: H256,
        local_ephemeral_key: SecretKey,
    },
}

struct Session<S> {
    stream: S,
    node: Node,
    config: Arc<NodeConfig>,
    handshake: Option<HandshakeState>,
    secrets: Option<Secrets>,
    ingress: BytesMut,
    hello_sent: bool,
    active: bool,
    closed: bool,
    close_reason: Option<DisconnectReason>,
    subscribers: Vec<(SubscriberToken, Box<dyn Subscriber>)>,
    next_token: u64,
    commands: mpsc::Receiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
    deferred: VecDeque<Message>,
    defer_deadline: Option<Instant>,
}

impl<S: AsyncRead + AsyncWrite + Send + Unpin + 'static> Session<S> {
    fn spawn(
        stream: S,
        node: Node,
        config: Arc<NodeConfig>,
        subscribers: Vec<Box<dyn Subscriber>>,
        role: Role,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus::Handshaking);

        let subscribers: Vec<_> = subscribers
            .into_iter()
            .enumerate()
            .map(|(i, subscriber)| (SubscriberToken(i as u64), subscriber))
            .collect();
        let next_token = subscribers.len() as u64;

        let session = Session {
            stream,
            node,
            config,
            handshake: None,
            secrets: None,
            ingress: BytesMut::new(),
            hello_sent: false,
            active: false,
            closed: false,
            close_reason: None,
            subscribers,
            next_token,
            commands: command_rx,
            status: status_tx,
            deferred: VecDeque::new(),
            defer_deadline: None,
        };
        tokio::spawn(session.run(role));

        SessionHandle {
            commands: command_tx,
            status: status_rx,
            node,
        }
    }

    async fn run(mut self, role: Role) {
        if let Err(err) = self.run_inner(role).await {
            error!(peer = %self.peer(), %err, "session failed");
        }
        self.shutdown().await;
    }

    async fn run_inner(&mut self, role: Role) -> Result<(), RLPxError> {
        // The rng must not live across an await point.
        let (local_nonce, local_ephemeral_key) = {
            let mut rng = rand::thread_rng();
            (H256::random_using(&mut rng), SecretKey::random(&mut rng))
        };
        match role {
            Role::Initiator => {
                let remote_pubkey = id2pubkey(self.node.node_id).ok_or_else(|| {
                    HandshakeError::ProtocolViolation(
                        "peer public key is not on the curve".to_string(),
                    )
                })?;
                let auth = handshake::encode_auth_message(
                    &self.config.secret_key,
                    local_nonce,
                    &remote_pubkey,
                    &local_ephemeral_key,
                )?;
                self.stream.write_all(&auth).await?;
                debug!(peer = %self.peer(), "auth sent");
                self.handshake = Some(HandshakeState::AwaitingAck {
                    local_nonce,
                    local_ephemeral_key,
                    local_auth: auth,
                });
            }
            Role::Receiver => {
                self.handshake = Some(HandshakeState::AwaitingAuth {
                    local_nonce,
                    local_ephemeral_key,
                });
            }
        }

        let mut ping = time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.closed {
            tokio::select! {
                read = self.stream.read_buf(&mut self.ingress) => match read {
                    Ok(0) => {
                        if self.handshake.is_some() {
                            return Err(HandshakeError::ShortRead.into());
                        }
                        debug!(peer = %self.peer(), "transport closed by peer");
                        break;
                    }
                    Ok(_) => self.process_ingress().await?,
                    Err(err) => return Err(err.into()),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => {
                        debug!(peer = %self.peer(), "all handles dropped, closing");
                        self.begin_close(None, true).await?;
                    }
                },
                _ = ping.tick() => self.on_ping_timer().await?,
                _ = deferred_wait(self.defer_deadline) => self.flush_deferred().await?,
            }
        }
        Ok(())
    }

    // -- receive path ------------------------------------------------------

    async fn process_ingress(&mut self) -> Result<(), RLPxError> {
        if self.handshake.is_some() && !self.try_advance_handshake().await? {
            return Ok(());
        }
        // Leftover bytes after the handshake message are frame bytes.
        while !self.closed {
            let frame = match self.secrets.as_mut() {
                Some(secrets) => secrets.decode_frame(&mut self.ingress)?,
                None => break,
            };
            match frame {
                Some(frame_data) => self.dispatch_frame(&frame_data).await?,
                None => break,
            }
        }
        Ok(())
    }

    /// Tries to parse one wrapped handshake message from the ingress buffer.
    /// Returns false while the message is still incomplete.
    async fn try_advance_handshake(&mut self) -> Result<bool, RLPxError> {
        if self.ingress.len() < 2 {
            return Ok(false);
        }
        let size = u16::from_be_bytes([self.ingress[0], self.ingress[1]]) as usize;
        if self.ingress.len() < size + 2 {
            return Ok(false);
        }
        let wrapped = self.ingress.split_to(size + 2).to_vec();

        match self.handshake.take() {
            Some(HandshakeState::AwaitingAck {
                local_nonce,
                local_ephemeral_key,
                local_auth,
            }) => {
                let ack = handshake::decode_ack_message(
                    &self.config.secret_key,
                    &wrapped[2..],
                    &wrapped[..2],
                )?;
                let remote_ephemeral_key = ack.get_ephemeral_pubkey().ok_or_else(|| {
                    HandshakeError::ProtocolViolation(
                        "ack ephemeral key is not on the curve".to_string(),
                    )
                })?;
                self.secrets = Some(Secrets::for_initiator(
                    local_nonce,
                    &local_ephemeral_key,
                    local_auth,
                    ack.nonce,
                    &remote_ephemeral_key,
                    wrapped,
                ));
            }
            Some(HandshakeState::AwaitingAuth {
                local_nonce,
                local_ephemeral_key,
            }) => {
                let (auth, remote_ephemeral_key) = handshake::decode_auth_message(
                    &self.config.secret_key,
                    &wrapped[2..],
                    &wrapped[..2],
                )?;
                // The auth message is where an inbound peer identifies itself.
                self.node.node_id = auth.node_id;
                let remote_pubkey = id2pubkey(auth.node_id).ok_or_else(|| {
                    HandshakeError::ProtocolViolation(
                        "initiator public key is not on the curve".to_string(),
                    )
                })?;
                let ack = handshake::encode_ack_message(
                    &local_ephemeral_key,
                    local_nonce,
                    &remote_pubkey,
                )?;
                self.stream.write_all(&ack).await?;
                debug!(peer = %self.peer(), "ack sent");
                self.secrets = Some(Secrets::for_receiver(
                    local_nonce,
                    &local_ephemeral_key,
                    ack,
                    auth.nonce,
                    &remote_ephemeral_key,
                    wrapped,
                ));
            }
            None => return Ok(true),
        }

        info!(peer = %self.peer(), "handshake completed");
        self.status.send_replace(SessionStatus::FrameReady);
        self.send_hello().await?;
        Ok(true)
    }

    async fn dispatch_frame(&mut self, frame_data: &[u8]) -> Result<(), RLPxError> {
        let (msg_id, msg_data): (u8, &[u8]) =
            ethernode_rlp::decode::RLPDecode::decode_unfinished(frame_data)
                .map_err(RLPxError::Decode)?;
        let message = match Message::decode(msg_id, msg_data) {
            Ok(message) => message,
            Err(RLPxError::UnknownPacket(id)) => {
                warn!(peer = %self.peer(), id = %format_args!("{id:#04x}"), "unknown packet type, dropping");
                return Ok(());
            }
            Err(err) => {
                warn!(peer = %self.peer(), %err, "undecodable packet, dropping");
                return Ok(());
            }
        };
        debug!(peer = %self.peer(), %message, "received packet");

        let action = message.handle();
        let message = Arc::new(message);
        match action {
            PacketAction::Ok => {}
            PacketAction::Activate => self.on_hello(&message).await?,
            PacketAction::Send(reply) => self.write_message(*reply).await?,
            PacketAction::PeerDisconnect => {
                let reason = match message.as_ref() {
                    Message::Disconnect(disconnect) => disconnect.reason,
                    _ => None,
                };
                info!(peer = %self.peer(), reason = %reason.map(|r| r.to_string()).unwrap_or_else(|| "none".to_string()), "peer disconnected");
                self.begin_close(reason, false).await?;
            }
            PacketAction::Disconnect(reason) => self.begin_close(Some(reason), true).await?,
        }

        self.fan_out(SessionEvent::Packet(message));
        Ok(())
    }

    async fn on_hello(&mut self, message: &Message) -> Result<(), RLPxError> {
        let Message::Hello(hello) = message else {
            return Ok(());
        };
        debug!(peer = %self.peer(), client = %hello.client_id, version = hello.protocol_version, "received hello");

        let compatible = hello
            .capabilities
            .iter()
            .any(|capability| self.config.capabilities.contains(capability));
        if !compatible {
            warn!(peer = %self.peer(), "no matching capabilities, disconnecting");
            return self
                .begin_close(Some(DisconnectReason::UselessPeer), true)
                .await;
        }

        if self.hello_sent && !self.active {
            self.active = true;
            self.status.send_replace(SessionStatus::Active);
            info!(peer = %self.peer(), "session active");
            // Deferred packets no longer have to wait for their timer.
            if !self.deferred.is_empty() {
                self.defer_deadline = Some(Instant::now());
            }
        }
        Ok(())
    }

    // -- send path ---------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) -> Result<(), RLPxError> {
        match command {
            SessionCommand::SendPacket(message) => self.send_packet(message).await,
            SessionCommand::Subscribe(subscriber, reply) => {
                let token = SubscriberToken(self.next_token);
                self.next_token += 1;
                self.subscribers.push((token, subscriber));
                let _ = reply.send(token);
                Ok(())
            }
            SessionCommand::Unsubscribe(token) => {
                self.subscribers.retain(|(t, _)| *t != token);
                Ok(())
            }
            SessionCommand::Close(reason) => self.begin_close(reason, true).await,
        }
    }

    /// The send discipline: drop when closed, defer anything but `Hello`
    /// until both sides have said hello, otherwise frame and write.
    async fn send_packet(&mut self, message: Message) -> Result<(), RLPxError> {
        if self.closed {
            info!(peer = %self.peer(), %message, "session closed, dropping packet");
            return Ok(());
        }
        let is_hello = matches!(message, Message::Hello(_));
        if self.secrets.is_none() || (!self.active && !is_hello) {
            debug!(peer = %self.peer(), %message, "session not active, deferring send");
            self.defer_send(message);
            return Ok(());
        }
        self.write_message(message).await
    }

    fn defer_send(&mut self, message: Message) {
        self.deferred.push_back(message);
        if self.defer_deadline.is_none() {
            self.defer_deadline = Some(Instant::now() + DEFERRED_SEND_DELAY);
        }
    }

    async fn flush_deferred(&mut self) -> Result<(), RLPxError> {
        self.defer_deadline = None;
        if self.closed {
            self.deferred.clear();
            return Ok(());
        }
        // Each packet re-enters the send discipline and re-defers itself if
        // the session still is not active.
        for _ in 0..self.deferred.len() {
            if let Some(message) = self.deferred.pop_front() {
                self.send_packet(message).await?;
            }
        }
        Ok(())
    }

    async fn send_hello(&mut self) -> Result<(), RLPxError> {
        let hello = Message::Hello(HelloMessage::new(
            self.config.p2p_version,
            self.config.client_id.clone(),
            self.config.capabilities.clone(),
            self.config.listen_port,
            pubkey2id(&self.config.secret_key.public_key()),
        ));
        self.write_message(hello).await?;
        self.hello_sent = true;
        Ok(())
    }

    async fn on_ping_timer(&mut self) -> Result<(), RLPxError> {
        // Not active yet (or closing): skip this tick, the interval fires again.
        if self.closed || !self.active {
            return Ok(());
        }
        let status = Message::Status(super::eth::status::StatusMessage::from_config(&self.config));
        debug!(peer = %self.peer(), "liveness probe");
        self.write_message(status).await
    }

    async fn write_message(&mut self, message: Message) -> Result<(), RLPxError> {
        let secrets = self.secrets.as_mut().ok_or(RLPxError::InvalidState)?;
        let mut frame_data = Vec::new();
        message.encode(&mut frame_data);
        let frame = secrets.encode_frame(frame_data);
        self.stream.write_all(&frame).await?;
        debug!(peer = %self.peer(), %message, "sent packet");
        Ok(())
    }

    // -- teardown ----------------------------------------------------------

    /// Starts the terminal transition. Optionally tells the peer why with a
    /// final `Disconnect` packet before the socket goes away.
    async fn begin_close(
        &mut self,
        reason: Option<DisconnectReason>,
        send_disconnect: bool,
    ) -> Result<(), RLPxError> {
        if self.closed {
            return Ok(());
        }
        if send_disconnect && self.secrets.is_some() {
            let disconnect = Message::Disconnect(DisconnectMessage::new(reason));
            if let Err(err) = self.write_message(disconnect).await {
                debug!(peer = %self.peer(), %err, "could not send disconnect");
            }
            time::sleep(SHUTDOWN_GRACE).await;
        }
        self.close_reason = reason;
        self.closed = true;
        self.active = false;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.closed = true;
        self.active = false;
        self.deferred.clear();
        self.defer_deadline = None;
        let _ = self.stream.shutdown().await;
        self.status.send_replace(SessionStatus::Closed);
        self.fan_out(SessionEvent::Disconnected(self.close_reason));
        info!(peer = %self.peer(), "session closed");
    }

    // -- subscribers -------------------------------------------------------

    fn fan_out(&mut self, event: SessionEvent) {
        let node = self.node;
        self.subscribers.retain(|(token, subscriber)| {
            let kept = subscriber.deliver(&event, &node);
            if !kept {
                debug!(peer = %short_id(&node.node_id), ?token, "subscriber gone, dropping");
            }
            kept
        });
    }

    fn peer(&self) -> String {
        short_id(&self.node.node_id)
    }
}

async fn deferred_wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn short_id(node_id: &H512) -> String {
    hex::encode(&node_id.as_bytes()[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainStatus;
    use crate::rlpx::eth::status::StatusMessage;
    use crate::rlpx::p2p::PingMessage;
    use ethereum_types::U256;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn test_config(seed: u8) -> Arc<NodeConfig> {
        let secret_key = SecretKey::from_slice(&[seed; 32]).unwrap();
        let chain = ChainStatus::at_genesis(1, H256([0x0d; 32]), U256::from(17_179_869_184u64));
        Arc::new(NodeConfig::new(secret_key, chain))
    }

    struct Loopback {
        initiator: SessionHandle,
        receiver: SessionHandle,
        initiator_events: UnboundedReceiver<(SessionEvent, Node)>,
        receiver_events: UnboundedReceiver<(SessionEvent, Node)>,
    }

    fn spawn_loopback() -> Loopback {
        let (initiator_io, receiver_io) = tokio::io::duplex(64 * 1024);
        let initiator_config = test_config(0x11);
        let receiver_config = test_config(0x22);

        let (initiator_tx, initiator_events) = unbounded_channel();
        let (receiver_tx, receiver_events) = unbounded_channel();

        let receiver_node = Node::new(
            "127.0.0.1".parse().unwrap(),
            30303,
            receiver_config.node_id(),
        );
        let initiator = initiate(
            initiator_io,
            receiver_node,
            initiator_config,
            vec![Box::new(initiator_tx)],
        );
        let receiver = listen(
            receiver_io,
            "127.0.0.1:54321".parse().unwrap(),
            receiver_config,
            vec![Box::new(receiver_tx)],
        );

        Loopback {
            initiator,
            receiver,
            initiator_events,
            receiver_events,
        }
    }

    async fn wait_for_status(handle: &SessionHandle, wanted: SessionStatus) {
        let mut status = handle.status_watch();
        timeout(TEST_TIMEOUT, status.wait_for(|s| *s == wanted))
            .await
            .expect("timed out waiting for session status")
            .expect("session task dropped its status channel");
    }

    async fn next_packet(events: &mut UnboundedReceiver<(SessionEvent, Node)>) -> Arc<Message> {
        loop {
            let (event, _) = timeout(TEST_TIMEOUT, events.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed");
            if let SessionEvent::Packet(message) = event {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn loopback_handshake_reaches_active() {
        let pair = spawn_loopback();
        wait_for_status(&pair.initiator, SessionStatus::Active).await;
        wait_for_status(&pair.receiver, SessionStatus::Active).await;
    }

    #[tokio::test]
    async fn packet_sent_while_handshaking_arrives_after_hello() {
        let mut pair = spawn_loopback();

        // Enqueue an application packet immediately; the session is still
        // handshaking, so it must be held back until after our Hello.
        let status = Message::Status(StatusMessage {
            protocol_version: 63,
            network_id: 1,
            total_difficulty: U256::from(17u64),
            best_hash: H256([0xbe; 32]),
            genesis: H256([0x0d; 32]),
        });
        pair.initiator.send_packet(status).await.unwrap();

        let first = next_packet(&mut pair.receiver_events).await;
        let second = next_packet(&mut pair.receiver_events).await;
        assert!(
            matches!(first.as_ref(), Message::Hello(_)),
            "expected Hello first, got {first}"
        );
        assert!(
            matches!(second.as_ref(), Message::Status(_)),
            "expected the queued Status second, got {second}"
        );
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let mut pair = spawn_loopback();
        wait_for_status(&pair.initiator, SessionStatus::Active).await;

        pair.initiator
            .send_packet(Message::Ping(PingMessage::new()))
            .await
            .unwrap();

        loop {
            let packet = next_packet(&mut pair.initiator_events).await;
            match packet.as_ref() {
                Message::Pong(_) => break,
                // hellos and liveness probes may interleave
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn disconnect_round_trip() {
        let mut pair = spawn_loopback();
        wait_for_status(&pair.initiator, SessionStatus::Active).await;
        wait_for_status(&pair.receiver, SessionStatus::Active).await;

        pair.receiver
            .close(Some(DisconnectReason::UselessPeer))
            .await
            .unwrap();

        // The initiator reports the disconnect to its subscribers...
        let reason = loop {
            let (event, _) = timeout(TEST_TIMEOUT, pair.initiator_events.recv())
                .await
                .expect("timed out waiting for disconnect")
                .expect("event channel closed");
            if let SessionEvent::Disconnected(reason) = event {
                break reason;
            }
        };
        assert_eq!(reason, Some(DisconnectReason::UselessPeer));

        // ...and reaches the terminal state.
        wait_for_status(&pair.initiator, SessionStatus::Closed).await;
    }

    #[tokio::test]
    async fn sends_on_closed_session_are_rejected() {
        let pair = spawn_loopback();
        wait_for_status(&pair.initiator, SessionStatus::Active).await;

        pair.initiator.close(None).await.unwrap();
        wait_for_status(&pair.initiator, SessionStatus::Closed).await;

        // The session task exits after Closed; once it does, sends fail.
        let failed = timeout(TEST_TIMEOUT, async {
            loop {
                if pair
                    .initiator
                    .send_packet(Message::Ping(PingMessage::new()))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(failed.is_ok(), "sends kept succeeding after close");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        use crate::rlpx::eth::blocks::{GetBlockBodies, GetBlockHeaders, HashOrNumber};

        let mut pair = spawn_loopback();
        wait_for_status(&pair.initiator, SessionStatus::Active).await;

        let (extra_tx, mut extra_events) = unbounded_channel::<(SessionEvent, Node)>();
        let token = pair.receiver.subscribe(Box::new(extra_tx)).await.unwrap();

        pair.initiator
            .send_packet(Message::GetBlockHeaders(GetBlockHeaders::new(
                HashOrNumber::Number(1),
                1,
                0,
                false,
            )))
            .await
            .unwrap();
        loop {
            let packet = next_packet(&mut extra_events).await;
            if matches!(packet.as_ref(), Message::GetBlockHeaders(_)) {
                break;
            }
        }

        pair.receiver.unsubscribe(token).await.unwrap();
        // Commands drain in order, so a subscribe round-trip proves the
        // unsubscribe above has been processed.
        let (fence_tx, _fence_events) = unbounded_channel::<(SessionEvent, Node)>();
        pair.receiver.subscribe(Box::new(fence_tx)).await.unwrap();

        pair.initiator
            .send_packet(Message::GetBlockBodies(GetBlockBodies::new(vec![])))
            .await
            .unwrap();

        // The original subscriber still sees the request...
        loop {
            let packet = next_packet(&mut pair.receiver_events).await;
            if matches!(packet.as_ref(), Message::GetBlockBodies(_)) {
                break;
            }
        }
        // ...while the unsubscribed channel never does.
        while let Ok((event, _)) = extra_events.try_recv() {
            if let SessionEvent::Packet(packet) = event {
                assert!(
                    !matches!(packet.as_ref(), Message::GetBlockBodies(_)),
                    "unsubscribed channel still received packets"
                );
            }
        }
    }

    #[tokio::test]
    async fn receiver_learns_the_initiator_identity() {
        let mut pair = spawn_loopback();
        wait_for_status(&pair.receiver, SessionStatus::Active).await;

        let (_event, node) = timeout(TEST_TIMEOUT, pair.receiver_events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        assert_eq!(node.node_id, test_config(0x11).node_id());
    }
}
