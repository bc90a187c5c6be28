use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use ethereum_types::{H256, U256};
use ethernode_p2p::{dial, ChainStatus, DisconnectReason, Node, NodeConfig, SessionEvent};
use k256::SecretKey;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

// Difficulty of the mainnet genesis block (0x400000000).
const GENESIS_DIFFICULTY: u64 = 17_179_869_184;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .expect("log-level has a default value");
    let log_filter = EnvFilter::builder()
        .with_default_directive(
            Directive::from_str(log_level).expect("unsupported log level provided"),
        )
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let peer = match matches
        .get_one::<String>("peer")
        .expect("peer is required")
        .parse::<Node>()
    {
        Ok(node) => node,
        Err(err) => {
            error!(%err, "invalid --peer value");
            return ExitCode::FAILURE;
        }
    };

    let secret_key = match matches.get_one::<String>("nodekey") {
        Some(hex_key) => {
            let bytes = match hex::decode(hex_key.trim_start_matches("0x")) {
                Ok(bytes) => bytes,
                Err(err) => {
                    error!(%err, "invalid --nodekey value");
                    return ExitCode::FAILURE;
                }
            };
            match SecretKey::from_slice(&bytes) {
                Ok(key) => key,
                Err(err) => {
                    error!(%err, "invalid --nodekey value");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => SecretKey::random(&mut rand::rngs::OsRng),
    };

    let network_id: u64 = matches
        .get_one::<String>("network-id")
        .expect("network-id has a default value")
        .parse()
        .expect("network id must be a number");
    let genesis_hash = H256::from_str(
        matches
            .get_one::<String>("genesis")
            .expect("genesis has a default value")
            .trim_start_matches("0x"),
    )
    .expect("genesis must be a 32-byte hex hash");
    let listen_port: u16 = matches
        .get_one::<String>("listen-port")
        .expect("listen-port has a default value")
        .parse()
        .expect("listen port must fit in u16");

    let chain = ChainStatus::at_genesis(network_id, genesis_hash, U256::from(GENESIS_DIFFICULTY));
    let mut config = NodeConfig::new(secret_key, chain);
    config.listen_port = listen_port;
    info!(node_id = %config.node_id(), "local identity ready");

    let (events_tx, mut events) = mpsc::unbounded_channel::<(SessionEvent, Node)>();
    let session = match dial(peer, Arc::new(config), vec![Box::new(events_tx)]).await {
        Ok(session) => session,
        Err(err) => {
            error!(%err, peer = %peer.enode_url(), "could not dial peer");
            return ExitCode::FAILURE;
        }
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some((SessionEvent::Packet(message), _)) => {
                    info!(%message, "packet received");
                }
                Some((SessionEvent::Disconnected(reason), _)) => {
                    match reason {
                        Some(reason) => info!(%reason, "session ended"),
                        None => info!("session ended"),
                    }
                    return ExitCode::SUCCESS;
                }
                None => return ExitCode::SUCCESS,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing session");
                let _ = session.close(Some(DisconnectReason::ClientQuitting)).await;
            }
        }
    }
}
