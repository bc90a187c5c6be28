use clap::{Arg, ArgAction, Command};
use tracing::Level;

// Mainnet genesis, the default chain advertisement.
const MAINNET_GENESIS: &str = "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3";

pub fn cli() -> Command {
    Command::new("ethernode")
        .about("DevP2P/RLPx peer session client")
        .arg(
            Arg::new("peer")
                .long("peer")
                .required(true)
                .value_name("ENODE_URL")
                .help("Peer to dial, as enode://<node-id>@<host>:<port>")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("nodekey")
                .long("nodekey")
                .value_name("HEX")
                .help("Static private key as 64 hex chars; generated when omitted")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("network-id")
                .long("network-id")
                .default_value("1")
                .value_name("ID")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("genesis")
                .long("genesis")
                .default_value(MAINNET_GENESIS)
                .value_name("HASH")
                .help("Genesis block hash advertised in eth Status")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("listen-port")
                .long("listen-port")
                .default_value("30303")
                .value_name("PORT")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value(Level::INFO.as_str())
                .value_name("LOG_LEVEL")
                .action(ArgAction::Set),
        )
}
