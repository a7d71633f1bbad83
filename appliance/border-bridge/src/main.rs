use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter as TracingLevelFilter;
use tracing_subscriber::FmtSubscriber;

mod boot;
mod cli;
mod config;
mod events;
mod ip;
mod ip_config;
mod mode_store;
mod nd;
mod nd_bridge;
mod netlink;
mod node_table;
mod packet;
mod packet_buffer;
mod serial;
mod timers;
mod wifi;

const DEFAULT_CONFIG_PATH: &str = "/etc/border-bridge.conf";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbosity = args.iter().filter(|a| a.as_str() == "-v").count();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(match verbosity {
            0 => TracingLevelFilter::INFO,
            1 => TracingLevelFilter::DEBUG,
            _ => TracingLevelFilter::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default tracing subscriber");

    let config_path: PathBuf = args
        .into_iter()
        .find(|a| a != "-v")
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned())
        .into();

    if let Err(err) = boot::run(&config_path).await {
        eprintln!("border-bridge: {:#}", err);
        std::process::exit(1);
    }
}
