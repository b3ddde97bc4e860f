//! Runs one replicated-log node.
//!
//! With no peers given, the node joins the default localhost cluster on
//! ports 3000-3002:
//!
//! ```bash
//! cargo run --bin node -- 3000
//! cargo run --bin node -- 3001
//! cargo run --bin node -- 3002
//! ```
//!
//! An explicit cluster:
//!
//! ```bash
//! cargo run --bin node -- --listen 0.0.0.0:4000 --advertise http://a:4000 \
//!   --peer http://b:4000,http://c:4000
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use tracing::info;

use replicated_log::config::{
    DEFAULT_CLUSTER_PORTS, DEFAULT_MAX_SUBMIT_BYTES, NodeConfig, Timing,
};
use replicated_log::runtime::spawn_node;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a replicated-log node")]
struct Args {
    /// Port on localhost; without --peer the other default cluster ports become peers
    #[arg(conflicts_with = "listen")]
    port: Option<u16>,

    /// Socket address to bind, e.g. 0.0.0.0:4000
    #[arg(long, value_hint = ValueHint::Hostname)]
    listen: Option<SocketAddr>,

    /// Base URL peers use to reach this node (defaults to http://<listen>)
    #[arg(long, value_hint = ValueHint::Url)]
    advertise: Option<String>,

    /// Comma-separated base URLs of the other nodes
    #[arg(long, value_delimiter = ',', value_hint = ValueHint::Url)]
    peer: Vec<String>,

    #[arg(long, default_value_t = 150)]
    election_min_ms: u64,

    #[arg(long, default_value_t = 300)]
    election_max_ms: u64,

    #[arg(long, default_value_t = 50)]
    heartbeat_ms: u64,

    #[arg(long, default_value_t = 100)]
    rpc_timeout_ms: u64,

    #[arg(long, default_value_t = 500)]
    submit_timeout_ms: u64,

    /// Largest accepted client write body, attachment included
    #[arg(long, default_value_t = DEFAULT_MAX_SUBMIT_BYTES)]
    max_submit_bytes: usize,
}

impl Args {
    fn timing(&self) -> Timing {
        Timing {
            election_timeout_min: Duration::from_millis(self.election_min_ms),
            election_timeout_max: Duration::from_millis(self.election_max_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
        }
    }

    fn into_config(self) -> NodeConfig {
        let timing = self.timing();
        let port = self.port.unwrap_or(DEFAULT_CLUSTER_PORTS[0]);
        let mut config = match self.listen {
            Some(listen) => NodeConfig::new(listen, self.peer),
            None if self.peer.is_empty() => NodeConfig::local_cluster(port),
            None => {
                let mut config = NodeConfig::new(SocketAddr::from(([127, 0, 0, 1], port)), self.peer);
                config.advertise = format!("http://localhost:{port}");
                config
            }
        };
        if let Some(advertise) = self.advertise {
            config.advertise = advertise;
        }
        config
            .with_timing(timing)
            .with_max_submit_bytes(self.max_submit_bytes)
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Args::parse().into_config();
    let node = spawn_node(config).await?;
    info!(node = %node.id(), addr = %node.local_addr(), "press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    node.shutdown().await
}
