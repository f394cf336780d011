//! Meshchat console demo binary.
//!
//! # Usage
//!
//! ```bash
//! # Two tabs, default limits
//! meshchat
//!
//! # Legacy 1:1 link burning with a 512 KiB file ceiling
//! meshchat --burn-after-first --max-file-size 524288
//! ```

use std::time::Duration;

use clap::Parser;
use meshchat_cli::Runtime;
use meshchat_core::{AdmissionPolicy, SessionConfig};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Meshchat console demo
#[derive(Parser, Debug)]
#[command(name = "meshchat")]
#[command(about = "Ephemeral end-to-end encrypted mesh chat, several tabs in one terminal")]
#[command(version)]
struct Args {
    /// Tabs to open at startup
    #[arg(long, default_value = "2")]
    tabs: usize,

    /// Seconds a joiner waits for the creator's key exchange
    #[arg(long, default_value = "20")]
    join_timeout: u64,

    /// Milliseconds between a remote close (or the last peer leaving) and teardown
    #[arg(long, default_value = "1000")]
    teardown_grace_ms: u64,

    /// Seconds before an unanswered ping is forgotten
    #[arg(long, default_value = "10")]
    ping_timeout: u64,

    /// Largest file, in bytes, a tab sends or accepts
    #[arg(long, default_value = "2097152")]
    max_file_size: usize,

    /// Prefix of the creator's rendezvous identifier
    #[arg(long, default_value = "meshchat")]
    creator_id_prefix: String,

    /// Close entry after the first joiner (legacy 1:1 link burning)
    #[arg(long)]
    burn_after_first: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            join_timeout: Duration::from_secs(self.join_timeout),
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
            ping_timeout: Duration::from_secs(self.ping_timeout),
            max_file_size: self.max_file_size,
            creator_id_prefix: self.creator_id_prefix.clone(),
            admission: if self.burn_after_first {
                AdmissionPolicy::BurnAfterFirst
            } else {
                AdmissionPolicy::EntryGate
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Chat output owns stdout.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.session_config();
    tracing::info!(tabs = args.tabs, ?config, "meshchat starting");

    let mut runtime = Runtime::new(config, args.tabs);
    runtime.run(BufReader::new(tokio::io::stdin())).await?;

    Ok(())
}
