//! Cache Engine - operator shell
//!
//! Reads commands from stdin, one per line, and answers each with a JSON
//! line on stdout. Configuration comes from `CACHE_*` environment variables.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_engine::shell::{Reply, Shell};
use cache_engine::{CacheConfig, CacheManager};

/// Main entry point for the cache engine shell.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging (stderr)
/// 2. Load configuration from environment variables
/// 3. Start the cache manager and its background tasks
/// 4. Serve stdin commands until `quit`, EOF or Ctrl+C
/// 5. Destroy the manager, flushing persistent storage
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_size={}, default_ttl={}ms, policy={}, storage={:?}",
        config.max_size, config.default_ttl, config.eviction_policy, config.storage_type
    );

    let cache = CacheManager::<serde_json::Value>::start(config).await?;
    let shell = Shell::new(cache.clone());
    info!("Cache engine ready, reading commands from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let (output, quit) = match shell.handle_line(&line).await {
            Reply::Output(output) => (output, false),
            Reply::Quit(output) => (output, true),
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        if quit {
            break;
        }
    }

    cache.destroy().await;
    info!("Cache engine shutdown complete");
    Ok(())
}
