//! Tail the server log from the terminal.
//!
//! Reads the same environment as the web client (`PI_WS_URL`, or
//! `NEXT_PUBLIC_PI_HOST` / `NEXT_PUBLIC_PI_PORT`).
//!
//! ```bash
//! NEXT_PUBLIC_PI_HOST=192.168.1.20 cargo run -p core-service --example log_tail -- 100
//! ```

use std::time::Duration;

use anyhow::Context;
use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{CoreService, LogStreamParams, StreamState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Info),
    )
    .context("installing the log subscriber")?;

    let lines = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u32>())
        .transpose()
        .context("line count must be a number")?;

    let core = CoreService::from_env().context("building the core service")?;
    let params = lines.map(LogStreamParams::new);
    let client = core.log_stream(params)?;

    let mut printed = 0u64;
    loop {
        let snapshot = client.snapshot();
        if snapshot.state == StreamState::Unconfigured {
            anyhow::bail!(snapshot.error.unwrap_or_default());
        }

        for entry in snapshot.entries.iter() {
            if entry.id < printed {
                continue;
            }
            println!(
                "{} [{}] {:>6} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.priority,
                entry.pid,
                entry.message
            );
            printed = entry.id + 1;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }

    client.shutdown().await;
    info!("Log tail stopped");
    Ok(())
}
