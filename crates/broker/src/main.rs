// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fanout::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    setup_logging(&config.log_format, &config.log_level);
    info!(
        tcp = ?config.tcp_addr,
        ws = ?config.ws_addr,
        auth = config.password.as_deref().is_some_and(|p| !p.is_empty()),
        "starting fanout"
    );

    if let Err(e) = fanout::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn setup_logging(format: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if format == "text" {
        builder.init();
    } else {
        builder.json().with_current_span(false).init();
    }
}
