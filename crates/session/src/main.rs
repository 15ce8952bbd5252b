// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use mailsession::config::SessionConfig;

#[derive(Debug, Parser)]
#[command(name = "mailsession", version, about = "OAuth session lifecycle service for the mail client")]
struct Cli {
    #[command(flatten)]
    config: SessionConfig,

    /// Log format (json or text).
    #[arg(long, env = "MAILSESSION_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes priority.
    #[arg(long, env = "MAILSESSION_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        error!("fatal: failed to install rustls crypto provider");
        std::process::exit(1);
    }

    if let Err(e) = mailsession::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}
