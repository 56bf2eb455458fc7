// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! smeltd: the control-plane process.
//!
//! Exit codes: 0 on clean shutdown, 1 on misconfigured environment or
//! unrecoverable startup error. The `healthcheck` subcommand probes the
//! local health endpoint and exits 0/1, for container runtimes without
//! curl.

use smelt_server::config::Config;
use smelt_server::lifecycle;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Probe the local health endpoint; exits the process directly.
async fn healthcheck(config: &Config) -> i32 {
    let ip = if config.listen_addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        config.listen_addr.ip().to_string()
    };
    let scheme = if config.tls.is_some() { "https" } else { "http" };
    let url = format!("{scheme}://{ip}:{}/healthz", config.listen_addr.port());

    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(_) => return 1,
    };
    match client.get(&url).send().await {
        Ok(response) if response.status().as_u16() == 200 => 0,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            std::process::exit(1);
        }
    };

    if std::env::args().nth(1).as_deref() == Some("healthcheck") {
        std::process::exit(healthcheck(&config).await);
    }

    match lifecycle::run(config).await {
        Ok(()) => {}
        Err(error) => {
            tracing::error!(%error, "fatal startup error");
            eprintln!("fatal: {error}");
            std::process::exit(1);
        }
    }
}
