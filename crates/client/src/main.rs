// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use clubwire::{
    listener, LocationCell, LogNotifier, RealtimeClient, RealtimeConfig, Route, SessionContext,
    TokenStore,
};

/// Tail the realtime club event stream.
#[derive(Debug, Parser)]
#[command(name = "clubwire", version)]
struct Cli {
    #[command(flatten)]
    realtime: RealtimeConfig,

    /// Bearer token for the socket.
    #[arg(long, env = "CLUBWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Route to report as the current screen, e.g. `/myclubs/<id>/posts`.
    #[arg(long, default_value = "/")]
    location: String,

    /// Event names to print (repeatable).
    #[arg(long = "event", default_values = ["new_post", "user_joined_club"])]
    events: Vec<String>,

    /// Log format (json or text).
    #[arg(long, env = "CLUBWIRE_LOG_FORMAT", default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(format: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => fmt::fmt().with_env_filter(filter).json().init(),
        _ => fmt::fmt().with_env_filter(filter).init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.token.as_deref().unwrap_or_default().is_empty() {
        warn!("no token given, waiting for shutdown without connecting");
    }

    let tokens = Arc::new(TokenStore::new(cli.token));
    let location = Arc::new(LocationCell::new(Route::parse(&cli.location)));
    let session = SessionContext::new(tokens, location, Arc::new(LogNotifier));
    let client = RealtimeClient::new(cli.realtime, session);

    for event in &cli.events {
        let name = event.clone();
        client.on(event, listener(move |payload| println!("{name}\t{payload}")));
    }

    let mut state_rx = client.watch_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            info!(%state, "realtime state");
        }
    });

    let shutdown = CancellationToken::new();
    let watch = client.spawn_token_watch(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.cancel();
    watch.await?;
    Ok(())
}
