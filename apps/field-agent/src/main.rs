//! FleetOps field agent entry point.
//!
//! Resolves the startup session, keeps the live link up and reports
//! positions typed on stdin. Inbound updates are drained from the main
//! loop, the one place callbacks run.

mod commands;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetops_live_connection::credentials::{AUTH_TOKEN_KEY, default_credentials_path};
use fleetops_live_connection::{
    ConnectionManager, Dispatcher, FileCredentialStore, LinkEvent, dispatcher,
};
use fleetops_protocol::frames::OutboundMessage;
use fleetops_session::{
    FileSessionCache, HttpProfileApi, Route, SessionBootstrap, TcpReachability,
};

use commands::Command;
use config::FieldAgentConfig;

/// How often queued link events are handed to the callbacks.
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fleetops=debug")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting FleetOps field agent"
    );

    let cfg = match FieldAgentConfig::load() {
        Ok(c) => {
            info!(device = %c.device_name, endpoint = %c.endpoint, "configuration loaded");
            c
        }
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            FieldAgentConfig::default()
        }
    };

    let credentials_path = cfg
        .credentials_path
        .clone()
        .or_else(default_credentials_path)
        .context("no location for the credentials file")?;
    let credentials = Arc::new(FileCredentialStore::open_or_empty(credentials_path));
    let cache_path = cfg
        .session_cache_path
        .clone()
        .or_else(FileSessionCache::default_path)
        .context("no location for the session cache")?;

    let cache = Arc::new(FileSessionCache::new(cache_path));

    let bootstrap = match HttpProfileApi::new(&cfg.api_base_url) {
        Ok(api) => SessionBootstrap::new(
            credentials.clone(),
            Arc::new(TcpReachability::new(
                cfg.reachability_host.clone(),
                cfg.reachability_port,
            )),
            Arc::new(api),
            cache,
        ),
        Err(e) => {
            warn!(error = %e, "failed to build profile client, checking cached session only");
            SessionBootstrap::offline_only(credentials.clone(), cache)
        }
    };
    let route = bootstrap.resolve().await;
    info!(?route, "session resolved");

    let (delivery, mut dispatcher) = dispatcher::channel();
    register_callbacks(&mut dispatcher);
    let manager = ConnectionManager::new(cfg.link_config(), credentials.clone(), delivery);

    match route {
        Route::AuthenticatedActive { offline } => {
            if offline {
                info!("starting offline, the link will keep retrying");
            }
            manager.connect().await;
        }
        Route::PendingApproval => {
            warn!("account is pending approval, nothing to do until an admin approves it");
            return Ok(());
        }
        Route::Unauthenticated => {
            info!("not signed in, enter `token <value>` to start the live link");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(DISPATCH_INTERVAL);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                dispatcher.dispatch_pending();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if !handle_line(&line, &manager, &credentials).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    manager.shutdown();
    dispatcher.dispatch_pending();
    Ok(())
}

/// Runs one operator command. Returns `false` when the agent should exit.
async fn handle_line(
    line: &str,
    manager: &ConnectionManager,
    credentials: &FileCredentialStore,
) -> bool {
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!("{e}");
            return true;
        }
    };

    match command {
        Command::Location(coordinates) => {
            manager
                .send(OutboundMessage::location(coordinates, chrono::Utc::now()))
                .await;
        }
        Command::Token(token) => {
            if let Err(e) = credentials.write(AUTH_TOKEN_KEY, &token) {
                warn!(error = %e, "failed to store token");
                return true;
            }
            info!("token stored, reconnecting");
            manager.disconnect();
            manager.connect().await;
        }
        Command::Connect => manager.connect().await,
        Command::Disconnect => manager.disconnect(),
        Command::Status => info!(
            state = ?manager.state(),
            attempts = manager.attempt_count(),
            explicitly_closed = manager.is_explicitly_closed(),
            "link status"
        ),
        Command::Quit => return false,
        Command::Empty => {}
    }
    true
}

fn register_callbacks(dispatcher: &mut Dispatcher) {
    dispatcher.on_presence(|users| {
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        info!(count = users.len(), users = ?names, "online users");
    });
    dispatcher.on_shifts(|shifts| {
        info!(count = shifts.len(), "active shifts");
    });
    dispatcher.on_link_event(|event| match event {
        LinkEvent::StateChanged(state) => info!(?state, "link state"),
        LinkEvent::Reconnecting { attempt, delay } => {
            info!(attempt, delay_secs = delay.as_secs(), "link retry scheduled");
        }
        LinkEvent::GaveUp { attempts } => {
            warn!(attempts, "link gave up, enter `connect` to try again");
        }
        _ => {}
    });
}
