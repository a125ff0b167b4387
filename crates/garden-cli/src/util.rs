//! Helpers shared by the commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::Instant;
use tracing::warn;

use garden_core::{
    Config, ConnectionStatus, Session, TransportKind, Wake, WakePolicy, default_config_path,
};

use crate::cli::{Cli, ConnectionArgs};

/// The config file in use: `--config`, `GARDEN_CONFIG`, or the default path.
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_config_path)
}

/// Load the effective configuration.
///
/// File values are overridden by the environment, which is overridden by
/// command-line flags. A missing default file means defaults; a missing
/// explicit file is an error.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli);
    let mut config = if path.exists() {
        Config::load(&path)?
    } else if cli.config.is_some() {
        bail!("Config file not found: {}", path.display());
    } else {
        Config::default()
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    apply_connection_args(&mut config, &cli.connection);
    Ok(config)
}

pub fn apply_connection_args(config: &mut Config, args: &ConnectionArgs) {
    if let Some(backend) = args.transport {
        config.transport.backend = backend;
    }
    if let Some(url) = &args.store_url {
        config.transport.store.url = Some(url.clone());
    }
    if let Some(broker) = &args.broker {
        config.transport.mqtt.broker = Some(broker.clone());
    }
    if let Some(device_id) = &args.device_id {
        config.device_id = device_id.clone();
    }
    if let Some(host) = &args.stream_host {
        config.video.stream_host = Some(host.clone());
    }
}

/// Start a session, or a degraded one showing why the config did not load.
pub async fn open_session(loaded: Result<Config>) -> Session {
    match loaded {
        Ok(config) => Session::start(config).await,
        Err(e) => {
            warn!("Configuration unavailable: {:#}", e);
            Session::degraded(Config::default(), format!("{:#}", e))
        }
    }
}

/// Bring a fresh session up to date for a one-shot command.
///
/// A pull transport needs one fetch. A push transport gets up to `wait` for
/// the broker to deliver the retained status.
pub async fn settle(session: &mut Session, wait: Duration) {
    session.sync(false).await;
    if session.transport_kind() != Some(TransportKind::Push) {
        return;
    }

    let deadline = Instant::now() + wait;
    let policy = WakePolicy::OnUpdate { fallback: wait };
    while session.state().status() != ConnectionStatus::ConnectedWithData {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, session.wait_for_wake(&policy)).await {
            Ok(Wake::Cancelled) | Err(_) => break,
            Ok(_) => session.sync(false).await,
        }
    }
}
