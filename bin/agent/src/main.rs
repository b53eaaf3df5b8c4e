#[macro_use]
extern crate tracing;

use std::sync::Arc;

use axum::{
  Router,
  middleware,
  routing::{get, post},
};

use crate::config::agent_config;

mod auth;
mod config;
mod health;
mod routes;
mod state;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = agent_config();
  logger::init(&config.logging)?;

  info!("Dry Dock Agent version: v{}", env!("CARGO_PKG_VERSION"));
  info!(tenant = %config.tenant, project = %config.project, env = %config.env, "agent starting");

  let runtime = Arc::new(state::AgentRuntime::new(config.clone()).await?);

  let app = Router::new()
    .route("/health", get(routes::get_health))
    .route("/restart", post(routes::restart_container))
    .route("/deploy", post(routes::deploy))
    .route("/reload_sidecar", post(routes::reload_sidecar))
    .layer(middleware::from_fn_with_state(runtime.clone(), auth::require_shared_secret))
    .with_state(runtime.clone());

  let addr = format!("{}:{}", config.bind_ip, config.port);
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  info!("Dry Dock Agent listening on http://{addr}");

  let provisioner = runtime.provisioner();
  let monitor_ctx = monitor::MonitorCtx {
    provider: runtime.provider.as_ref(),
    provisioner: &provisioner,
    self_private_ip: config.private_ip,
    agent_port: config.port,
    shared_secret: config.shared_secret.clone(),
    tick_interval: std::time::Duration::from_secs(config.monitor_tick_interval_s),
    heartbeat_interval: std::time::Duration::from_secs(config.heartbeat_interval_s),
  };

  tokio::select! {
    res = axum::serve(listener, app) => res.map_err(anyhow::Error::from),
    _ = monitor::run(&monitor_ctx, &config.tenant, &config.project, &config.env) => unreachable!("monitor::run never returns"),
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    res = app() => res,
    _ = term_signal.recv() => Ok(()),
  }
}
