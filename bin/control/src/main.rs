#[macro_use]
extern crate tracing;

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};

use crate::{config::control_config, state::ControlRuntime};

mod autoscale;
mod backup;
mod config;
mod routes;
mod state;

async fn autoscale_loop(runtime: &ControlRuntime) -> ! {
  let mut windows = HashMap::new();
  let mut ticker = tokio::time::interval(Duration::from_secs(runtime.config.autoscale_interval_s));
  loop {
    ticker.tick().await;
    autoscale::tick(runtime, &mut windows).await;
  }
}

async fn backup_loop(runtime: &ControlRuntime) -> ! {
  let mut ticker = tokio::time::interval(Duration::from_secs(runtime.config.backup_interval_s));
  loop {
    ticker.tick().await;
    backup::tick(runtime).await;
  }
}

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = control_config();
  logger::init(&config.logging)?;

  info!("Dry Dock Control version: v{}", env!("CARGO_PKG_VERSION"));
  info!("control plane starting on {}:{}", config.bind_ip, config.port);

  let runtime = Arc::new(ControlRuntime::new(config.clone()).await?);

  let app = Router::new()
    .route("/deploy", post(routes::deploy))
    .route("/secrets/rotate", post(routes::rotate_secret))
    .route("/status", get(routes::status))
    .with_state(runtime.clone());

  let addr = format!("{}:{}", config.bind_ip, config.port);
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  info!("Dry Dock Control listening on http://{addr}");

  tokio::select! {
    res = axum::serve(listener, app) => res.map_err(anyhow::Error::from),
    _ = autoscale_loop(&runtime) => unreachable!("autoscale_loop never returns"),
    _ = backup_loop(&runtime) => unreachable!("backup_loop never returns"),
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
