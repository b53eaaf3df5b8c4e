use std::time::Duration;

use drydock_client::entities::{
  error::{DeployError, HealthGateFailureReason},
  service::ServiceKind,
  tuple::Tuple,
};
use executor::{Executor, RemoteExecutor};

/// `spec.md` §4.G step 5: up to `kind.health_timeout_s()` of probing.
/// HTTP services need 2xx/3xx on the configured path; TCP (stateful,
/// non-HTTP) services need a successful connect; workers just need to
/// still be `running` after a 10s dwell with no restart.
pub async fn health_gate(
  executor: &Executor,
  host: &str,
  tuple: &Tuple,
  container_name: &str,
  host_port: Option<u16>,
  kind: &ServiceKind,
) -> Result<(), DeployError> {
  let timeout = Duration::from_secs(kind.health_timeout_s() as u64);
  let deadline = tokio::time::Instant::now() + timeout;

  loop {
    if tokio::time::Instant::now() >= deadline {
      return Err(DeployError::HealthGate {
        tuple: tuple.clone(),
        host: host.to_string(),
        reason: HealthGateFailureReason::TimedOut,
      });
    }

    let running = container_is_running(executor, host, container_name).await;
    if !running {
      return Err(DeployError::HealthGate {
        tuple: tuple.clone(),
        host: host.to_string(),
        reason: HealthGateFailureReason::Crash,
      });
    }

    match kind {
      ServiceKind::Web { health_path, .. } => {
        let Some(port) = host_port.or_else(|| kind.container_port()) else {
          return Ok(());
        };
        if probe_http(host, port, health_path).await {
          return Ok(());
        }
      }
      ServiceKind::StatefulDb { .. } | ServiceKind::StatefulCache { .. } | ServiceKind::StatefulSearch { .. } => {
        let Some(port) = host_port.or_else(|| kind.container_port()) else {
          return Ok(());
        };
        if probe_tcp(host, port).await {
          return Ok(());
        }
      }
      ServiceKind::Worker { .. } => {
        tokio::time::sleep(Duration::from_secs(10)).await;
        if container_is_running(executor, host, container_name).await {
          return Ok(());
        }
        return Err(DeployError::HealthGate {
          tuple: tuple.clone(),
          host: host.to_string(),
          reason: HealthGateFailureReason::Crash,
        });
      }
      ServiceKind::Scheduled { smoke_command, .. } => {
        return run_smoke_command(executor, host, container_name, smoke_command.as_deref(), tuple).await;
      }
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
  }
}

async fn container_is_running(executor: &Executor, host: &str, container_name: &str) -> bool {
  let command = format!("docker inspect -f '{{{{.State.Running}}}}' {container_name} 2>/dev/null");
  executor
    .run(host, "root", &command, None, Duration::from_secs(10))
    .await
    .map(|r| r.success() && r.stdout.trim() == "true")
    .unwrap_or(false)
}

async fn probe_http(host: &str, port: u16, path: &str) -> bool {
  let url = format!("http://{host}:{port}{path}");
  match reqwest::Client::new().get(&url).timeout(Duration::from_secs(3)).send().await {
    Ok(resp) => resp.status().is_success() || resp.status().is_redirection(),
    Err(_) => false,
  }
}

async fn probe_tcp(host: &str, port: u16) -> bool {
  tokio::time::timeout(Duration::from_secs(3), tokio::net::TcpStream::connect((host, port))).await.is_ok_and(|r| r.is_ok())
}

async fn run_smoke_command(
  executor: &Executor,
  host: &str,
  container_name: &str,
  smoke_command: Option<&str>,
  tuple: &Tuple,
) -> Result<(), DeployError> {
  let command = smoke_command.unwrap_or("--help").to_string();
  let result = executor
    .exec_in_container(host, "root", container_name, &[command], Duration::from_secs(30))
    .await
    .map_err(|e| DeployError::Transport { host: host.to_string(), message: e.to_string() })?;
  if result.success() {
    Ok(())
  } else {
    Err(DeployError::HealthGate { tuple: tuple.clone(), host: host.to_string(), reason: HealthGateFailureReason::UnhealthyResponse })
  }
}
