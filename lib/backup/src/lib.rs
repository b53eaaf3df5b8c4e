//! Component J — Backup Orchestrator.
//!
//! For each stateful service, runs an engine-appropriate dump inside the
//! live container, copies the result off-container to
//! `/var/lib/deploy/{tenant}/{project}/{env}/backups/{service}/{timestamp}.gz`,
//! verifies the archive isn't truncated, then prunes anything past the
//! configured retention count. One run is one service on one host; the
//! cron schedule that triggers a run lives in `bin/control`.

use std::time::Duration;

use chrono::Utc;
use drydock_client::entities::{
  service::{CacheEngine, DbEngine, SearchEngine, ServiceKind},
  tuple::Tuple,
};
use executor::{Executor, RemoteExecutor};

const BACKUP_ROOT: &str = "/var/lib/deploy";
const DUMP_TIMEOUT: Duration = Duration::from_secs(1800);

pub struct BackupOrchestrator<'a> {
  executor: &'a Executor,
}

#[derive(Debug, Clone)]
pub struct BackupResult {
  pub path: String,
  pub size_bytes: u64,
  pub taken_at: chrono::DateTime<Utc>,
}

impl<'a> BackupOrchestrator<'a> {
  pub fn new(executor: &'a Executor) -> Self {
    Self { executor }
  }

  fn backup_dir(tuple: &Tuple) -> String {
    format!("{BACKUP_ROOT}/{}/{}/{}/backups/{}", tuple.tenant, tuple.project, tuple.env, tuple.service)
  }

  /// Runs the engine's dump command inside `container_name`, gzips the
  /// output, and copies it to the host's backup directory. Returns an
  /// error if the service kind has no known dump command (e.g. a worker).
  pub async fn run_backup(
    &self,
    host: &str,
    tuple: &Tuple,
    container_name: &str,
    kind: &ServiceKind,
  ) -> anyhow::Result<BackupResult> {
    let dump_command = dump_command(kind).ok_or_else(|| anyhow::anyhow!("{} has no backup dump command", tuple))?;
    let dir = Self::backup_dir(tuple);
    let taken_at = Utc::now();
    let file_name = format!("{}.gz", taken_at.format("%Y%m%dT%H%M%SZ"));
    let dest = format!("{dir}/{file_name}");

    self.executor.run(host, "root", &format!("mkdir -p '{dir}'"), None, Duration::from_secs(5)).await?;

    let pipeline = format!("docker exec {container_name} sh -c \"{dump_command}\" | gzip > '{dest}'");
    let result = self.executor.run(host, "root", &pipeline, None, DUMP_TIMEOUT).await?;
    if !result.success() {
      return Err(anyhow::anyhow!("backup dump for {tuple} on {host} failed: {}", result.stderr));
    }

    let size = self.verify_integrity(host, &dest).await?;
    tracing::info!(%tuple, host, path = %dest, size_bytes = size, "backup complete");
    Ok(BackupResult { path: dest, size_bytes: size, taken_at })
  }

  /// `gzip -t` plus a non-zero size check: catches both a truncated
  /// archive and a dump that silently produced nothing.
  async fn verify_integrity(&self, host: &str, path: &str) -> anyhow::Result<u64> {
    let check = self.executor.run(host, "root", &format!("gzip -t '{path}'"), None, Duration::from_secs(60)).await?;
    if !check.success() {
      return Err(anyhow::anyhow!("backup archive {path} on {host} failed integrity check: {}", check.stderr));
    }
    let size_out = self
      .executor
      .run(host, "root", &format!("stat -c %s '{path}'"), None, Duration::from_secs(5))
      .await?;
    let size = size_out.stdout.trim().parse::<u64>().unwrap_or(0);
    if size == 0 {
      return Err(anyhow::anyhow!("backup archive {path} on {host} is empty"));
    }
    Ok(size)
  }

  /// Deletes every backup file for `tuple` on `host` beyond the newest
  /// `keep_count`, oldest first (filenames sort lexicographically by
  /// timestamp, so a plain `ls` ordering is enough).
  pub async fn prune_retention(&self, host: &str, tuple: &Tuple, keep_count: u32) -> anyhow::Result<Vec<String>> {
    let dir = Self::backup_dir(tuple);
    let listing = self.executor.run(host, "root", &format!("ls -1 '{dir}' 2>/dev/null"), None, Duration::from_secs(10)).await?;
    let mut files: Vec<&str> = listing.stdout.lines().filter(|l| !l.is_empty()).collect();
    files.sort_unstable();

    let mut pruned = Vec::new();
    if (files.len() as u32) > keep_count {
      let cutoff = files.len() - keep_count as usize;
      for file in &files[..cutoff] {
        let path = format!("{dir}/{file}");
        let _ = self.executor.run(host, "root", &format!("rm -f '{path}'"), None, Duration::from_secs(5)).await;
        pruned.push(path);
      }
    }
    if !pruned.is_empty() {
      tracing::info!(%tuple, host, count = pruned.len(), "pruned old backups");
    }
    Ok(pruned)
  }
}

/// The engine-specific dump command, run inside the container's own shell.
/// `None` for kinds with nothing meaningful to back up (workers, web,
/// scheduled jobs — those are stateless by construction).
fn dump_command(kind: &ServiceKind) -> Option<String> {
  match kind {
    ServiceKind::StatefulDb { engine, .. } => Some(
      match engine {
        DbEngine::Postgres => "pg_dump -U postgres".to_string(),
        DbEngine::Mysql => "mysqldump -u root --all-databases".to_string(),
        DbEngine::Mongo => "mongodump --archive".to_string(),
      },
    ),
    ServiceKind::StatefulCache { engine } => match engine {
      CacheEngine::Redis => Some("redis-cli --rdb /dev/stdout".to_string()),
      CacheEngine::Memcached => None,
    },
    ServiceKind::StatefulSearch { engine } => match engine {
      SearchEngine::Elasticsearch => Some("curl -s -X GET 'localhost:9200/_all/_settings'".to_string()),
      SearchEngine::Meilisearch => Some("curl -s -X POST 'localhost:7700/dumps'".to_string()),
    },
    ServiceKind::Web { .. } | ServiceKind::Worker { .. } | ServiceKind::Scheduled { .. } => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn postgres_services_get_a_pg_dump_command() {
    let kind = ServiceKind::StatefulDb { engine: DbEngine::Postgres, container_port: 5432, health_timeout_s: 180 };
    assert_eq!(dump_command(&kind), Some("pg_dump -U postgres".to_string()));
  }

  #[test]
  fn memcached_has_no_dump_command() {
    let kind = ServiceKind::StatefulCache { engine: CacheEngine::Memcached, container_port: 11211 };
    assert_eq!(dump_command(&kind), None);
  }

  #[test]
  fn web_services_have_no_dump_command() {
    let kind = ServiceKind::Web { container_port: 8080, health_path: "/".to_string(), health_timeout_s: 60 };
    assert_eq!(dump_command(&kind), None);
  }

  #[test]
  fn backup_dir_is_rooted_under_tenant_project_env_service() {
    let tuple = Tuple::new("u1", "myapp", "prod", "postgres");
    assert_eq!(
      BackupOrchestrator::backup_dir(&tuple),
      "/var/lib/deploy/u1/myapp/prod/backups/postgres"
    );
  }
}
